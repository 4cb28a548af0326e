use std::sync::Arc;

use anyhow::Context;
use mongodb::Client as MongoClient;

use crate::config::Config;

pub mod attempt_source;
pub mod confidence_engine;
pub mod decay;
pub mod metrics_facade;
pub mod pronunciation_engine;
pub mod snapshot;
pub mod streak_engine;

pub use attempt_source::{AttemptSource, InMemoryAttemptSource, MongoAttemptSource};
pub use metrics_facade::MetricsFacade;

pub struct AppState {
    pub config: Config,
    pub facade: MetricsFacade,
}

impl AppState {
    /// Wires the facade to MongoDB and checks the connection once.
    pub async fn new(config: Config, mongo_client: MongoClient) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.source.mongo_database);
        let source = MongoAttemptSource::new(mongo, &config.source);

        tracing::info!("Checking MongoDB connectivity...");
        source
            .ping()
            .await
            .context("MongoDB ping failed during startup")?;
        tracing::info!("MongoDB connection established successfully");

        Ok(Self::with_source(config, Arc::new(source)))
    }

    pub fn with_source(config: Config, source: Arc<dyn AttemptSource>) -> Self {
        let facade = MetricsFacade::new(source, &config.engines);
        Self { config, facade }
    }
}
