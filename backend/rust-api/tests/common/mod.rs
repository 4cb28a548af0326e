#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use http_body_util::BodyExt;
use progress_metrics_api::{
    config::Config,
    create_router,
    middlewares::auth::{JwtClaims, JwtService},
    models::{DrillAttempt, DrillType, LearnerId, PhonemeScore},
    services::{AppState, InMemoryAttemptSource},
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const LEARNER_A: &str = "65a1b2c3d4e5f60718293a4b";
pub const LEARNER_B: &str = "65a1b2c3d4e5f60718293a4c";
pub const UNKNOWN_LEARNER: &str = "65a1b2c3d4e5f60718293fff";

pub struct TestApp {
    pub router: Router,
    pub source: InMemoryAttemptSource,
    config: Config,
}

impl TestApp {
    pub async fn token(&self, sub: &str, role: &str) -> String {
        let now = Utc::now().timestamp();
        let claims = JwtClaims {
            sub: sub.to_string(),
            role: role.to_string(),
            exp: (now + 3600) as usize,
            iat: now as usize,
        };
        JwtService::new(&self.config.jwt_secret)
            .generate_token(&claims)
            .expect("token")
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send("GET", uri, token).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send("POST", uri, token).await
    }

    async fn send(&self, method: &str, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let response = self
            .router
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }
}

/// Router over an in-memory source with two registered learners and a short
/// history for `LEARNER_A`.
pub async fn create_test_app() -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let config = Config::default();
    let source = InMemoryAttemptSource::new();

    for id in [LEARNER_A, LEARNER_B] {
        source.add_learner(&LearnerId::parse(id).unwrap()).await;
    }
    seed_history(&source).await;

    let app_state = Arc::new(AppState::with_source(
        config.clone(),
        Arc::new(source.clone()),
    ));

    TestApp {
        router: create_router(app_state),
        source,
        config,
    }
}

async fn seed_history(source: &InMemoryAttemptSource) {
    let now = Utc::now();
    for (i, days_ago) in [3i64, 2, 1, 0].into_iter().enumerate() {
        source
            .record(attempt(
                &format!("a{}", i),
                LEARNER_A,
                now - Duration::days(days_ago) - Duration::minutes(5),
                0.6 + 0.1 * i as f64,
            ))
            .await;
    }
}

pub fn attempt(id: &str, learner: &str, at: DateTime<Utc>, accuracy: f64) -> DrillAttempt {
    DrillAttempt {
        attempt_id: id.to_string(),
        learner_id: learner.to_string(),
        drill_id: format!("drill-{}", id),
        attempted_at: at,
        drill_type: DrillType::Word,
        accuracy_score: Some(accuracy),
        pronunciation_score: Some(accuracy),
        phoneme_breakdown: vec![PhonemeScore::new("θ", 0.3), PhonemeScore::new("a", 0.9)],
        duration_seconds: Some(60),
    }
}
