use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Bson, DateTime as BsonDateTime, Document};
use mongodb::Database;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::config::SourceSettings;
use crate::errors::SourceError;
use crate::models::{DrillAttempt, DrillType, LearnerId, PhonemeScore};
use crate::utils::time::{bson_to_chrono, chrono_to_bson};

/// Attempts read for one learner, plus the ids of stored records that could
/// not be decoded into a [`DrillAttempt`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttemptHistory {
    pub attempts: Vec<DrillAttempt>,
    pub undecodable: Vec<String>,
}

impl AttemptHistory {
    pub fn new(attempts: Vec<DrillAttempt>) -> Self {
        Self {
            attempts,
            undecodable: Vec::new(),
        }
    }
}

/// Read-only access to a learner's drill history.
///
/// Implementations return attempts ordered by `attempted_at` ascending with
/// ties broken by attempt id, fail with [`SourceError::NotFound`] for unknown
/// learners and return an empty history for learners without attempts.
/// Records that exist but cannot be decoded are reported, not skipped.
#[async_trait]
pub trait AttemptSource: Send + Sync {
    async fn fetch_attempts(
        &self,
        learner_id: &LearnerId,
        since: Option<DateTime<Utc>>,
    ) -> Result<AttemptHistory, SourceError>;

    async fn ping(&self) -> Result<(), SourceError> {
        Ok(())
    }

    fn name(&self) -> &'static str;
}

#[derive(Debug, Deserialize)]
struct PhonemeDocument {
    phoneme: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
struct AttemptDocument {
    #[serde(rename = "_id")]
    id: ObjectId,
    learner_id: ObjectId,
    drill_id: Bson,
    attempted_at: BsonDateTime,
    drill_type: DrillType,
    #[serde(default)]
    accuracy_score: Option<f64>,
    #[serde(default)]
    pronunciation_score: Option<f64>,
    #[serde(default)]
    phoneme_breakdown: Vec<PhonemeDocument>,
    #[serde(default)]
    duration_seconds: Option<u32>,
}

impl AttemptDocument {
    fn into_attempt(self) -> Option<DrillAttempt> {
        let drill_id = match self.drill_id {
            Bson::String(value) => value,
            Bson::ObjectId(oid) => oid.to_hex(),
            other => other.to_string(),
        };

        Some(DrillAttempt {
            attempt_id: self.id.to_hex(),
            learner_id: self.learner_id.to_hex(),
            drill_id,
            attempted_at: bson_to_chrono(self.attempted_at)?,
            drill_type: self.drill_type,
            accuracy_score: self.accuracy_score,
            pronunciation_score: self.pronunciation_score,
            phoneme_breakdown: self
                .phoneme_breakdown
                .into_iter()
                .map(|entry| PhonemeScore::new(entry.phoneme, entry.score))
                .collect(),
            duration_seconds: self.duration_seconds,
        })
    }
}

/// Decodes a stored attempt; on failure returns the document id (or
/// `"unknown"` when even that is unreadable).
fn decode_attempt(document: Document) -> Result<DrillAttempt, String> {
    let id = match document.get("_id") {
        Some(Bson::ObjectId(oid)) => oid.to_hex(),
        Some(other) => other.to_string(),
        None => "unknown".to_string(),
    };
    mongodb::bson::from_document::<AttemptDocument>(document)
        .ok()
        .and_then(AttemptDocument::into_attempt)
        .ok_or(id)
}

/// Attempt history stored in MongoDB.
pub struct MongoAttemptSource {
    mongo: Database,
    attempts_collection: String,
    learners_collection: String,
    fetch_timeout: Duration,
}

impl MongoAttemptSource {
    pub fn new(mongo: Database, settings: &SourceSettings) -> Self {
        Self {
            mongo,
            attempts_collection: settings.attempts_collection.clone(),
            learners_collection: settings.learners_collection.clone(),
            fetch_timeout: settings.fetch_timeout(),
        }
    }

    async fn load(
        &self,
        learner_id: &LearnerId,
        since: Option<DateTime<Utc>>,
    ) -> Result<AttemptHistory, SourceError> {
        let learner_oid = learner_id.object_id();

        let learner = self
            .mongo
            .collection::<Document>(&self.learners_collection)
            .find_one(doc! { "_id": learner_oid })
            .await?;
        if learner.is_none() {
            return Err(SourceError::NotFound(learner_id.to_string()));
        }

        let mut filter = doc! { "learner_id": learner_oid };
        if let Some(since) = since {
            filter.insert("attempted_at", doc! { "$gte": chrono_to_bson(since) });
        }

        let documents: Vec<Document> = self
            .mongo
            .collection::<Document>(&self.attempts_collection)
            .find(filter)
            .sort(doc! { "attempted_at": 1, "_id": 1 })
            .await?
            .try_collect()
            .await?;

        let mut history = AttemptHistory::new(Vec::with_capacity(documents.len()));
        for document in documents {
            match decode_attempt(document) {
                Ok(attempt) => history.attempts.push(attempt),
                Err(id) => {
                    tracing::warn!(
                        learner_id = %learner_id,
                        attempt_id = %id,
                        "Undecodable drill attempt document"
                    );
                    history.undecodable.push(id);
                }
            }
        }

        Ok(history)
    }
}

#[async_trait]
impl AttemptSource for MongoAttemptSource {
    async fn fetch_attempts(
        &self,
        learner_id: &LearnerId,
        since: Option<DateTime<Utc>>,
    ) -> Result<AttemptHistory, SourceError> {
        match tokio::time::timeout(self.fetch_timeout, self.load(learner_id, since)).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Unavailable(format!(
                "attempt fetch timed out after {}ms",
                self.fetch_timeout.as_millis()
            ))),
        }
    }

    async fn ping(&self) -> Result<(), SourceError> {
        tokio::time::timeout(
            Duration::from_secs(1),
            self.mongo.run_command(doc! { "ping": 1 }),
        )
        .await
        .map_err(|_| SourceError::Unavailable("MongoDB timeout after 1s".to_string()))??;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mongodb"
    }
}

/// Process-local attempt store, used by tests and local runs without MongoDB.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAttemptSource {
    learners: Arc<RwLock<HashMap<String, Vec<DrillAttempt>>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryAttemptSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_learner(&self, learner_id: &LearnerId) {
        self.learners
            .write()
            .await
            .entry(learner_id.to_string())
            .or_default();
    }

    /// Stores an attempt, registering its learner when needed.
    pub async fn record(&self, attempt: DrillAttempt) {
        self.learners
            .write()
            .await
            .entry(attempt.learner_id.to_ascii_lowercase())
            .or_default()
            .push(attempt);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), SourceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(SourceError::Unavailable(
                "in-memory source marked unavailable".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AttemptSource for InMemoryAttemptSource {
    async fn fetch_attempts(
        &self,
        learner_id: &LearnerId,
        since: Option<DateTime<Utc>>,
    ) -> Result<AttemptHistory, SourceError> {
        self.check_available()?;

        let learners = self.learners.read().await;
        let stored = learners
            .get(learner_id.as_str())
            .ok_or_else(|| SourceError::NotFound(learner_id.to_string()))?;

        let mut attempts: Vec<DrillAttempt> = stored
            .iter()
            .filter(|attempt| since.map_or(true, |since| attempt.attempted_at >= since))
            .cloned()
            .collect();
        attempts.sort_by(|a, b| {
            a.attempted_at
                .cmp(&b.attempted_at)
                .then_with(|| a.attempt_id.cmp(&b.attempt_id))
        });
        Ok(AttemptHistory::new(attempts))
    }

    async fn ping(&self) -> Result<(), SourceError> {
        self.check_available()
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}
