use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::instrument;

use crate::config::EngineSettings;
use crate::errors::MetricsError;
use crate::metrics::{record_computation, record_dropped_attempt, ATTEMPT_FETCH_DURATION_SECONDS};
use crate::models::{
    ConfidenceMetric, LearnerId, LearnerMetrics, PronunciationMetric, StreakRecord,
};

use super::attempt_source::{AttemptHistory, AttemptSource};
use super::confidence_engine::ConfidenceEngine;
use super::pronunciation_engine::PronunciationEngine;
use super::snapshot::Snapshot;
use super::streak_engine::StreakEngine;

/// Entry point for the routing layer.
///
/// Each call validates the identifier, reads the learner's history once and
/// hands the same snapshot to the engines. Nothing is cached or written, so
/// concurrent and repeated calls never interfere.
pub struct MetricsFacade {
    source: Arc<dyn AttemptSource>,
    confidence: ConfidenceEngine,
    pronunciation: PronunciationEngine,
    streak: StreakEngine,
    default_timezone: Tz,
    lookback: Option<Duration>,
}

impl MetricsFacade {
    pub fn new(source: Arc<dyn AttemptSource>, settings: &EngineSettings) -> Self {
        Self {
            source,
            confidence: ConfidenceEngine::new(settings),
            pronunciation: PronunciationEngine::new(settings),
            streak: StreakEngine::new(settings),
            default_timezone: settings.default_timezone,
            lookback: settings
                .lookback_days
                .map(|days| Duration::days(i64::from(days))),
        }
    }

    pub fn with_streak_engine(mut self, streak: StreakEngine) -> Self {
        self.streak = streak;
        self
    }

    pub fn source(&self) -> &Arc<dyn AttemptSource> {
        &self.source
    }

    pub async fn get_confidence(&self, learner_id: &str) -> Result<ConfidenceMetric, MetricsError> {
        self.get_confidence_at(learner_id, Utc::now()).await
    }

    #[instrument(level = "info", skip(self))]
    pub async fn get_confidence_at(
        &self,
        learner_id: &str,
        as_of: DateTime<Utc>,
    ) -> Result<ConfidenceMetric, MetricsError> {
        let result = async {
            let learner = LearnerId::parse(learner_id)?;
            let history = self.load(&learner, as_of).await?;
            let snapshot = self.snapshot(&learner, &history, as_of);
            Ok::<_, MetricsError>(self.confidence.compute_snapshot(&learner, &snapshot, as_of))
        }
        .await;
        observe("confidence", &result);
        result
    }

    pub async fn get_pronunciation(
        &self,
        learner_id: &str,
    ) -> Result<PronunciationMetric, MetricsError> {
        self.get_pronunciation_at(learner_id, Utc::now()).await
    }

    #[instrument(level = "info", skip(self))]
    pub async fn get_pronunciation_at(
        &self,
        learner_id: &str,
        as_of: DateTime<Utc>,
    ) -> Result<PronunciationMetric, MetricsError> {
        let result = async {
            let learner = LearnerId::parse(learner_id)?;
            let history = self.load(&learner, as_of).await?;
            let snapshot = self.snapshot(&learner, &history, as_of);
            Ok::<_, MetricsError>(self.pronunciation.compute_snapshot(&learner, &snapshot, as_of))
        }
        .await;
        observe("pronunciation", &result);
        result
    }

    /// `timezone` is an IANA name; `None` uses the configured default.
    pub async fn get_streak(
        &self,
        learner_id: &str,
        timezone: Option<&str>,
    ) -> Result<StreakRecord, MetricsError> {
        self.get_streak_at(learner_id, timezone, Utc::now()).await
    }

    #[instrument(level = "info", skip(self))]
    pub async fn get_streak_at(
        &self,
        learner_id: &str,
        timezone: Option<&str>,
        as_of: DateTime<Utc>,
    ) -> Result<StreakRecord, MetricsError> {
        let result = async {
            let learner = LearnerId::parse(learner_id)?;
            let timezone = self.resolve_timezone(timezone)?;
            let history = self.load(&learner, as_of).await?;
            let snapshot = self.snapshot(&learner, &history, as_of);
            Ok::<_, MetricsError>(self
                .streak
                .compute_snapshot(&learner, &snapshot, timezone, as_of))
        }
        .await;
        observe("streak", &result);
        result
    }

    pub async fn get_summary(
        &self,
        learner_id: &str,
        timezone: Option<&str>,
    ) -> Result<LearnerMetrics, MetricsError> {
        self.get_summary_at(learner_id, timezone, Utc::now()).await
    }

    /// All three metrics from one read of the history.
    #[instrument(level = "info", skip(self))]
    pub async fn get_summary_at(
        &self,
        learner_id: &str,
        timezone: Option<&str>,
        as_of: DateTime<Utc>,
    ) -> Result<LearnerMetrics, MetricsError> {
        let result = async {
            let learner = LearnerId::parse(learner_id)?;
            let timezone = self.resolve_timezone(timezone)?;
            let history = self.load(&learner, as_of).await?;
            let snapshot = self.snapshot(&learner, &history, as_of);

            Ok::<_, MetricsError>(LearnerMetrics {
                confidence: self.confidence.compute_snapshot(&learner, &snapshot, as_of),
                pronunciation: self
                    .pronunciation
                    .compute_snapshot(&learner, &snapshot, as_of),
                streak: self
                    .streak
                    .compute_snapshot(&learner, &snapshot, timezone, as_of),
                learner_id: learner,
            })
        }
        .await;
        observe("summary", &result);
        result
    }

    pub fn resolve_timezone(&self, timezone: Option<&str>) -> Result<Tz, MetricsError> {
        match timezone.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| MetricsError::InvalidTimezone(name.to_string())),
            None => Ok(self.default_timezone),
        }
    }

    async fn load(
        &self,
        learner: &LearnerId,
        as_of: DateTime<Utc>,
    ) -> Result<AttemptHistory, MetricsError> {
        // A lookback reaching past the representable range reads everything.
        let since = self
            .lookback
            .and_then(|lookback| as_of.checked_sub_signed(lookback));
        let started = Instant::now();
        let fetched = self.source.fetch_attempts(learner, since).await;
        ATTEMPT_FETCH_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());

        match fetched {
            Ok(history) => {
                tracing::debug!(
                    learner_id = %learner,
                    source = self.source.name(),
                    attempts = history.attempts.len(),
                    undecodable = history.undecodable.len(),
                    "Attempt history loaded"
                );
                Ok(history)
            }
            Err(err) => {
                tracing::warn!(
                    learner_id = %learner,
                    source = self.source.name(),
                    error = %err,
                    "Attempt history read failed"
                );
                Err(err.into())
            }
        }
    }

    fn snapshot<'a>(
        &self,
        learner: &LearnerId,
        history: &'a AttemptHistory,
        as_of: DateTime<Utc>,
    ) -> Snapshot<'a> {
        let snapshot = Snapshot::prepare(learner, &history.attempts, as_of)
            .with_undecodable(history.undecodable.iter().cloned());
        if snapshot.dropped_count() > 0 {
            for (_, reason) in snapshot.dropped() {
                record_dropped_attempt(reason.as_str());
            }
            tracing::warn!(
                learner_id = %learner,
                dropped = snapshot.dropped_count(),
                kept = snapshot.attempts().len(),
                "Dropped malformed drill attempts"
            );
        }
        snapshot
    }
}

fn observe<T>(metric: &str, result: &Result<T, MetricsError>) {
    match result {
        Ok(_) => record_computation(metric, "success"),
        Err(err) => record_computation(metric, err.label()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SourceError;
    use crate::models::{DrillAttempt, StreakStatus, Trend};
    use crate::services::attempt_source::InMemoryAttemptSource;
    use crate::services::snapshot::fixtures::*;
    use async_trait::async_trait;

    /// Source whose store holds records it cannot decode.
    struct CorruptRecordSource {
        history: AttemptHistory,
    }

    #[async_trait]
    impl AttemptSource for CorruptRecordSource {
        async fn fetch_attempts(
            &self,
            _learner_id: &LearnerId,
            _since: Option<DateTime<Utc>>,
        ) -> Result<AttemptHistory, SourceError> {
            Ok(self.history.clone())
        }

        fn name(&self) -> &'static str {
            "corrupt"
        }
    }

    async fn facade_with(attempts: Vec<DrillAttempt>) -> (MetricsFacade, InMemoryAttemptSource) {
        let source = InMemoryAttemptSource::new();
        source.add_learner(&learner()).await;
        for attempt in attempts {
            source.record(attempt).await;
        }
        let facade = MetricsFacade::new(Arc::new(source.clone()), &EngineSettings::default());
        (facade, source)
    }

    fn history() -> Vec<DrillAttempt> {
        vec![
            DrillAttempt {
                pronunciation_score: Some(0.5),
                phoneme_breakdown: vec![crate::models::PhonemeScore::new("θ", 0.3)],
                ..scored("a", 3, 0.4)
            },
            DrillAttempt {
                pronunciation_score: Some(0.6),
                phoneme_breakdown: vec![crate::models::PhonemeScore::new("θ", 0.4)],
                ..scored("b", 2, 0.5)
            },
            DrillAttempt {
                pronunciation_score: Some(0.7),
                phoneme_breakdown: vec![crate::models::PhonemeScore::new("θ", 0.5)],
                ..scored("c", 1, 0.8)
            },
            scored("d", 0, 0.9),
        ]
    }

    #[tokio::test]
    async fn malformed_identifier_is_rejected_before_reading() {
        let (facade, source) = facade_with(Vec::new()).await;
        source.set_unavailable(true);
        let err = facade.get_confidence_at("not-an-id", base_time()).await.unwrap_err();
        assert!(matches!(err, MetricsError::InvalidIdentifier(_)));
    }

    #[tokio::test]
    async fn unknown_learner_is_not_found() {
        let facade = MetricsFacade::new(
            Arc::new(InMemoryAttemptSource::new()),
            &EngineSettings::default(),
        );
        let err = facade.get_pronunciation_at(LEARNER, base_time()).await.unwrap_err();
        assert!(matches!(err, MetricsError::NotFound(_)));
    }

    #[tokio::test]
    async fn source_failure_is_surfaced_not_retried() {
        let (facade, source) = facade_with(history()).await;
        source.set_unavailable(true);
        let err = facade.get_streak_at(LEARNER, None, base_time()).await.unwrap_err();
        assert!(matches!(err, MetricsError::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn learner_without_attempts_gets_no_data_metrics() {
        let (facade, _) = facade_with(Vec::new()).await;
        let summary = facade.get_summary_at(LEARNER, None, base_time()).await.unwrap();
        assert_eq!(summary.confidence.sample_size, 0);
        assert_eq!(summary.confidence.overall_score, None);
        assert_eq!(summary.pronunciation.sample_size, 0);
        assert_eq!(summary.pronunciation.overall_score, None);
        assert_eq!(summary.streak.current_streak, 0);
        assert_eq!(summary.streak.streak_status, StreakStatus::Broken);
    }

    #[tokio::test]
    async fn summary_matches_individual_operations() {
        let (facade, _) = facade_with(history()).await;
        let as_of = base_time();

        let summary = facade.get_summary_at(LEARNER, Some("UTC"), as_of).await.unwrap();
        let confidence = facade.get_confidence_at(LEARNER, as_of).await.unwrap();
        let pronunciation = facade.get_pronunciation_at(LEARNER, as_of).await.unwrap();
        let streak = facade.get_streak_at(LEARNER, Some("UTC"), as_of).await.unwrap();

        assert_eq!(summary.confidence, confidence);
        assert_eq!(summary.pronunciation, pronunciation);
        assert_eq!(summary.streak, streak);
        assert_eq!(confidence.trend, Some(Trend::Improving));
        assert_eq!(pronunciation.weak_phonemes.len(), 1);
        assert_eq!(streak.current_streak, 4);
    }

    #[tokio::test]
    async fn uppercase_identifier_resolves_to_same_learner() {
        let (facade, _) = facade_with(history()).await;
        let lower = facade.get_confidence_at(LEARNER, base_time()).await.unwrap();
        let upper = facade
            .get_confidence_at(&LEARNER.to_uppercase(), base_time())
            .await
            .unwrap();
        assert_eq!(lower, upper);
    }

    #[tokio::test]
    async fn unknown_timezone_is_rejected() {
        let (facade, _) = facade_with(history()).await;
        let err = facade
            .get_streak_at(LEARNER, Some("Mars/Olympus_Mons"), base_time())
            .await
            .unwrap_err();
        assert!(matches!(err, MetricsError::InvalidTimezone(_)));
    }

    #[tokio::test]
    async fn lookback_bounds_the_history_read() {
        let source = InMemoryAttemptSource::new();
        for attempt in history() {
            source.record(attempt).await;
        }
        source.record(scored("ancient", 400, 0.0)).await;
        let settings = EngineSettings {
            lookback_days: Some(30),
            ..EngineSettings::default()
        };
        let facade = MetricsFacade::new(Arc::new(source), &settings);

        let metric = facade.get_confidence_at(LEARNER, base_time()).await.unwrap();
        assert_eq!(metric.sample_size, 4);
    }

    #[tokio::test]
    async fn custom_streak_rule_replaces_default() {
        use crate::services::streak_engine::QualifyingRule;

        let (facade, _) = facade_with(history()).await;
        let facade = facade.with_streak_engine(StreakEngine::with_predicate(
            Arc::new(QualifyingRule::MinAttempts(2)),
            1,
        ));

        let streak = facade.get_streak_at(LEARNER, None, base_time()).await.unwrap();
        assert_eq!(streak.current_streak, 0);
        assert_eq!(streak.last_active_date, None);
        assert_eq!(streak.streak_status, StreakStatus::Broken);
    }

    #[tokio::test]
    async fn lookback_past_representable_range_reads_full_history() {
        let source = InMemoryAttemptSource::new();
        for attempt in history() {
            source.record(attempt).await;
        }
        let settings = EngineSettings {
            lookback_days: Some(200_000_000),
            ..EngineSettings::default()
        };
        let facade = MetricsFacade::new(Arc::new(source), &settings);

        let metric = facade.get_confidence_at(LEARNER, base_time()).await.unwrap();
        assert_eq!(metric.sample_size, 4);
    }

    #[tokio::test]
    async fn undecodable_records_are_counted_in_every_metric() {
        let source = CorruptRecordSource {
            history: AttemptHistory {
                attempts: history(),
                undecodable: vec!["65f000000000000000000001".to_string()],
            },
        };
        let facade = MetricsFacade::new(Arc::new(source), &EngineSettings::default());

        let summary = facade.get_summary_at(LEARNER, None, base_time()).await.unwrap();
        assert_eq!(summary.confidence.sample_size, 4);
        assert_eq!(summary.confidence.dropped_count, 1);
        assert_eq!(summary.pronunciation.dropped_count, 1);
        assert_eq!(summary.streak.dropped_count, 1);
    }

    #[tokio::test]
    async fn concurrent_requests_agree() {
        let (facade, _) = facade_with(history()).await;
        let facade = Arc::new(facade);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let facade = facade.clone();
                tokio::spawn(async move {
                    facade
                        .get_summary_at(LEARNER, None, base_time())
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
    }
}
