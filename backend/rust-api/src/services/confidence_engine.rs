use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::config::EngineSettings;
use crate::models::{ConfidenceMetric, DrillAttempt, DrillType, LearnerId, Trend};

use super::decay::RecencyDecay;
use super::snapshot::Snapshot;

/// Recency-weighted accuracy aggregation with a half-over-half trend.
#[derive(Debug, Clone)]
pub struct ConfidenceEngine {
    decay: RecencyDecay,
    trend_min_attempts: usize,
    trend_delta: f64,
}

impl ConfidenceEngine {
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            decay: RecencyDecay::new(settings.decay_factor, settings.half_life_days),
            trend_min_attempts: settings.trend_min_attempts,
            trend_delta: settings.trend_delta,
        }
    }

    pub fn compute(
        &self,
        learner_id: &LearnerId,
        attempts: &[DrillAttempt],
        as_of: DateTime<Utc>,
    ) -> ConfidenceMetric {
        let snapshot = Snapshot::prepare(learner_id, attempts, as_of);
        self.compute_snapshot(learner_id, &snapshot, as_of)
    }

    pub fn compute_snapshot(
        &self,
        learner_id: &LearnerId,
        snapshot: &Snapshot<'_>,
        as_of: DateTime<Utc>,
    ) -> ConfidenceMetric {
        let sample_size = snapshot
            .attempts()
            .iter()
            .filter(|attempt| attempt.has_any_score())
            .count();

        // (age in days, accuracy, drill type), oldest first
        let scored: Vec<(f64, f64, DrillType)> = snapshot
            .attempts()
            .iter()
            .filter_map(|attempt| {
                attempt.accuracy_score.map(|accuracy| {
                    (
                        RecencyDecay::age_in_days(attempt.attempted_at, as_of),
                        accuracy,
                        attempt.drill_type,
                    )
                })
            })
            .collect();

        let overall_score = self
            .decay
            .weighted_mean(scored.iter().map(|(age, accuracy, _)| (*age, *accuracy)));

        let mut per_type: BTreeMap<DrillType, Vec<(f64, f64)>> = BTreeMap::new();
        for (age, accuracy, drill_type) in &scored {
            per_type.entry(*drill_type).or_default().push((*age, *accuracy));
        }
        let by_drill_type = per_type
            .into_iter()
            .filter_map(|(drill_type, samples)| {
                self.decay
                    .weighted_mean(samples)
                    .map(|score| (drill_type, score))
            })
            .collect();

        let accuracies: Vec<f64> = scored.iter().map(|(_, accuracy, _)| *accuracy).collect();
        let trend = self.trend(&accuracies);

        tracing::debug!(
            learner_id = %learner_id,
            sample_size,
            scored = accuracies.len(),
            overall = ?overall_score,
            trend = ?trend,
            "Confidence computed"
        );

        ConfidenceMetric {
            learner_id: learner_id.clone(),
            overall_score,
            by_drill_type,
            sample_size,
            computed_at: as_of,
            trend,
            dropped_count: snapshot.dropped_count(),
        }
    }

    /// Splits the chronologically ordered scores by count. With an odd count the
    /// middle attempt belongs to neither half, so both halves weigh the same.
    fn trend(&self, accuracies: &[f64]) -> Option<Trend> {
        if accuracies.len() < self.trend_min_attempts {
            return None;
        }

        let half = accuracies.len() / 2;
        let older = mean(&accuracies[..half])?;
        let newer = mean(&accuracies[accuracies.len() - half..])?;
        let delta = newer - older;

        Some(if delta > self.trend_delta {
            Trend::Improving
        } else if delta < -self.trend_delta {
            Trend::Declining
        } else {
            Trend::Stable
        })
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
