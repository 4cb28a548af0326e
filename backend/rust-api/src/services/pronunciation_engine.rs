use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::config::EngineSettings;
use crate::models::{DrillAttempt, LearnerId, PronunciationMetric, WeakPhoneme};

use super::decay::RecencyDecay;
use super::snapshot::Snapshot;

#[derive(Debug, Clone)]
pub struct PronunciationEngine {
    decay: RecencyDecay,
    weak_threshold: f64,
    min_support: usize,
}

impl PronunciationEngine {
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            decay: RecencyDecay::new(settings.decay_factor, settings.half_life_days),
            weak_threshold: settings.weak_phoneme_threshold,
            min_support: settings.weak_phoneme_min_support,
        }
    }

    pub fn compute(
        &self,
        learner_id: &LearnerId,
        attempts: &[DrillAttempt],
        as_of: DateTime<Utc>,
    ) -> PronunciationMetric {
        let snapshot = Snapshot::prepare(learner_id, attempts, as_of);
        self.compute_snapshot(learner_id, &snapshot, as_of)
    }

    pub fn compute_snapshot(
        &self,
        learner_id: &LearnerId,
        snapshot: &Snapshot<'_>,
        as_of: DateTime<Utc>,
    ) -> PronunciationMetric {
        let attempts = snapshot.attempts();

        let sample_size = attempts
            .iter()
            .filter(|attempt| attempt.has_pronunciation_evidence())
            .count();

        let overall_score = self.decay.weighted_mean(attempts.iter().filter_map(|attempt| {
            attempt
                .pronunciation_score
                .map(|score| (RecencyDecay::age_in_days(attempt.attempted_at, as_of), score))
        }));

        let weak_phonemes = self.weak_phonemes(attempts);

        tracing::debug!(
            learner_id = %learner_id,
            sample_size,
            overall = ?overall_score,
            weak = weak_phonemes.len(),
            "Pronunciation computed"
        );

        PronunciationMetric {
            learner_id: learner_id.clone(),
            overall_score,
            weak_phonemes,
            sample_size,
            computed_at: as_of,
            dropped_count: snapshot.dropped_count(),
        }
    }

    /// Phonemes whose unweighted mean is below the threshold with enough
    /// occurrences to trust it, worst first and then by symbol.
    fn weak_phonemes(&self, attempts: &[&DrillAttempt]) -> Vec<WeakPhoneme> {
        let mut totals: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        for entry in attempts.iter().flat_map(|attempt| attempt.phoneme_breakdown.iter()) {
            let slot = totals.entry(entry.phoneme.trim()).or_insert((0.0, 0));
            slot.0 += entry.score;
            slot.1 += 1;
        }

        let mut weak: Vec<WeakPhoneme> = totals
            .into_iter()
            .filter(|(_, (_, count))| *count >= self.min_support)
            .map(|(phoneme, (sum, count))| WeakPhoneme {
                phoneme: phoneme.to_string(),
                mean_score: sum / count as f64,
                occurrences: count,
            })
            .filter(|phoneme| phoneme.mean_score < self.weak_threshold)
            .collect();

        weak.sort_by(|a, b| {
            a.mean_score
                .total_cmp(&b.mean_score)
                .then_with(|| a.phoneme.cmp(&b.phoneme))
        });
        weak
    }
}
