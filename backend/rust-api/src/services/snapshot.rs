use chrono::{DateTime, Utc};

use crate::models::{DrillAttempt, LearnerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DropReason {
    FutureTimestamp,
    ScoreOutOfRange,
    MalformedPhoneme,
    ForeignLearner,
    Undecodable,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::FutureTimestamp => "future_timestamp",
            DropReason::ScoreOutOfRange => "score_out_of_range",
            DropReason::MalformedPhoneme => "malformed_phoneme",
            DropReason::ForeignLearner => "foreign_learner",
            DropReason::Undecodable => "undecodable",
        }
    }
}

/// The well-formed part of an attempt history, ordered by
/// (`attempted_at`, `attempt_id`).
#[derive(Debug, Clone)]
pub struct Snapshot<'a> {
    attempts: Vec<&'a DrillAttempt>,
    dropped: Vec<(String, DropReason)>,
}

impl<'a> Snapshot<'a> {
    pub fn prepare(learner_id: &LearnerId, attempts: &'a [DrillAttempt], as_of: DateTime<Utc>) -> Self {
        let mut kept = Vec::with_capacity(attempts.len());
        let mut dropped = Vec::new();

        for attempt in attempts {
            match check_attempt(learner_id, attempt, as_of) {
                Ok(()) => kept.push(attempt),
                Err(reason) => dropped.push((attempt.attempt_id.clone(), reason)),
            }
        }

        kept.sort_by(|a, b| {
            a.attempted_at
                .cmp(&b.attempted_at)
                .then_with(|| a.attempt_id.cmp(&b.attempt_id))
        });

        Self {
            attempts: kept,
            dropped,
        }
    }

    /// Adds records the source could not decode to the dropped list.
    pub fn with_undecodable<I>(mut self, attempt_ids: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.dropped.extend(
            attempt_ids
                .into_iter()
                .map(|id| (id, DropReason::Undecodable)),
        );
        self
    }

    pub fn attempts(&self) -> &[&'a DrillAttempt] {
        &self.attempts
    }

    pub fn dropped_count(&self) -> usize {
        self.dropped.len()
    }

    /// `(attempt_id, reason)` for every rejected record.
    pub fn dropped(&self) -> &[(String, DropReason)] {
        &self.dropped
    }
}

fn check_attempt(
    learner_id: &LearnerId,
    attempt: &DrillAttempt,
    as_of: DateTime<Utc>,
) -> Result<(), DropReason> {
    if !attempt.learner_id.eq_ignore_ascii_case(learner_id.as_str()) {
        return Err(DropReason::ForeignLearner);
    }
    if attempt.attempted_at > as_of {
        return Err(DropReason::FutureTimestamp);
    }
    let scores_ok = [attempt.accuracy_score, attempt.pronunciation_score]
        .iter()
        .flatten()
        .all(|score| is_unit_score(*score));
    if !scores_ok {
        return Err(DropReason::ScoreOutOfRange);
    }
    for entry in &attempt.phoneme_breakdown {
        if entry.phoneme.trim().is_empty() || !is_unit_score(entry.score) {
            return Err(DropReason::MalformedPhoneme);
        }
    }
    Ok(())
}

fn is_unit_score(score: f64) -> bool {
    score.is_finite() && (0.0..=1.0).contains(&score)
}
