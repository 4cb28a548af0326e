use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::attempt::DrillType;
use super::learner::LearnerId;

/// Direction of the learner's accuracy between the older and newer half of
/// their history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceMetric {
    pub learner_id: LearnerId,
    /// `None` means "no data yet", never "scored zero".
    pub overall_score: Option<f64>,
    pub by_drill_type: BTreeMap<DrillType, f64>,
    pub sample_size: usize,
    pub computed_at: DateTime<Utc>,
    pub trend: Option<Trend>,
    pub dropped_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeakPhoneme {
    pub phoneme: String,
    pub mean_score: f64,
    pub occurrences: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PronunciationMetric {
    pub learner_id: LearnerId,
    pub overall_score: Option<f64>,
    /// Worst first.
    pub weak_phonemes: Vec<WeakPhoneme>,
    pub sample_size: usize,
    pub computed_at: DateTime<Utc>,
    pub dropped_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakStatus {
    Active,
    AtRisk,
    Broken,
}

impl StreakStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreakStatus::Active => "active",
            StreakStatus::AtRisk => "at_risk",
            StreakStatus::Broken => "broken",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakRecord {
    pub learner_id: LearnerId,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_active_date: Option<NaiveDate>,
    pub streak_status: StreakStatus,
    /// IANA name of the zone the calendar dates were taken in.
    pub timezone: String,
    pub as_of_date: NaiveDate,
    pub dropped_count: usize,
}

/// All three metrics computed from a single attempt snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerMetrics {
    pub learner_id: LearnerId,
    pub confidence: ConfidenceMetric,
    pub pronunciation: PronunciationMetric,
    pub streak: StreakRecord,
}
