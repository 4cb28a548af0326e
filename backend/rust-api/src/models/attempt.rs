use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of drill the learner practiced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrillType {
    Word,
    Sentence,
    Conversation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhonemeScore {
    pub phoneme: String,
    pub score: f64,
}

impl PhonemeScore {
    pub fn new(phoneme: impl Into<String>, score: f64) -> Self {
        Self {
            phoneme: phoneme.into(),
            score,
        }
    }
}

/// One recorded drill attempt. Immutable once it leaves the attempt source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrillAttempt {
    pub attempt_id: String,
    pub learner_id: String,
    pub drill_id: String,
    pub attempted_at: DateTime<Utc>,
    pub drill_type: DrillType,
    #[serde(default)]
    pub accuracy_score: Option<f64>,
    #[serde(default)]
    pub pronunciation_score: Option<f64>,
    #[serde(default)]
    pub phoneme_breakdown: Vec<PhonemeScore>,
    #[serde(default)]
    pub duration_seconds: Option<u32>,
}

impl DrillAttempt {
    /// True when at least one of the two scalar scores is present.
    pub fn has_any_score(&self) -> bool {
        self.accuracy_score.is_some() || self.pronunciation_score.is_some()
    }

    pub fn has_pronunciation_evidence(&self) -> bool {
        self.pronunciation_score.is_some() || !self.phoneme_breakdown.is_empty()
    }
}
