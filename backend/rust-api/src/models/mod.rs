pub mod attempt;
pub mod learner;
pub mod progress;

pub use attempt::{DrillAttempt, DrillType, PhonemeScore};
pub use learner::LearnerId;
pub use progress::{
    ConfidenceMetric, LearnerMetrics, PronunciationMetric, StreakRecord, StreakStatus, Trend,
    WeakPhoneme,
};
