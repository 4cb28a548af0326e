use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::config::EngineSettings;
use crate::models::{DrillAttempt, LearnerId, StreakRecord, StreakStatus};

use super::snapshot::Snapshot;

/// Decides whether the attempts made on one calendar day count toward a streak.
pub trait QualifyingDay: Debug + Send + Sync {
    fn qualifies(&self, day_attempts: &[&DrillAttempt]) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualifyingRule {
    MinAttempts(u32),
    /// Sum of `duration_seconds`; attempts without a duration add nothing.
    MinTotalDuration(u32),
}

impl QualifyingRule {
    pub fn from_settings(settings: &EngineSettings) -> Self {
        match settings.streak_min_duration_secs {
            Some(secs) => QualifyingRule::MinTotalDuration(secs),
            None => QualifyingRule::MinAttempts(settings.streak_min_attempts.max(1)),
        }
    }
}

impl QualifyingDay for QualifyingRule {
    fn qualifies(&self, day_attempts: &[&DrillAttempt]) -> bool {
        match self {
            QualifyingRule::MinAttempts(min) => day_attempts.len() as u64 >= u64::from(*min),
            QualifyingRule::MinTotalDuration(min_secs) => {
                let total: u64 = day_attempts
                    .iter()
                    .filter_map(|attempt| attempt.duration_seconds)
                    .map(u64::from)
                    .sum();
                !day_attempts.is_empty() && total >= u64::from(*min_secs)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreakEngine {
    predicate: Arc<dyn QualifyingDay>,
    grace_days: u32,
}

impl StreakEngine {
    pub fn new(settings: &EngineSettings) -> Self {
        Self::with_predicate(
            Arc::new(QualifyingRule::from_settings(settings)),
            settings.grace_days,
        )
    }

    pub fn with_predicate(predicate: Arc<dyn QualifyingDay>, grace_days: u32) -> Self {
        Self {
            predicate,
            grace_days,
        }
    }

    pub fn compute(
        &self,
        learner_id: &LearnerId,
        attempts: &[DrillAttempt],
        timezone: Tz,
        as_of: DateTime<Utc>,
    ) -> StreakRecord {
        let snapshot = Snapshot::prepare(learner_id, attempts, as_of);
        self.compute_snapshot(learner_id, &snapshot, timezone, as_of)
    }

    pub fn compute_snapshot(
        &self,
        learner_id: &LearnerId,
        snapshot: &Snapshot<'_>,
        timezone: Tz,
        as_of: DateTime<Utc>,
    ) -> StreakRecord {
        let today = as_of.with_timezone(&timezone).date_naive();
        let days = self.qualifying_days(snapshot.attempts(), timezone);

        let mut longest = 0u32;
        let mut run = 0u32;
        let mut previous: Option<NaiveDate> = None;
        for day in &days {
            run = match previous {
                Some(prev) if (*day - prev).num_days() == 1 => run + 1,
                _ => 1,
            };
            longest = longest.max(run);
            previous = Some(*day);
        }

        // `run` now holds the length of the run ending at the latest qualifying day.
        let last_active_date = days.last().copied();
        let current_streak = match last_active_date {
            Some(last) if (today - last).num_days() <= i64::from(self.grace_days) => run,
            _ => 0,
        };

        let streak_status = if current_streak == 0 {
            StreakStatus::Broken
        } else if last_active_date == Some(today) {
            StreakStatus::Active
        } else {
            StreakStatus::AtRisk
        };

        tracing::debug!(
            learner_id = %learner_id,
            %timezone,
            %today,
            qualifying_days = days.len(),
            current_streak,
            longest_streak = longest,
            status = streak_status.as_str(),
            "Streak computed"
        );

        StreakRecord {
            learner_id: learner_id.clone(),
            current_streak,
            longest_streak: longest,
            last_active_date,
            streak_status,
            timezone: timezone.name().to_string(),
            as_of_date: today,
            dropped_count: snapshot.dropped_count(),
        }
    }

    /// Distinct local calendar dates meeting the predicate, ascending.
    fn qualifying_days(&self, attempts: &[&DrillAttempt], timezone: Tz) -> Vec<NaiveDate> {
        let mut by_day: BTreeMap<NaiveDate, Vec<&DrillAttempt>> = BTreeMap::new();
        for attempt in attempts {
            let day = attempt.attempted_at.with_timezone(&timezone).date_naive();
            by_day.entry(day).or_default().push(*attempt);
        }

        by_day
            .into_iter()
            .filter(|(_, day_attempts)| self.predicate.qualifies(day_attempts))
            .map(|(day, _)| day)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::snapshot::fixtures::*;
    use chrono::{Duration, TimeZone};

    fn engine() -> StreakEngine {
        StreakEngine::new(&EngineSettings::default())
    }

    fn day(offset: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 15, 0, 0).unwrap() + Duration::days(offset)
    }

    fn on_days(offsets: &[i64]) -> Vec<DrillAttempt> {
        offsets
            .iter()
            .map(|offset| attempt(&format!("d{}", offset), day(*offset)))
            .collect()
    }

    fn run(attempts: &[DrillAttempt], as_of: DateTime<Utc>) -> StreakRecord {
        engine().compute(&learner(), attempts, Tz::UTC, as_of)
    }

    #[test]
    fn no_activity_is_a_broken_zero_streak() {
        let record = run(&[], day(0));
        assert_eq!(record.current_streak, 0);
        assert_eq!(record.longest_streak, 0);
        assert_eq!(record.last_active_date, None);
        assert_eq!(record.streak_status, StreakStatus::Broken);
    }

    #[test]
    fn consecutive_days_up_to_today_are_active() {
        let record = run(&on_days(&[0, 1, 2]), day(2) + Duration::hours(1));
        assert_eq!(record.current_streak, 3);
        assert_eq!(record.longest_streak, 3);
        assert_eq!(record.streak_status, StreakStatus::Active);
        assert_eq!(record.last_active_date, Some(day(2).date_naive()));
    }

    #[test]
    fn grace_day_keeps_streak_at_risk() {
        let record = run(&on_days(&[0, 1, 2]), day(3));
        assert_eq!(record.current_streak, 3);
        assert_eq!(record.streak_status, StreakStatus::AtRisk);
    }

    #[test]
    fn second_missed_day_breaks_streak() {
        let record = run(&on_days(&[0, 1, 2]), day(4));
        assert_eq!(record.current_streak, 0);
        assert_eq!(record.longest_streak, 3);
        assert_eq!(record.streak_status, StreakStatus::Broken);
    }

    #[test]
    fn longest_run_survives_gaps() {
        let attempts = on_days(&[0, 1, 5, 6, 7]);
        assert_eq!(run(&attempts, day(7)).longest_streak, 3);
        assert_eq!(run(&attempts, day(20)).longest_streak, 3);

        let earlier_longest = on_days(&[0, 1, 2, 3, 8, 9]);
        let record = run(&earlier_longest, day(9));
        assert_eq!(record.longest_streak, 4);
        assert_eq!(record.current_streak, 2);
        assert!(record.current_streak <= record.longest_streak);
    }

    #[test]
    fn several_attempts_on_one_day_count_once() {
        let mut attempts = on_days(&[0, 1]);
        attempts.push(attempt("extra", day(1) + Duration::hours(2)));
        let record = run(&attempts, day(1) + Duration::hours(5));
        assert_eq!(record.current_streak, 2);
    }

    #[test]
    fn dates_follow_the_reference_timezone() {
        let late_evening_ny = Utc.with_ymd_and_hms(2024, 1, 10, 23, 30, 0).unwrap();
        let later_same_evening_ny = Utc.with_ymd_and_hms(2024, 1, 11, 1, 0, 0).unwrap();
        let attempts = vec![
            attempt("a", late_evening_ny),
            attempt("b", later_same_evening_ny),
        ];
        let as_of = Utc.with_ymd_and_hms(2024, 1, 11, 12, 0, 0).unwrap();

        let utc = engine().compute(&learner(), &attempts, Tz::UTC, as_of);
        assert_eq!(utc.current_streak, 2);
        assert_eq!(utc.streak_status, StreakStatus::Active);

        let new_york = engine().compute(&learner(), &attempts, chrono_tz::America::New_York, as_of);
        assert_eq!(new_york.current_streak, 1);
        assert_eq!(new_york.streak_status, StreakStatus::AtRisk);
        assert_eq!(new_york.timezone, "America/New_York");
        assert_eq!(
            new_york.last_active_date,
            Some(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap())
        );
    }

    #[test]
    fn min_attempts_rule_filters_light_days() {
        let engine = StreakEngine::with_predicate(Arc::new(QualifyingRule::MinAttempts(2)), 1);
        let mut attempts = on_days(&[0, 1, 2]);
        attempts.push(attempt("x1", day(1) + Duration::hours(1)));
        attempts.push(attempt("x2", day(2) + Duration::hours(1)));

        let record = engine.compute(&learner(), &attempts, Tz::UTC, day(2) + Duration::hours(3));
        assert_eq!(record.current_streak, 2);
        assert_eq!(record.last_active_date, Some(day(2).date_naive()));
    }

    #[test]
    fn duration_rule_sums_the_day() {
        let engine = StreakEngine::with_predicate(Arc::new(QualifyingRule::MinTotalDuration(600)), 1);
        let mut short = attempt("short", day(0));
        short.duration_seconds = Some(300);
        let mut first = attempt("first", day(1));
        first.duration_seconds = Some(400);
        let mut second = attempt("second", day(1) + Duration::minutes(30));
        second.duration_seconds = Some(200);

        let record = engine.compute(&learner(), &[short, first, second], Tz::UTC, day(1) + Duration::hours(2));
        assert_eq!(record.current_streak, 1);
        assert_eq!(record.longest_streak, 1);
        assert_eq!(record.streak_status, StreakStatus::Active);
    }

    #[test]
    fn wider_grace_window_is_configurable() {
        let engine = StreakEngine::new(&EngineSettings {
            grace_days: 2,
            ..EngineSettings::default()
        });
        let record = engine.compute(&learner(), &on_days(&[0, 1]), Tz::UTC, day(3));
        assert_eq!(record.current_streak, 2);
        assert_eq!(record.streak_status, StreakStatus::AtRisk);
    }

    #[test]
    fn future_attempts_do_not_extend_streak() {
        let attempts = on_days(&[0, 1, 2]);
        let record = run(&attempts, day(1) + Duration::hours(1));
        assert_eq!(record.current_streak, 2);
        assert_eq!(record.dropped_count, 1);
    }
}
