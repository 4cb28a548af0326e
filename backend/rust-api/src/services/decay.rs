use chrono::{DateTime, Utc};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Exponential recency weighting: an attempt `half_life_days` older than
/// another gets `decay_factor` times its weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecencyDecay {
    decay_factor: f64,
    half_life_days: f64,
}

impl RecencyDecay {
    pub fn new(decay_factor: f64, half_life_days: f64) -> Self {
        Self {
            decay_factor,
            half_life_days,
        }
    }

    pub fn age_in_days(attempted_at: DateTime<Utc>, as_of: DateTime<Utc>) -> f64 {
        let millis = (as_of - attempted_at).num_milliseconds().max(0);
        millis as f64 / 1000.0 / SECONDS_PER_DAY
    }

    pub fn weight(&self, age_days: f64) -> f64 {
        self.decay_factor.powf(age_days.max(0.0) / self.half_life_days)
    }

    /// Weighted mean of `(age_days, value)` samples.
    ///
    /// Ages are shifted so the newest sample has weight 1. Every weight is
    /// scaled by the same constant, so the mean is unchanged while very old
    /// histories cannot underflow to a zero denominator.
    pub fn weighted_mean<I>(&self, samples: I) -> Option<f64>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let samples: Vec<(f64, f64)> = samples.into_iter().collect();
        let min_age = samples
            .iter()
            .map(|(age, _)| *age)
            .fold(f64::INFINITY, f64::min);
        if !min_age.is_finite() {
            return None;
        }

        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;
        for (age, value) in samples {
            let weight = self.weight(age - min_age);
            weighted_sum += weight * value;
            total_weight += weight;
        }

        if total_weight > 0.0 {
            Some((weighted_sum / total_weight).clamp(0.0, 1.0))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn weight_halves_every_half_life() {
        let decay = RecencyDecay::new(0.5, 14.0);
        assert_eq!(decay.weight(0.0), 1.0);
        assert!((decay.weight(14.0) - 0.5).abs() < 1e-12);
        assert!((decay.weight(28.0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn recent_samples_dominate() {
        let decay = RecencyDecay::new(0.5, 14.0);
        let mean = decay.weighted_mean([(0.0, 1.0), (14.0, 0.0)]).unwrap();
        assert!((mean - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn ancient_history_does_not_underflow() {
        let decay = RecencyDecay::new(0.5, 1.0);
        let mean = decay
            .weighted_mean([(50_000.0, 0.4), (50_001.0, 0.4)])
            .unwrap();
        assert!((mean - 0.4).abs() < 1e-12);
    }

    #[test]
    fn empty_input_has_no_mean() {
        let decay = RecencyDecay::new(0.5, 14.0);
        assert_eq!(decay.weighted_mean(Vec::new()), None);
    }

    #[test]
    fn age_is_never_negative() {
        let now = Utc::now();
        assert_eq!(RecencyDecay::age_in_days(now + Duration::hours(3), now), 0.0);
        assert!((RecencyDecay::age_in_days(now - Duration::hours(36), now) - 1.5).abs() < 1e-9);
    }
}
