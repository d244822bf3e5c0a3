//! Delay policy between broker resubscription attempts.
//!
//! The delay for attempt `n` is `first × factor^n`, clamped to `max`. The base
//! is derived from the attempt number alone, so a long run of failures settles
//! at `max` rather than drifting.

use std::time::Duration;

#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Upper bound for any single delay.
    pub max: Duration,
    /// Multiplicative growth factor.
    pub factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            first: Duration::from_millis(500),
            max: Duration::from_secs(30),
            factor: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Delay for the given attempt (0-indexed).
    pub fn next(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth() {
        let policy = BackoffPolicy {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            factor: 2.0,
        };
        assert_eq!(policy.next(0), Duration::from_millis(100));
        assert_eq!(policy.next(1), Duration::from_millis(200));
        assert_eq!(policy.next(2), Duration::from_millis(400));
        assert_eq!(policy.next(3), Duration::from_millis(800));
    }

    #[test]
    fn test_clamped_to_max() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.next(10), Duration::from_secs(30));
        assert_eq!(policy.next(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_first_above_max_is_clamped() {
        let policy = BackoffPolicy {
            first: Duration::from_secs(60),
            max: Duration::from_secs(5),
            factor: 1.0,
        };
        assert_eq!(policy.next(0), Duration::from_secs(5));
    }
}
