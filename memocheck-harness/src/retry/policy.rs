//! Retry policy values.

use std::time::Duration;

use crate::error::{HarnessError, HarnessResult};

/// Delay between retry attempts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Backoff {
    /// Retry immediately.
    None,
    /// Constant delay between attempts.
    Fixed(Duration),
    /// Doubling delay starting at `initial`, capped at `max`.
    Exponential {
        /// Delay after the first failed attempt.
        initial: Duration,
        /// Upper bound on any single delay.
        max: Duration,
        /// Add up to a quarter of the delay as random jitter, still capped
        /// at `max`.
        jitter: bool,
    },
}

impl Backoff {
    /// Delay to wait after `failed_attempt` (1-based) before the next one.
    pub fn delay(&self, failed_attempt: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential {
                initial,
                max,
                jitter,
            } => {
                let shift = failed_attempt.saturating_sub(1).min(31);
                let base = initial.saturating_mul(1u32 << shift).min(max);
                if jitter {
                    let quarter = base.as_millis() as u64 / 4;
                    let extra = rand::random_range(0..=quarter);
                    (base + Duration::from_millis(extra)).min(max)
                } else {
                    base
                }
            }
        }
    }
}

/// How an operation is retried when it fails transiently.
///
/// A plain value, threaded into every operation call. Nothing mutates it once
/// a test case begins.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    enabled: bool,
    max_attempts: u32,
    backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` counts the first attempt and must be ≥ 1.
    pub fn new(enabled: bool, max_attempts: u32, backoff: Backoff) -> HarnessResult<Self> {
        if max_attempts == 0 {
            return Err(HarnessError::Config(
                "retry max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            enabled,
            max_attempts,
            backoff,
        })
    }

    /// Run every operation exactly once.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_attempts: 1,
            backoff: Backoff::None,
        }
    }

    /// Retry transient failures up to `max_attempts` total attempts with a
    /// fixed 100ms delay. Zero attempts is clamped to one.
    pub fn eventual(max_attempts: u32) -> Self {
        Self {
            enabled: true,
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Fixed(Duration::from_millis(100)),
        }
    }

    /// Same policy with a different backoff.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Whether retries happen at all.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Total attempts allowed, first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay strategy between attempts.
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Attempts the executor will actually make at most.
    pub fn attempt_budget(&self) -> u32 {
        if self.enabled {
            self.max_attempts
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_attempts_rejected() {
        assert!(matches!(
            RetryPolicy::new(true, 0, Backoff::None),
            Err(HarnessError::Config(_))
        ));
    }

    #[test]
    fn test_disabled_budget_is_one() {
        let policy = RetryPolicy::new(false, 5, Backoff::None).expect("valid");
        assert_eq!(policy.attempt_budget(), 1);
        assert_eq!(RetryPolicy::eventual(5).attempt_budget(), 5);
    }

    #[test]
    fn test_exponential_backoff_doubles_and_caps() {
        let backoff = Backoff::Exponential {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(500),
            jitter: false,
        };
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
        assert_eq!(backoff.delay(4), Duration::from_millis(500));
        assert_eq!(backoff.delay(60), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_within_quarter() {
        let backoff = Backoff::Exponential {
            initial: Duration::from_millis(400),
            max: Duration::from_secs(1),
            jitter: true,
        };
        for _ in 0..50 {
            let d = backoff.delay(1);
            assert!(d >= Duration::from_millis(400) && d <= Duration::from_millis(500));
        }
    }

    #[test]
    fn test_jitter_never_exceeds_max() {
        let backoff = Backoff::Exponential {
            initial: Duration::from_millis(400),
            max: Duration::from_millis(450),
            jitter: true,
        };
        for attempt in 1..=5 {
            for _ in 0..20 {
                let d = backoff.delay(attempt);
                assert!(d >= Duration::from_millis(400), "{d:?}");
                assert!(d <= Duration::from_millis(450), "{d:?}");
            }
        }
    }
}
