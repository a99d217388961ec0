//! Retry and idle backoff schedules.

use crate::PipelineConfig;
use std::time::Duration;

/// What to do with a document after a failed stage execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Hold the document back for this long, then try again
    Retry(Duration),
    /// Stop retrying and mark the document failed
    GiveUp,
}

/// Exponential retry schedule over a document's consecutive-failure count.
///
/// The delay after the `n`-th consecutive failure is `base * 2^(n-1)`,
/// capped at `max`. The `max_attempts`-th consecutive failure gives up.
///
/// # Examples
///
/// ```
/// use imgagent_pipeline::{BackoffPolicy, RetryDecision};
/// use std::time::Duration;
///
/// let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(5), 3);
/// assert_eq!(policy.decide(1, false), RetryDecision::Retry(Duration::from_secs(1)));
/// assert_eq!(policy.decide(2, false), RetryDecision::Retry(Duration::from_secs(2)));
/// assert_eq!(policy.decide(3, false), RetryDecision::GiveUp);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    max_attempts: u32,
    fail_fast_on_permanent: bool,
}

impl BackoffPolicy {
    /// Create a policy that retries permanent errors like transient ones.
    pub fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max,
            max_attempts,
            fail_fast_on_permanent: false,
        }
    }

    /// Give up on the first permanent error.
    pub fn with_fail_fast_on_permanent(mut self, enabled: bool) -> Self {
        self.fail_fast_on_permanent = enabled;
        self
    }

    /// Build the policy from pipeline settings.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            Duration::from_millis(*config.retry_base_ms()),
            Duration::from_millis(*config.retry_max_ms()),
            *config.max_attempts(),
        )
        .with_fail_fast_on_permanent(*config.fail_fast_on_permanent())
    }

    /// Consecutive failures that exhaust the retries.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the next attempt after `failure_count` consecutive failures.
    pub fn delay_for(&self, failure_count: u32) -> Duration {
        let exponent = failure_count.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Decide what follows the `failure_count`-th consecutive failure.
    pub fn decide(&self, failure_count: u32, permanent: bool) -> RetryDecision {
        if failure_count >= self.max_attempts || (permanent && self.fail_fast_on_permanent) {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry(self.delay_for(failure_count))
        }
    }
}

/// Growing sleep between polls that found nothing to do.
#[derive(Debug, Clone)]
pub struct IdleBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl IdleBackoff {
    /// Start at `initial`, doubling up to `max`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            current: initial,
        }
    }

    /// Sleep to take now; the next call returns a longer one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Back to the initial sleep after useful work.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_is_capped() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), Duration::from_millis(1_000), 10);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(5), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(64), Duration::from_millis(1_000));
    }

    #[test]
    fn test_fail_fast_on_permanent() {
        let policy = BackoffPolicy::new(Duration::from_millis(10), Duration::from_millis(100), 5);
        assert!(matches!(policy.decide(1, true), RetryDecision::Retry(_)));

        let policy = policy.with_fail_fast_on_permanent(true);
        assert_eq!(policy.decide(1, true), RetryDecision::GiveUp);
        assert!(matches!(policy.decide(1, false), RetryDecision::Retry(_)));
    }

    #[test]
    fn test_idle_backoff_doubles_and_resets() {
        let mut idle = IdleBackoff::new(Duration::from_millis(10), Duration::from_millis(35));
        assert_eq!(idle.next_delay(), Duration::from_millis(10));
        assert_eq!(idle.next_delay(), Duration::from_millis(20));
        assert_eq!(idle.next_delay(), Duration::from_millis(35));
        assert_eq!(idle.next_delay(), Duration::from_millis(35));
        idle.reset();
        assert_eq!(idle.next_delay(), Duration::from_millis(10));
    }
}
