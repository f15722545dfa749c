//! Retry policy: exponential backoff bounded by a maximum attempt count.

use std::time::Duration;

/// What to do with a failed saga step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule the next delivery attempt after `delay`.
    Retry { delay: Duration },
    /// The failure is permanent (non-retryable, or the retry budget is
    /// spent): undo what already succeeded.
    Compensate,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_multiplier,
        }
    }

    /// Delay before attempt `attempt_number` (1-based):
    /// `base_delay × multiplier^(attempt_number − 1)`.
    pub fn delay_for_attempt(&self, attempt_number: u32) -> Duration {
        let exponent = attempt_number.saturating_sub(1);
        let factor = self.backoff_multiplier.powi(exponent as i32);
        let millis = (self.base_delay.as_millis() as f64 * factor).min(u64::MAX as f64);
        Duration::from_millis(millis as u64)
    }

    /// Decision for a step that failed with retryability `retryable` after
    /// `retry_count` already-scheduled retries.
    pub fn decide(&self, retryable: bool, retry_count: i32) -> RetryDecision {
        if !retryable {
            return RetryDecision::Compensate;
        }

        let attempt_number = retry_count.saturating_add(1).max(1) as u32;
        if attempt_number >= self.max_attempts {
            return RetryDecision::Compensate;
        }

        RetryDecision::Retry {
            delay: self.delay_for_attempt(attempt_number),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(5, Duration::from_millis(1000), 2.0)
    }

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = policy();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(8000));
    }

    #[test]
    fn test_first_retry_uses_base_delay() {
        // A step failing on its first delivery (no retries scheduled yet)
        // waits exactly the base delay.
        match policy().decide(true, 0) {
            RetryDecision::Retry { delay } => assert_eq!(delay, Duration::from_millis(1000)),
            RetryDecision::Compensate => panic!("expected a retry"),
        }
    }

    #[test]
    fn test_retry_budget_is_bounded() {
        let policy = policy();

        // k+1 < max_attempts keeps retrying...
        assert!(matches!(
            policy.decide(true, 3),
            RetryDecision::Retry { .. }
        ));
        // ...and k+1 >= max_attempts compensates.
        assert_eq!(policy.decide(true, 4), RetryDecision::Compensate);
        assert_eq!(policy.decide(true, 100), RetryDecision::Compensate);
    }

    #[test]
    fn test_non_retryable_compensates_immediately() {
        assert_eq!(policy().decide(false, 0), RetryDecision::Compensate);
    }

    #[test]
    fn test_backoff_multiplier_four() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1000), 4.0);
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(16000));
    }
}
