//! Per-task retry policy with configurable backoff and jitter.

use crate::errors::TaskError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^(retry - 1)
    Exponential,
    /// delay = base * retry
    Linear,
    /// delay = base (fixed)
    #[default]
    Constant,
}

/// Jitter strategy to spread out retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

/// Retry policy attached to a task.
///
/// `max_attempts` counts the initial attempt: a policy with
/// `max_attempts = 3` executes a task at most three times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Backoff strategy.
    #[serde(default)]
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    #[serde(default)]
    pub jitter: JitterStrategy,
}

fn default_max_attempts() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    5 * 60 * 1000
}

fn default_max_delay_ms() -> u64 {
    60 * 60 * 1000
}

impl Default for RetryPolicy {
    /// One retry after five minutes.
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff: BackoffStrategy::Constant,
            jitter: JitterStrategy::None,
        }
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// No attempts left.
    GiveUp,
    /// The error is not retryable.
    NotRetryable,
}

impl RetryPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::default().with_max_attempts(1)
    }

    /// A fixed-delay policy.
    #[must_use]
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        Self::default()
            .with_max_attempts(max_attempts)
            .with_base_delay_ms(delay_ms)
            .with_max_delay_ms(delay_ms)
            .with_backoff(BackoffStrategy::Constant)
    }

    /// An exponential policy without jitter.
    #[must_use]
    pub fn exponential(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self::default()
            .with_max_attempts(max_attempts)
            .with_base_delay_ms(u64::try_from(base.as_millis()).unwrap_or(u64::MAX))
            .with_max_delay_ms(u64::try_from(max.as_millis()).unwrap_or(u64::MAX))
            .with_backoff(BackoffStrategy::Exponential)
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }

    /// Calculates the delay before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay_ms;
        let max = self.max_delay_ms;
        let n = retry.max(1);

        let delay = match self.backoff {
            BackoffStrategy::Exponential => base.saturating_mul(2u64.saturating_pow(n - 1)),
            BackoffStrategy::Linear => base.saturating_mul(u64::from(n)),
            BackoffStrategy::Constant => base,
        }
        .min(max);

        let jittered = match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }

    /// Decides what happens after attempt number `attempts_made` failed.
    #[must_use]
    pub fn decide(&self, attempts_made: u32, error: &TaskError) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::NotRetryable;
        }
        if attempts_made >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry(self.delay_for(attempts_made))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_one_retry_after_five_minutes() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.delay_for(1), Duration::from_secs(300));
        assert_eq!(policy.backoff, BackoffStrategy::Constant);
    }

    #[test]
    fn test_delay_exponential_no_jitter() {
        let policy = RetryPolicy::new()
            .with_base_delay_ms(100)
            .with_max_delay_ms(10_000)
            .with_backoff(BackoffStrategy::Exponential);

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_linear_no_jitter() {
        let policy = RetryPolicy::new()
            .with_base_delay_ms(100)
            .with_backoff(BackoffStrategy::Linear);

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(3), Duration::from_millis(300));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = RetryPolicy::exponential(20, Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(11), Duration::from_secs(5));
        assert_eq!(policy.delay_for(64), Duration::from_secs(5));
    }

    #[test]
    fn test_full_jitter_bounded() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(100)).with_jitter(JitterStrategy::Full);
        for _ in 0..20 {
            assert!(policy.delay_for(1) <= Duration::from_millis(100));
        }
    }

    #[test]
    fn test_equal_jitter_bounded() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(100)).with_jitter(JitterStrategy::Equal);
        for _ in 0..20 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(50) && delay <= Duration::from_millis(100));
        }
    }

    #[test]
    fn test_decide() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(5));
        let transient = TaskError::transient("503");

        assert_eq!(policy.decide(1, &transient), RetryDecision::Retry(Duration::from_millis(5)));
        assert_eq!(policy.decide(2, &transient), RetryDecision::Retry(Duration::from_millis(5)));
        assert_eq!(policy.decide(3, &transient), RetryDecision::GiveUp);
        assert_eq!(
            policy.decide(1, &TaskError::not_found("bucket")),
            RetryDecision::NotRetryable
        );
    }

    #[test]
    fn test_no_retry() {
        let policy = RetryPolicy::no_retry();
        assert_eq!(policy.decide(1, &TaskError::transient("x")), RetryDecision::GiveUp);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"max_attempts": 4, "backoff": "exponential"}"#).unwrap();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.backoff, BackoffStrategy::Exponential);
        assert_eq!(policy.base_delay_ms, 300_000);
        assert_eq!(policy.jitter, JitterStrategy::None);
    }
}
