//! Exponential backoff for stage retries.
//!
//! delay = min(base * multiplier^retry_count, max_delay), without jitter.

use super::types::ErrorCategory;
use crate::config::RecoveryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Base delay floor applied to resource faults.
pub const RESOURCE_MIN_BASE_DELAY_MS: u64 = 5000;
/// Base delay factor applied to timeout faults.
pub const TIMEOUT_BASE_DELAY_FACTOR: f64 = 1.5;
/// Multiplier used for external service faults.
pub const EXTERNAL_SERVICE_MULTIPLIER: f64 = 3.0;

/// Backoff parameters carried by an error context.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the first retry in milliseconds.
    pub base_delay_ms: u64,
    /// Growth factor per retry.
    pub multiplier: f64,
    /// Cap on a single delay in milliseconds.
    pub max_delay_ms: u64,
}

impl BackoffPolicy {
    /// Creates a policy.
    #[must_use]
    pub fn new(base_delay_ms: u64, multiplier: f64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            multiplier,
            max_delay_ms,
        }
    }

    /// The configured policy, before category adjustments.
    #[must_use]
    pub fn from_config(config: &RecoveryConfig) -> Self {
        Self::new(
            config.base_delay_ms,
            config.backoff_multiplier,
            config.max_delay_ms,
        )
    }

    /// Widens the policy for categories that need longer waits.
    #[must_use]
    pub fn adjusted_for(mut self, category: ErrorCategory) -> Self {
        match category {
            ErrorCategory::Timeout => {
                self.base_delay_ms = scale(self.base_delay_ms, TIMEOUT_BASE_DELAY_FACTOR);
            }
            ErrorCategory::Resource => {
                self.base_delay_ms = self.base_delay_ms.max(RESOURCE_MIN_BASE_DELAY_MS);
            }
            ErrorCategory::ExternalService => {
                self.multiplier = self.multiplier.max(EXTERNAL_SERVICE_MULTIPLIER);
            }
            _ => {}
        }
        self
    }

    /// Delay before retry number `retry_count + 1`.
    #[must_use]
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let factor = self.multiplier.powi(exponent);
        let delay = scale(self.base_delay_ms, factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&RecoveryConfig::default())
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// No more retries.
    GiveUp,
}

/// Decides whether another retry is allowed.
#[must_use]
pub fn should_retry(policy: &BackoffPolicy, retry_count: u32, max_retries: u32) -> RetryDecision {
    if retry_count >= max_retries {
        RetryDecision::GiveUp
    } else {
        RetryDecision::Retry(policy.delay_for(retry_count))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn scale(value_ms: u64, factor: f64) -> u64 {
    let scaled = (value_ms as f64 * factor).round();
    if scaled.is_finite() && scaled < u64::MAX as f64 {
        scaled.max(0.0) as u64
    } else {
        u64::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_sequence() {
        let policy = BackoffPolicy::new(100, 2.0, 60_000);
        let delays: Vec<_> = (0..4).map(|n| policy.delay_for(n).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800]);
    }

    #[test]
    fn test_strictly_increasing_until_cap() {
        let policy = BackoffPolicy::default();
        let mut previous = Duration::ZERO;
        for n in 0..8 {
            let delay = policy.delay_for(n);
            assert!(delay > previous, "retry {n} did not grow");
            previous = delay;
        }
    }

    #[test]
    fn test_capped_at_max() {
        let policy = BackoffPolicy::new(1000, 2.0, 5000);
        assert_eq!(policy.delay_for(10), Duration::from_millis(5000));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(5000));
    }

    #[test]
    fn test_category_adjustments() {
        let base = BackoffPolicy::new(1000, 2.0, 300_000);
        assert_eq!(base.adjusted_for(ErrorCategory::Timeout).base_delay_ms, 1500);
        assert_eq!(base.adjusted_for(ErrorCategory::Resource).base_delay_ms, 5000);
        assert_eq!(base.adjusted_for(ErrorCategory::ExternalService).multiplier, 3.0);
        assert_eq!(base.adjusted_for(ErrorCategory::Network), base);

        let slow = BackoffPolicy::new(8000, 2.0, 300_000);
        assert_eq!(slow.adjusted_for(ErrorCategory::Resource).base_delay_ms, 8000);
    }

    #[test]
    fn test_should_retry() {
        let policy = BackoffPolicy::new(10, 2.0, 1000);
        assert_eq!(should_retry(&policy, 0, 3), RetryDecision::Retry(Duration::from_millis(10)));
        assert_eq!(should_retry(&policy, 2, 3), RetryDecision::Retry(Duration::from_millis(40)));
        assert_eq!(should_retry(&policy, 3, 3), RetryDecision::GiveUp);
        assert_eq!(should_retry(&policy, 0, 0), RetryDecision::GiveUp);
    }
}
