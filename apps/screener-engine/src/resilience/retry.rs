//! Retry policy with exponential backoff for page fetches.
//!
//! # Retryable Failures
//!
//! | Retryable | Non-Retryable |
//! |-----------|---------------|
//! | HTTP 408 (Request Timeout) | HTTP 400 (Bad Request) |
//! | HTTP 429 (Rate Limited) | HTTP 401/403 (Auth Errors) |
//! | HTTP 5xx | HTTP 404 (Unknown Collection) |
//! | Network timeouts, connection reset | Malformed page body |
//!
//! The delay before retry `n` (0-based) is `base_delay * multiplier^n`,
//! capped at `max_delay`, with optional symmetric jitter.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry policy for page fetches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt (default: 3).
    pub max_retries: u32,
    /// Delay before the first retry (default: 500ms).
    pub base_delay: Duration,
    /// Upper bound on any single delay (default: 10s).
    pub max_delay: Duration,
    /// Growth factor per retry (default: 2.0).
    pub backoff_multiplier: f64,
    /// Jitter as a fraction of the delay (default: 0.0).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Total attempts including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Stateful backoff sequence for one load.
#[derive(Debug)]
pub struct ExponentialBackoffCalculator {
    current_retry: u32,
    max_retries: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    backoff_multiplier: f64,
    jitter_factor: f64,
}

impl ExponentialBackoffCalculator {
    /// Start a sequence for a policy.
    #[must_use]
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            current_retry: 0,
            max_retries: policy.max_retries,
            base_delay_ms: u64::try_from(policy.base_delay.as_millis()).unwrap_or(u64::MAX),
            max_delay_ms: u64::try_from(policy.max_delay.as_millis()).unwrap_or(u64::MAX),
            backoff_multiplier: policy.backoff_multiplier,
            jitter_factor: policy.jitter_factor,
        }
    }

    /// Delay before the next retry, or `None` once retries are used up.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.current_retry >= self.max_retries {
            return None;
        }

        let base_ms = self.base_backoff_ms();
        let capped_ms = self.apply_jitter(base_ms).min(self.max_delay_ms);
        self.current_retry += 1;

        Some(Duration::from_millis(capped_ms))
    }

    fn base_backoff_ms(&self) -> u64 {
        let exponent = i32::try_from(self.current_retry).unwrap_or(i32::MAX);
        let multiplier = self.backoff_multiplier.powi(exponent);
        let backoff = self.base_delay_ms as f64 * multiplier;
        if !backoff.is_finite() || backoff >= self.max_delay_ms as f64 {
            return self.max_delay_ms;
        }
        backoff as u64
    }

    fn apply_jitter(&self, backoff_ms: u64) -> u64 {
        if self.jitter_factor <= 0.0 || backoff_ms == 0 {
            return backoff_ms;
        }
        let mut rng = rand::rng();
        let spread = backoff_ms as f64 * self.jitter_factor;
        let min = (backoff_ms as f64 - spread).max(0.0);
        let max = backoff_ms as f64 + spread;
        rng.random_range(min..=max) as u64
    }
}

/// Retry decision for a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transient; try again.
    Retryable,
    /// Permanent.
    NonRetryable,
    /// Throttled; try again after backing off.
    RateLimited,
}

/// Categorize an HTTP status.
#[must_use]
pub const fn categorize_status(status_code: u16) -> ErrorCategory {
    match status_code {
        429 => ErrorCategory::RateLimited,
        408 | 500..=599 => ErrorCategory::Retryable,
        _ => ErrorCategory::NonRetryable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
    }

    #[test]
    fn doubling_sequence_without_jitter() {
        let mut backoff = ExponentialBackoffCalculator::new(&RetryPolicy::default());
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(500)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(1_000)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(2_000)));
        assert_eq!(backoff.next_backoff(), None);
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 10.0,
            jitter_factor: 0.0,
        };
        let mut backoff = ExponentialBackoffCalculator::new(&policy);
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(1)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(5)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn jitter_stays_in_band() {
        let policy = RetryPolicy {
            jitter_factor: 0.2,
            ..RetryPolicy::default()
        };
        for _ in 0..100 {
            let mut backoff = ExponentialBackoffCalculator::new(&policy);
            let delay = backoff.next_backoff().unwrap();
            assert!(
                delay >= Duration::from_millis(400) && delay <= Duration::from_millis(600),
                "{delay:?} outside 400-600ms"
            );
        }
    }

    #[test]
    fn no_retry_policy_yields_nothing() {
        let mut backoff = ExponentialBackoffCalculator::new(&RetryPolicy::no_retry());
        assert_eq!(backoff.next_backoff(), None);
    }

    #[test_case(408 => ErrorCategory::Retryable ; "request timeout")]
    #[test_case(429 => ErrorCategory::RateLimited ; "rate limited")]
    #[test_case(500 => ErrorCategory::Retryable ; "server error")]
    #[test_case(503 => ErrorCategory::Retryable ; "unavailable")]
    #[test_case(400 => ErrorCategory::NonRetryable ; "bad request")]
    #[test_case(401 => ErrorCategory::NonRetryable ; "unauthorized")]
    #[test_case(404 => ErrorCategory::NonRetryable ; "not found")]
    #[test_case(422 => ErrorCategory::NonRetryable ; "unprocessable")]
    fn status_categories(status: u16) -> ErrorCategory {
        categorize_status(status)
    }
}
