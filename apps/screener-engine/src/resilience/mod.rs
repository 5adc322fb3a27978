//! Resilience Patterns
//!
//! Backoff and status classification for remote page fetches.

pub mod retry;

pub use retry::{ErrorCategory, ExponentialBackoffCalculator, RetryPolicy, categorize_status};
