//! Error types for batch loading and caching.
//!
//! [`LoadError`] is what the loader surfaces to callers and event sinks.
//! Per-attempt transient failures and cache corruption are recovered
//! locally and only show up in logs and metrics.
//!
//! | Variant | Retried | Surfaced |
//! |---------|---------|----------|
//! | `TransientNetwork` | yes | only via `RetriesExhausted` |
//! | `MalformedResponse` | no | yes |
//! | `Rejected` | no | yes |
//! | `RetriesExhausted` | n/a | yes |
//! | `Cancelled` | no | as an outcome, never an error event |
//! | `CacheCorruption` | no | no (treated as a miss) |
//! | `Storage` | no | no (logged) |

use serde::Serialize;
use thiserror::Error;

use crate::application::ports::{SourceError, StoreError};

/// Batch loader and cache failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadError {
    /// Network failure or retryable HTTP status.
    #[error("Transient network error: {message}")]
    TransientNetwork {
        /// Error details.
        message: String,
    },

    /// Response body did not match the page contract.
    #[error("Malformed response: {message}")]
    MalformedResponse {
        /// Error details.
        message: String,
    },

    /// Source refused the request.
    #[error("Request rejected (HTTP {status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Error details.
        message: String,
    },

    /// Every attempt failed with a transient error.
    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Attempts made, including the first.
        attempts: u32,
        /// Message of the final failure.
        last_error: String,
    },

    /// The load was cancelled.
    #[error("Load cancelled")]
    Cancelled,

    /// Cached payload could not be decoded.
    #[error("Cache entry '{key}' is corrupt: {message}")]
    CacheCorruption {
        /// Storage key.
        key: String,
        /// Decoder message.
        message: String,
    },

    /// Snapshot storage failed.
    #[error("Snapshot storage error: {message}")]
    Storage {
        /// Error details.
        message: String,
    },
}

impl LoadError {
    /// Whether another attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork { .. })
    }

    /// Whether this is a cancellation rather than a failure.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Stable machine-readable reason.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::TransientNetwork { .. } => "TRANSIENT_NETWORK",
            Self::MalformedResponse { .. } => "MALFORMED_RESPONSE",
            Self::Rejected { .. } => "REJECTED",
            Self::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            Self::Cancelled => "CANCELLED",
            Self::CacheCorruption { .. } => "CACHE_CORRUPTION",
            Self::Storage { .. } => "STORAGE",
        }
    }
}

impl From<SourceError> for LoadError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Transient { message, .. } => Self::TransientNetwork { message },
            SourceError::Malformed { message } => Self::MalformedResponse { message },
            SourceError::Rejected { status, message } => Self::Rejected { status, message },
        }
    }
}

impl From<StoreError> for LoadError {
    fn from(err: StoreError) -> Self {
        Self::Storage {
            message: err.to_string(),
        }
    }
}
