//! Record Source Port (Driven Port)
//!
//! Interface to the paginated remote collection.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::application::dto::RawPage;

/// Request for one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageQuery {
    /// 1-based page number.
    pub page: usize,
    /// Page size.
    pub limit: usize,
    /// Extra `name=value` query pairs forwarded to the source.
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
}

impl PageQuery {
    /// Page request without filters.
    #[must_use]
    pub const fn new(page: usize, limit: usize) -> Self {
        Self {
            page,
            limit,
            filters: BTreeMap::new(),
        }
    }

    /// Attach filter pairs.
    #[must_use]
    pub fn with_filters(mut self, filters: BTreeMap<String, String>) -> Self {
        self.filters = filters;
        self
    }
}

/// Record source error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Network failure, timeout, or retryable status.
    #[error("Transient source error: {message}")]
    Transient {
        /// HTTP status, if one was received.
        status: Option<u16>,
        /// Error details.
        message: String,
    },

    /// Body did not decode as a page.
    #[error("Malformed source response: {message}")]
    Malformed {
        /// Error details.
        message: String,
    },

    /// Non-retryable status.
    #[error("Source rejected request (HTTP {status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Error details.
        message: String,
    },
}

/// Port for fetching pages of raw records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch one page.
    async fn fetch_page(&self, query: &PageQuery) -> Result<RawPage, SourceError>;
}
