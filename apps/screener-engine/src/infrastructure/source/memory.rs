//! In-memory record source.
//!
//! Serves a fixed collection page by page. Used for demos, offline runs,
//! and integration tests, where it can also inject failures and latency.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::application::dto::{RawPage, RawPagination, RawRecord};
use crate::application::ports::{PageQuery, RecordSource, SourceError};
use crate::domain::catalog::Record;

/// Record source over a fixed list.
#[derive(Debug, Default)]
pub struct InMemoryRecordSource {
    items: Vec<RawRecord>,
    latency: Option<Duration>,
    failures: Mutex<VecDeque<SourceError>>,
    requests: Mutex<Vec<PageQuery>>,
    calls: AtomicUsize,
}

impl InMemoryRecordSource {
    /// Serve raw records as-is.
    #[must_use]
    pub fn new(items: Vec<RawRecord>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    /// Serve canonical records.
    #[must_use]
    pub fn from_records(records: &[Record]) -> Self {
        Self::new(records.iter().map(RawRecord::from).collect())
    }

    /// Delay every response.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next calls with these errors, in order.
    pub fn fail_next(&self, errors: impl IntoIterator<Item = SourceError>) {
        self.failures.lock().extend(errors);
    }

    /// Number of `fetch_page` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every query received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<PageQuery> {
        self.requests.lock().clone()
    }

    /// Collection size.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn page(&self, query: &PageQuery) -> RawPage {
        let limit = query.limit.max(1);
        let total = self.items.len();
        let start = query.page.saturating_sub(1).saturating_mul(limit).min(total);
        let end = start.saturating_add(limit).min(total);
        RawPage {
            items: self.items[start..end].to_vec(),
            pagination: RawPagination {
                page: query.page,
                pages: total.div_ceil(limit),
                total,
            },
        }
    }
}

#[async_trait]
impl RecordSource for InMemoryRecordSource {
    async fn fetch_page(&self, query: &PageQuery) -> Result<RawPage, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(query.clone());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let failure = self.failures.lock().pop_front();
        if let Some(err) = failure {
            return Err(err);
        }
        Ok(self.page(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn source(n: usize) -> InMemoryRecordSource {
        let records: Vec<Record> = (0..n)
            .map(|i| Record::new(format!("M{i}"), "NASDAQ", Decimal::from(i + 1)))
            .collect();
        InMemoryRecordSource::from_records(&records)
    }

    #[tokio::test]
    async fn pages_through_the_collection() {
        let source = source(120);
        let last = source.fetch_page(&PageQuery::new(3, 50)).await.unwrap();
        assert_eq!(last.items.len(), 20);
        assert_eq!(last.pagination.pages, 3);
        assert_eq!(last.pagination.total, 120);

        let beyond = source.fetch_page(&PageQuery::new(9, 50)).await.unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn injected_failures_come_first() {
        let source = source(10);
        source.fail_next([SourceError::Malformed {
            message: "truncated".to_string(),
        }]);

        assert!(source.fetch_page(&PageQuery::new(1, 5)).await.is_err());
        assert!(source.fetch_page(&PageQuery::new(1, 5)).await.is_ok());
        assert_eq!(source.requests().len(), 2);
    }
}
