//! Batch Loader Service
//!
//! Pulls the remote collection one page at a time into the shared catalog.
//!
//! # State Machine
//!
//! ```text
//! Idle ──load──▶ Loading ──ok──▶ Idle | Complete
//!   ▲              │  ├──malformed──▶ Idle
//!   │              │  └──rejected / retries exhausted──▶ Failed
//!   └──cancel──────┘
//! ```
//!
//! `load_next_batch` is single-flight: the `Loading` check and transition
//! happen under one lock, so a second call while a page is in flight is
//! skipped without touching the source. Every load carries its own
//! [`CancellationToken`] and the generation it started under; a response
//! that arrives after `cancel` or `reset` finds the generation moved on and
//! is dropped without touching the catalog. A load whose future is dropped
//! or panics before it settles puts the loader back to `Idle` on unwind.
//!
//! Records that fail normalization are skipped and counted; the page still
//! counts as loaded. The cursor is therefore kept in pages, not records.
//!
//! After a successful append the batch is written to the persistent cache,
//! then `Progress`, `BatchLoaded`, and on the last page `Complete` are
//! emitted, in that order.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::post_process::PostProcessor;
use super::snapshot_cache::PersistentCache;
use crate::application::dto::RawPage;
use crate::application::ports::{
    LoaderEvent, LoaderEventSink, NoOpEventSink, PageQuery, RecordSource,
};
use crate::config::SourceConfig;
use crate::domain::catalog::{Record, SharedCatalog};
use crate::error::LoadError;
use crate::observability::{
    record_batch_failure, record_batch_loaded, record_batch_retry, record_records_rejected,
};
use crate::resilience::{ExponentialBackoffCalculator, RetryPolicy};

/// Default records per page.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Default batch size above which post-processing leaves the async task.
const DEFAULT_PARALLEL_THRESHOLD: usize = 100;

/// Loader tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderSettings {
    /// Records per page.
    pub page_size: usize,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
    /// Extra `name=value` pairs sent with every page request.
    pub filters: BTreeMap<String, String>,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            retry: RetryPolicy::default(),
            filters: BTreeMap::new(),
        }
    }
}

impl LoaderSettings {
    /// Settings from the source configuration.
    #[must_use]
    pub fn from_config(config: &SourceConfig) -> Self {
        Self {
            page_size: config.page_size.max(1),
            retry: config.retry.to_policy(),
            filters: BTreeMap::new(),
        }
    }

    /// Set the page size (at least 1).
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Add server-side filter pairs.
    #[must_use]
    pub fn with_filters(mut self, filters: BTreeMap<String, String>) -> Self {
        self.filters = filters;
        self
    }
}

/// Loader lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderStatus {
    /// Ready to load the next page.
    #[default]
    Idle,
    /// A page is in flight.
    Loading,
    /// Every page has been loaded.
    Complete,
    /// The last load failed; the next call retries the same page.
    Failed,
}

/// Why a load request did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another page is in flight.
    InFlight,
    /// Nothing left to load.
    Complete,
}

/// What one successful load did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    /// Page number loaded.
    pub page: usize,
    /// Store position of the first appended record.
    pub start: usize,
    /// Records appended.
    pub appended: usize,
    /// Records in the store after the append.
    pub loaded: usize,
    /// Server-reported total.
    pub total: Option<usize>,
    /// Whether this was the last page.
    pub complete: bool,
    /// Fetch attempts, including the first.
    pub attempts: u32,
}

/// Result of [`BatchLoader::load_next_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A page was appended.
    Loaded(BatchSummary),
    /// Nothing was done.
    Skipped(SkipReason),
    /// The load was cancelled; the catalog is untouched.
    Cancelled,
}

#[derive(Debug, Default)]
struct LoaderState {
    status: LoaderStatus,
    next_page: usize,
    total_pages: Option<usize>,
    generation: u64,
    in_flight: Option<CancellationToken>,
    last_error: Option<LoadError>,
    filters: BTreeMap<String, String>,
}

impl LoaderState {
    fn new(filters: BTreeMap<String, String>) -> Self {
        Self {
            next_page: 1,
            filters,
            ..Self::default()
        }
    }

    /// Cancel any in-flight load and invalidate its generation.
    fn abandon_in_flight(&mut self) {
        self.generation += 1;
        if let Some(token) = self.in_flight.take() {
            token.cancel();
        }
    }
}

/// Returns the loader to `Idle` if a load is dropped while in flight.
///
/// Disarmed once the load settles through `commit` or `fail`.
struct InFlightGuard {
    state: Arc<Mutex<LoaderState>>,
    generation: u64,
    page: usize,
    armed: bool,
}

impl InFlightGuard {
    fn new(state: &Arc<Mutex<LoaderState>>, generation: u64, page: usize) -> Self {
        Self {
            state: Arc::clone(state),
            generation,
            page,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.lock();
        if state.generation != self.generation || state.status != LoaderStatus::Loading {
            return;
        }
        state.abandon_in_flight();
        state.status = LoaderStatus::Idle;
        tracing::warn!(page = self.page, "Batch load dropped before it settled");
    }
}

/// Loads pages into a [`SharedCatalog`].
///
/// Cheap to clone; clones share state, so a clone can be moved into a
/// spawned task while the original cancels it.
#[derive(Clone)]
pub struct BatchLoader {
    source: Arc<dyn RecordSource>,
    catalog: SharedCatalog,
    cache: Option<PersistentCache>,
    processor: Arc<PostProcessor>,
    events: Arc<dyn LoaderEventSink>,
    page_size: usize,
    retry: RetryPolicy,
    state: Arc<Mutex<LoaderState>>,
}

impl fmt::Debug for BatchLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BatchLoader")
            .field("status", &state.status)
            .field("next_page", &state.next_page)
            .field("total_pages", &state.total_pages)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl BatchLoader {
    /// Create a loader with no cache, a no-op event sink, and rayon
    /// post-processing.
    #[must_use]
    pub fn new(
        source: Arc<dyn RecordSource>,
        catalog: SharedCatalog,
        settings: LoaderSettings,
    ) -> Self {
        Self {
            source,
            catalog,
            cache: None,
            processor: Arc::new(PostProcessor::rayon(DEFAULT_PARALLEL_THRESHOLD)),
            events: Arc::new(NoOpEventSink),
            page_size: settings.page_size.max(1),
            retry: settings.retry,
            state: Arc::new(Mutex::new(LoaderState::new(settings.filters))),
        }
    }

    /// Persist every batch to this cache.
    ///
    /// The cache is scoped to this loader's page size and filters.
    #[must_use]
    pub fn with_cache(mut self, cache: PersistentCache) -> Self {
        cache.set_scope(self.cache_scope(&self.state.lock().filters));
        self.cache = Some(cache);
        self
    }

    /// Deliver events to this sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn LoaderEventSink>) -> Self {
        self.events = events;
        self
    }

    /// Use this post-processor.
    #[must_use]
    pub fn with_processor(mut self, processor: Arc<PostProcessor>) -> Self {
        self.processor = processor;
        self
    }

    /// Shared catalog the loader appends to.
    #[must_use]
    pub fn catalog(&self) -> SharedCatalog {
        Arc::clone(&self.catalog)
    }

    /// Records per page.
    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// Current state.
    #[must_use]
    pub fn status(&self) -> LoaderStatus {
        self.state.lock().status
    }

    /// Whether a page is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.status() == LoaderStatus::Loading
    }

    /// Whether every page has been loaded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status() == LoaderStatus::Complete
    }

    /// Next page to fetch (1-based).
    #[must_use]
    pub fn next_page(&self) -> usize {
        self.state.lock().next_page
    }

    /// Page count reported by the source, once known.
    #[must_use]
    pub fn total_pages(&self) -> Option<usize> {
        self.state.lock().total_pages
    }

    /// Server-side filters sent with every page request.
    #[must_use]
    pub fn filters(&self) -> BTreeMap<String, String> {
        self.state.lock().filters.clone()
    }

    /// Error of the last failed load, cleared by the next success.
    #[must_use]
    pub fn last_error(&self) -> Option<LoadError> {
        self.state.lock().last_error.clone()
    }

    /// Fetch and append the next page.
    ///
    /// Returns `Skipped` while another page is in flight or once the
    /// collection is complete, and `Cancelled` if [`cancel`](Self::cancel)
    /// or [`reset`](Self::reset) ran while this page was in flight.
    pub async fn load_next_batch(&self) -> Result<LoadOutcome, LoadError> {
        let (page, generation, token, filters) = {
            let mut state = self.state.lock();
            match state.status {
                LoaderStatus::Loading => return Ok(LoadOutcome::Skipped(SkipReason::InFlight)),
                LoaderStatus::Complete => return Ok(LoadOutcome::Skipped(SkipReason::Complete)),
                LoaderStatus::Idle | LoaderStatus::Failed => {}
            }
            state.status = LoaderStatus::Loading;
            let token = CancellationToken::new();
            state.in_flight = Some(token.clone());
            (
                state.next_page,
                state.generation,
                token,
                state.filters.clone(),
            )
        };
        let mut guard = InFlightGuard::new(&self.state, generation, page);

        let request_id = Uuid::new_v4();
        let started = Instant::now();
        tracing::info!(%request_id, page, page_size = self.page_size, "Loading batch");

        let query = PageQuery::new(page, self.page_size).with_filters(filters);
        let (raw, attempts) = match self.fetch_with_retry(&query, &token, request_id).await {
            Ok(fetched) => fetched,
            Err(LoadError::Cancelled) => return Ok(Self::cancelled(request_id, page)),
            Err(e) => {
                guard.disarm();
                return self.fail(generation, request_id, page, e);
            }
        };

        let normalized = raw.normalize();
        if let Some(first) = normalized.rejected.first() {
            record_records_rejected(normalized.rejected.len());
            tracing::warn!(
                %request_id,
                page,
                rejected = normalized.rejected.len(),
                kept = normalized.records.len(),
                first_reason = %first,
                "Skipping invalid records"
            );
        }
        let records = self.processor.process(normalized.records).await;

        let Some(summary) = self.commit(generation, &token, page, &raw, records.clone(), attempts)
        else {
            return Ok(Self::cancelled(request_id, page));
        };
        guard.disarm();

        self.persist(&summary, &records).await;
        self.announce(&summary, records);

        record_batch_loaded(summary.appended, started.elapsed());
        tracing::info!(
            %request_id,
            page,
            appended = summary.appended,
            loaded = summary.loaded,
            total = ?summary.total,
            complete = summary.complete,
            attempts,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch loaded"
        );
        Ok(LoadOutcome::Loaded(summary))
    }

    /// Cancel the in-flight load, if any, returning the loader to `Idle`.
    ///
    /// Returns whether a load was cancelled.
    pub fn cancel(&self) -> bool {
        let mut state = self.state.lock();
        if state.status != LoaderStatus::Loading {
            return false;
        }
        state.abandon_in_flight();
        state.status = LoaderStatus::Idle;
        tracing::info!(page = state.next_page, "Batch load cancelled");
        true
    }

    /// Cancel any load, rewind to page 1, and empty the catalog.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.abandon_in_flight();
        state.status = LoaderStatus::Idle;
        state.next_page = 1;
        state.total_pages = None;
        state.last_error = None;
        self.catalog.write().reset();
        tracing::info!("Batch loader reset");
    }

    /// Replace the server-side filters and start over from page 1.
    ///
    /// The cache is rescoped, so data cached under other filters is never
    /// restored for these.
    pub fn set_filters(&self, filters: BTreeMap<String, String>) {
        if let Some(cache) = &self.cache {
            cache.set_scope(self.cache_scope(&filters));
        }
        tracing::info!(filters = filters.len(), "Server filters changed");
        self.state.lock().filters = filters;
        self.reset();
    }

    /// Continue after a warm start that restored `pages` whole pages.
    pub fn resume_after_pages(&self, pages: usize, total: Option<usize>) {
        let mut state = self.state.lock();
        state.abandon_in_flight();
        state.next_page = pages + 1;
        state.total_pages = total.map(|t| t.div_ceil(self.page_size));
        state.last_error = None;

        let complete = state.total_pages.is_some_and(|t| pages >= t);
        state.status = if complete {
            LoaderStatus::Complete
        } else {
            LoaderStatus::Idle
        };
        tracing::info!(
            pages,
            total = ?total,
            next_page = state.next_page,
            complete,
            "Loader resumed"
        );
    }

    /// Continue after the host supplied `loaded` records.
    ///
    /// `loaded` is expected to cover whole pages unless it already reaches
    /// `total`.
    pub fn resume_from(&self, loaded: usize, total: Option<usize>) {
        let mut state = self.state.lock();
        state.abandon_in_flight();
        state.next_page = loaded / self.page_size + 1;
        state.total_pages = total.map(|t| t.div_ceil(self.page_size));
        state.last_error = None;

        let complete = total.is_some_and(|t| loaded >= t);
        state.status = if complete {
            LoaderStatus::Complete
        } else {
            LoaderStatus::Idle
        };

        if !complete && loaded % self.page_size != 0 {
            tracing::warn!(
                loaded,
                page_size = self.page_size,
                "Resuming from a partial page"
            );
        }
        tracing::info!(
            loaded,
            total = ?total,
            next_page = state.next_page,
            complete,
            "Loader resumed"
        );
    }

    /// Ask the source for the authoritative total and reconcile.
    ///
    /// Fetches a single one-record page. A loader that has fetched every
    /// page of the new total is marked complete; one marked complete that
    /// falls short goes back to `Idle` so loading continues. A changed
    /// total or status is announced as `Progress`.
    pub async fn refresh_total(&self) -> Result<usize, LoadError> {
        let (generation, filters) = {
            let state = self.state.lock();
            (state.generation, state.filters.clone())
        };
        let request_id = Uuid::new_v4();
        let query = PageQuery::new(1, 1).with_filters(filters);
        let token = CancellationToken::new();
        let (raw, _) = self.fetch_with_retry(&query, &token, request_id).await?;
        let total = raw.pagination.total;

        let (loaded, changed) = {
            let mut state = self.state.lock();
            if state.generation != generation {
                tracing::debug!(%request_id, "Discarding stale total");
                return Ok(total);
            }

            let (loaded, total_changed) = {
                let mut catalog = self.catalog.write();
                let total_changed = catalog.total_count() != Some(total);
                if total_changed {
                    catalog.set_total_count(Some(total));
                }
                (catalog.loaded_count(), total_changed)
            };
            let total_pages = total.div_ceil(self.page_size);
            state.total_pages = Some(total_pages);

            let before = state.status;
            match state.status {
                LoaderStatus::Idle | LoaderStatus::Failed if state.next_page > total_pages => {
                    state.status = LoaderStatus::Complete;
                }
                LoaderStatus::Complete if state.next_page <= total_pages => {
                    state.status = LoaderStatus::Idle;
                }
                _ => {}
            }

            tracing::info!(
                %request_id,
                total,
                loaded,
                next_page = state.next_page,
                status = ?state.status,
                "Total reconciled"
            );
            (loaded, total_changed || before != state.status)
        };

        if changed {
            self.events.emit(LoaderEvent::Progress {
                loaded,
                total: Some(total),
            });
        }
        Ok(total)
    }

    fn cache_scope(&self, filters: &BTreeMap<String, String>) -> String {
        let mut scope = format!("limit={}", self.page_size);
        for (name, value) in filters {
            scope.push('&');
            scope.push_str(name);
            scope.push('=');
            scope.push_str(value);
        }
        scope
    }

    async fn fetch_with_retry(
        &self,
        query: &PageQuery,
        token: &CancellationToken,
        request_id: Uuid,
    ) -> Result<(RawPage, u32), LoadError> {
        let mut backoff = ExponentialBackoffCalculator::new(&self.retry);
        let mut attempts = 0_u32;

        loop {
            attempts += 1;
            let result = tokio::select! {
                biased;
                () = token.cancelled() => return Err(LoadError::Cancelled),
                result = self.source.fetch_page(query) => result,
            };

            let err = match result {
                Ok(page) => return Ok((page, attempts)),
                Err(e) => LoadError::from(e),
            };
            if !err.is_retryable() {
                return Err(err);
            }

            let Some(delay) = backoff.next_backoff() else {
                return Err(LoadError::RetriesExhausted {
                    attempts,
                    last_error: err.to_string(),
                });
            };

            record_batch_retry(err.reason());
            tracing::warn!(
                %request_id,
                page = query.page,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Batch fetch failed, retrying"
            );

            tokio::select! {
                biased;
                () = token.cancelled() => return Err(LoadError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Append under the state lock if this load is still current.
    fn commit(
        &self,
        generation: u64,
        token: &CancellationToken,
        page: usize,
        raw: &RawPage,
        records: Vec<Record>,
        attempts: u32,
    ) -> Option<BatchSummary> {
        let mut state = self.state.lock();
        if state.generation != generation || token.is_cancelled() {
            return None;
        }

        let appended = records.len();
        let (start, loaded, total) = {
            let mut catalog = self.catalog.write();
            let start = catalog.append_batch(records, Some(raw.pagination.total));
            (start, catalog.loaded_count(), catalog.total_count())
        };

        state.next_page = page + 1;
        state.total_pages = Some(raw.pagination.pages);
        let complete = state.next_page > raw.pagination.pages;
        state.status = if complete {
            LoaderStatus::Complete
        } else {
            LoaderStatus::Idle
        };
        state.in_flight = None;
        state.last_error = None;

        Some(BatchSummary {
            page,
            start,
            appended,
            loaded,
            total,
            complete,
            attempts,
        })
    }

    async fn persist(&self, summary: &BatchSummary, records: &[Record]) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(e) = cache
            .save_batch(summary.start, summary.page, records, summary.total)
            .await
        {
            tracing::warn!(page = summary.page, error = %e, "Failed to cache batch");
        }
        if summary.complete {
            let all = self.catalog.read().store().to_vec();
            if let Err(e) = cache.save(&all, summary.total, summary.page).await {
                tracing::warn!(error = %e, "Failed to cache snapshot");
            }
        }
    }

    fn announce(&self, summary: &BatchSummary, records: Vec<Record>) {
        self.events.emit(LoaderEvent::Progress {
            loaded: summary.loaded,
            total: summary.total,
        });
        self.events.emit(LoaderEvent::BatchLoaded {
            page: summary.page,
            records: records.into(),
        });
        if summary.complete {
            let all = self.catalog.read().store().to_vec();
            self.events.emit(LoaderEvent::Complete {
                records: all.into(),
            });
        }
    }

    fn fail(
        &self,
        generation: u64,
        request_id: Uuid,
        page: usize,
        err: LoadError,
    ) -> Result<LoadOutcome, LoadError> {
        {
            let mut state = self.state.lock();
            if state.generation != generation {
                return Ok(Self::cancelled(request_id, page));
            }
            state.status = match err {
                LoadError::MalformedResponse { .. } => LoaderStatus::Idle,
                _ => LoaderStatus::Failed,
            };
            state.in_flight = None;
            state.last_error = Some(err.clone());
        }

        record_batch_failure(err.reason());
        tracing::error!(%request_id, page, error = %err, reason = err.reason(), "Batch load failed");
        self.events.emit(LoaderEvent::Error { error: err.clone() });
        Err(err)
    }

    fn cancelled(request_id: Uuid, page: usize) -> LoadOutcome {
        tracing::debug!(%request_id, page, "Discarding cancelled batch");
        LoadOutcome::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Semaphore;

    use crate::application::dto::{RawPagination, RawRecord};
    use crate::application::ports::{
        ChannelEventSink, InMemorySnapshotStore, MockRecordSource, SourceError,
    };
    use crate::domain::catalog::Catalog;
    use crate::domain::index::TierTable;
    use crate::domain::shared::ManualClock;

    fn raw_page(page: usize, pages: usize, total: usize, size: usize) -> RawPage {
        let first = (page - 1) * size;
        let count = size.min(total.saturating_sub(first));
        RawPage {
            items: (first..first + count)
                .map(|i| RawRecord {
                    symbol: Some(format!("T{i}")),
                    exchange: Some("nyse".to_string()),
                    price: Some(json!(10)),
                    pe_ratio: Some(json!(15)),
                    ..RawRecord::default()
                })
                .collect(),
            pagination: RawPagination { page, pages, total },
        }
    }

    fn catalog() -> SharedCatalog {
        Catalog::new(TierTable::default()).into_shared()
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            ..RetryPolicy::default()
        }
    }

    fn paged_source(pages: usize, total: usize, size: usize) -> MockRecordSource {
        let mut source = MockRecordSource::new();
        source
            .expect_fetch_page()
            .returning(move |q| Ok(raw_page(q.page, pages, total, size)));
        source
    }

    fn loader(source: MockRecordSource) -> BatchLoader {
        BatchLoader::new(
            Arc::new(source),
            catalog(),
            LoaderSettings::default().with_retry(fast_retry()),
        )
    }

    /// Holds every fetch until a permit is added.
    struct GatedSource {
        gate: Semaphore,
        calls: AtomicUsize,
    }

    impl GatedSource {
        fn new() -> Self {
            Self {
                gate: Semaphore::new(0),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RecordSource for GatedSource {
        async fn fetch_page(&self, query: &PageQuery) -> Result<RawPage, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
            Ok(raw_page(query.page, 3, 150, 50))
        }
    }

    async fn wait_for_calls(source: &GatedSource, n: usize) {
        while source.calls() < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn three_pages_reach_completion() {
        let loader = loader(paged_source(3, 150, 50));

        let mut progress = Vec::new();
        for _ in 0..3 {
            let LoadOutcome::Loaded(summary) = loader.load_next_batch().await.unwrap() else {
                panic!("expected a loaded batch");
            };
            progress.push((summary.loaded, summary.complete));
        }

        assert_eq!(progress, vec![(50, false), (100, false), (150, true)]);
        assert!(loader.is_complete());
        assert_eq!(loader.total_pages(), Some(3));
        assert_eq!(
            loader.load_next_batch().await.unwrap(),
            LoadOutcome::Skipped(SkipReason::Complete)
        );
    }

    #[tokio::test]
    async fn batches_get_derived_fields() {
        let loader = loader(paged_source(1, 3, 50));
        loader.load_next_batch().await.unwrap();

        let catalog = loader.catalog();
        let guard = catalog.read();
        let first = guard.get(0).unwrap();
        assert_eq!(first.exchange, "NYSE");
        assert!(first.score.is_some());
    }

    #[tokio::test]
    async fn events_follow_append_order() {
        let (sink, mut rx) = ChannelEventSink::new();
        let loader = loader(paged_source(2, 60, 50)).with_events(Arc::new(sink));

        loader.load_next_batch().await.unwrap();
        loader.load_next_batch().await.unwrap();

        let kinds: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind())
            .collect();
        assert_eq!(
            kinds,
            vec!["progress", "batch_loaded", "progress", "batch_loaded", "complete"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_then_append_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        let mut source = MockRecordSource::new();
        source.expect_fetch_page().times(3).returning(move |q| {
            if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(SourceError::Transient {
                    status: Some(503),
                    message: "unavailable".to_string(),
                })
            } else {
                Ok(raw_page(q.page, 3, 150, 50))
            }
        });
        let loader = loader(source);

        let LoadOutcome::Loaded(summary) = loader.load_next_batch().await.unwrap() else {
            panic!("expected a loaded batch");
        };
        assert_eq!(summary.attempts, 3);
        assert_eq!(summary.appended, 50);
        assert_eq!(loader.catalog().read().loaded_count(), 50);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_fail_and_emit_error() {
        let mut source = MockRecordSource::new();
        source.expect_fetch_page().times(4).returning(|_| {
            Err(SourceError::Transient {
                status: None,
                message: "connection reset".to_string(),
            })
        });
        let (sink, mut rx) = ChannelEventSink::new();
        let loader = loader(source).with_events(Arc::new(sink));

        let err = loader.load_next_batch().await.unwrap_err();
        assert!(matches!(err, LoadError::RetriesExhausted { attempts: 4, .. }));
        assert_eq!(loader.status(), LoaderStatus::Failed);
        assert_eq!(loader.last_error(), Some(err.clone()));
        assert_eq!(rx.try_recv().unwrap(), LoaderEvent::Error { error: err });
        assert_eq!(loader.next_page(), 1);
    }

    #[tokio::test]
    async fn malformed_page_is_not_retried_and_returns_to_idle() {
        let mut source = MockRecordSource::new();
        source.expect_fetch_page().times(1).returning(|_| {
            Err(SourceError::Malformed {
                message: "expected an object".to_string(),
            })
        });
        let loader = loader(source);

        let err = loader.load_next_batch().await.unwrap_err();
        assert!(matches!(err, LoadError::MalformedResponse { .. }));
        assert_eq!(loader.status(), LoaderStatus::Idle);
        assert_eq!(loader.catalog().read().loaded_count(), 0);
    }

    #[tokio::test]
    async fn invalid_records_are_skipped_and_the_page_still_counts() {
        let mut source = MockRecordSource::new();
        source.expect_fetch_page().times(1).returning(|q| {
            let mut page = raw_page(q.page, 2, 100, 50);
            page.items[3] = RawRecord::default();
            page.items[7].price = Some(json!("-4"));
            Ok(page)
        });
        let loader = loader(source);

        let LoadOutcome::Loaded(summary) = loader.load_next_batch().await.unwrap() else {
            panic!("expected a loaded batch");
        };
        assert_eq!(summary.appended, 48);
        assert_eq!(loader.next_page(), 2);
        assert_eq!(loader.status(), LoaderStatus::Idle);
        assert!(loader.catalog().read().get(3).is_some_and(|r| r.symbol.as_str() == "T4"));
    }

    #[tokio::test]
    async fn oversized_numbers_load_without_panicking() {
        let mut source = MockRecordSource::new();
        source.expect_fetch_page().times(1).returning(|_| {
            Ok(RawPage {
                items: vec![RawRecord {
                    symbol: Some("HUGE".to_string()),
                    price: Some(json!("100000000000000000000")),
                    avg_volume: Some(json!(10_000_000_000_u64)),
                    ..RawRecord::default()
                }],
                pagination: RawPagination {
                    page: 1,
                    pages: 1,
                    total: 1,
                },
            })
        });
        let loader = loader(source);

        assert!(matches!(
            loader.load_next_batch().await,
            Ok(LoadOutcome::Loaded(_))
        ));
        assert!(loader.is_complete());
        let catalog = loader.catalog();
        let guard = catalog.read();
        assert_eq!(guard.get(0).unwrap().dollar_volume(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_load_returns_to_idle() {
        let source = Arc::new(GatedSource::new());
        let loader = BatchLoader::new(source.clone(), catalog(), LoaderSettings::default());

        let timed_out =
            tokio::time::timeout(Duration::from_millis(20), loader.load_next_batch()).await;
        assert!(timed_out.is_err());
        assert_eq!(loader.status(), LoaderStatus::Idle);
        assert_eq!(loader.next_page(), 1);

        source.gate.add_permits(1);
        assert!(matches!(
            loader.load_next_batch().await,
            Ok(LoadOutcome::Loaded(_))
        ));
        assert_eq!(source.calls(), 2);
        assert_eq!(loader.catalog().read().loaded_count(), 50);
    }

    /// Panics on the first fetch, then serves pages.
    struct PanicOnceSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RecordSource for PanicOnceSource {
        async fn fetch_page(&self, query: &PageQuery) -> Result<RawPage, SourceError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("source blew up");
            }
            Ok(raw_page(query.page, 3, 150, 50))
        }
    }

    #[tokio::test]
    async fn panicking_load_returns_to_idle() {
        let source = Arc::new(PanicOnceSource {
            calls: AtomicUsize::new(0),
        });
        let loader = BatchLoader::new(source, catalog(), LoaderSettings::default());

        let crashed = tokio::spawn({
            let loader = loader.clone();
            async move { loader.load_next_batch().await }
        })
        .await;
        assert!(crashed.unwrap_err().is_panic());
        assert_eq!(loader.status(), LoaderStatus::Idle);

        assert!(matches!(
            loader.load_next_batch().await,
            Ok(LoadOutcome::Loaded(_))
        ));
    }

    #[tokio::test]
    async fn failed_loader_retries_same_page() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        let mut source = MockRecordSource::new();
        source.expect_fetch_page().times(2).returning(move |q| {
            assert_eq!(q.page, 1);
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(SourceError::Rejected {
                    status: 403,
                    message: "forbidden".to_string(),
                })
            } else {
                Ok(raw_page(1, 2, 100, 50))
            }
        });
        let loader = loader(source);

        assert!(matches!(
            loader.load_next_batch().await,
            Err(LoadError::Rejected { status: 403, .. })
        ));
        assert_eq!(loader.status(), LoaderStatus::Failed);

        assert!(matches!(
            loader.load_next_batch().await,
            Ok(LoadOutcome::Loaded(_))
        ));
        assert_eq!(loader.status(), LoaderStatus::Idle);
        assert!(loader.last_error().is_none());
    }

    #[tokio::test]
    async fn second_call_while_loading_is_skipped() {
        let source = Arc::new(GatedSource::new());
        let loader = BatchLoader::new(source.clone(), catalog(), LoaderSettings::default());

        let first = tokio::spawn({
            let loader = loader.clone();
            async move { loader.load_next_batch().await }
        });
        wait_for_calls(&source, 1).await;

        assert!(loader.is_loading());
        assert_eq!(
            loader.load_next_batch().await.unwrap(),
            LoadOutcome::Skipped(SkipReason::InFlight)
        );

        source.gate.add_permits(1);
        assert!(matches!(
            first.await.unwrap(),
            Ok(LoadOutcome::Loaded(_))
        ));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn cancel_mid_flight_leaves_catalog_untouched() {
        let source = Arc::new(GatedSource::new());
        let loader = BatchLoader::new(source.clone(), catalog(), LoaderSettings::default());

        let pending = tokio::spawn({
            let loader = loader.clone();
            async move { loader.load_next_batch().await }
        });
        wait_for_calls(&source, 1).await;

        assert!(loader.cancel());
        assert_eq!(loader.status(), LoaderStatus::Idle);
        source.gate.add_permits(1);

        assert_eq!(pending.await.unwrap(), Ok(LoadOutcome::Cancelled));
        assert_eq!(loader.catalog().read().loaded_count(), 0);
        assert_eq!(loader.next_page(), 1);
        assert!(!loader.cancel());
    }

    #[tokio::test]
    async fn batches_are_cached_and_snapshot_written_on_completion() {
        let store = Arc::new(InMemorySnapshotStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = PersistentCache::new(
            store,
            clock,
            "1",
            Duration::from_secs(3_600),
            Duration::from_secs(3_600),
        );
        let loader = loader(paged_source(2, 80, 50)).with_cache(cache.clone());

        loader.load_next_batch().await.unwrap();
        assert_eq!(cache.load_first_page().await.unwrap().len(), 50);
        assert!(cache.load().await.is_none());

        loader.load_next_batch().await.unwrap();
        let snapshot = cache.load().await.unwrap();
        assert_eq!(snapshot.stocks.len(), 80);
        assert_eq!(snapshot.total_count, Some(80));
        assert_eq!(snapshot.pages, Some(2));
        let cached = cache.load_batches().await.unwrap();
        assert_eq!(cached.records.len(), 80);
        assert_eq!(cached.pages, 2);
    }

    fn cache_over(store: Arc<InMemorySnapshotStore>) -> PersistentCache {
        PersistentCache::new(
            store,
            Arc::new(ManualClock::new(1_000)),
            "1",
            Duration::from_secs(3_600),
            Duration::from_secs(3_600),
        )
    }

    #[tokio::test]
    async fn filtered_batches_never_restore_as_the_full_collection() {
        let store = Arc::new(InMemorySnapshotStore::new());
        let filters = BTreeMap::from([("exchange".to_string(), "NYSE".to_string())]);
        let filtered = |source: MockRecordSource, cache: PersistentCache| {
            BatchLoader::new(
                Arc::new(source),
                catalog(),
                LoaderSettings::default().with_filters(filters.clone()),
            )
            .with_cache(cache)
        };
        filtered(paged_source(1, 10, 50), cache_over(store.clone()))
            .load_next_batch()
            .await
            .unwrap();

        let same_filters = cache_over(store.clone());
        let _reader = filtered(MockRecordSource::new(), same_filters.clone());
        assert_eq!(same_filters.scope(), "limit=50&exchange=NYSE");
        assert_eq!(same_filters.load().await.unwrap().stocks.len(), 10);

        let unfiltered = cache_over(store.clone());
        let _reader = loader(MockRecordSource::new()).with_cache(unfiltered.clone());
        assert_eq!(unfiltered.scope(), "limit=50");
        assert!(unfiltered.load().await.is_none());
        assert!(unfiltered.load_batches().await.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn set_filters_rescopes_the_cache() {
        let store = Arc::new(InMemorySnapshotStore::new());
        let cache = cache_over(store);
        let loader = loader(paged_source(1, 10, 50)).with_cache(cache.clone());
        loader.load_next_batch().await.unwrap();
        assert!(cache.load().await.is_some());

        loader.set_filters(BTreeMap::from([("search".to_string(), "app".to_string())]));
        assert_eq!(cache.scope(), "limit=50&search=app");
        assert_eq!(loader.filters().get("search").map(String::as_str), Some("app"));
        assert!(cache.load().await.is_none());
        assert_eq!(loader.next_page(), 1);
        assert_eq!(loader.catalog().read().loaded_count(), 0);
    }

    #[tokio::test]
    async fn resume_continues_after_restored_pages() {
        let mut source = MockRecordSource::new();
        source
            .expect_fetch_page()
            .withf(|q| q.page == 3)
            .times(1)
            .returning(|q| Ok(raw_page(q.page, 3, 150, 50)));
        let loader = loader(source);

        loader.resume_from(100, Some(150));
        assert_eq!(loader.next_page(), 3);
        assert_eq!(loader.total_pages(), Some(3));

        let LoadOutcome::Loaded(summary) = loader.load_next_batch().await.unwrap() else {
            panic!("expected a loaded batch");
        };
        assert!(summary.complete);
    }

    #[tokio::test]
    async fn resume_after_pages_ignores_skipped_records() {
        let mut source = MockRecordSource::new();
        source
            .expect_fetch_page()
            .withf(|q| q.page == 3)
            .times(1)
            .returning(|q| Ok(raw_page(q.page, 3, 150, 50)));
        let loader = loader(source);

        // Two pages restored, short of 100 records after skips.
        loader.resume_after_pages(2, Some(150));
        assert_eq!(loader.next_page(), 3);
        assert_eq!(loader.status(), LoaderStatus::Idle);

        loader.load_next_batch().await.unwrap();
        assert!(loader.is_complete());

        loader.resume_after_pages(3, Some(150));
        assert!(loader.is_complete());
    }

    #[tokio::test]
    async fn resume_with_everything_is_complete() {
        let loader = loader(MockRecordSource::new());
        loader.resume_from(150, Some(150));
        assert!(loader.is_complete());
    }

    #[tokio::test]
    async fn refreshed_total_reopens_short_catalog() {
        let mut source = MockRecordSource::new();
        source
            .expect_fetch_page()
            .withf(|q| q.page == 1 && q.limit == 1)
            .times(1)
            .returning(|_| Ok(raw_page(1, 200, 200, 1)));
        let loader = loader(source);
        let restored = (0..150)
            .map(|i| Record::new(format!("R{i}"), "NYSE", rust_decimal::Decimal::ONE))
            .collect();
        loader.catalog().write().replace(restored, Some(150));
        loader.resume_from(150, Some(150));
        assert!(loader.is_complete());

        assert_eq!(loader.refresh_total().await.unwrap(), 200);
        assert_eq!(loader.status(), LoaderStatus::Idle);
        assert_eq!(loader.next_page(), 4);
        assert_eq!(loader.total_pages(), Some(4));
        assert_eq!(loader.catalog().read().total_count(), Some(200));
    }

    #[tokio::test]
    async fn refreshed_total_announces_changes_only() {
        let mut source = MockRecordSource::new();
        source
            .expect_fetch_page()
            .withf(|q| q.limit == 1)
            .times(2)
            .returning(|_| Ok(raw_page(1, 120, 120, 1)));
        let (sink, mut rx) = ChannelEventSink::new();
        let loader = loader(source).with_events(Arc::new(sink));
        loader.resume_after_pages(2, Some(100));

        assert_eq!(loader.refresh_total().await.unwrap(), 120);
        assert_eq!(
            rx.try_recv().unwrap(),
            LoaderEvent::Progress {
                loaded: 0,
                total: Some(120),
            }
        );

        loader.refresh_total().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn refreshed_total_completes_a_loader_with_every_page() {
        let mut source = MockRecordSource::new();
        source
            .expect_fetch_page()
            .times(1)
            .returning(|_| Ok(raw_page(1, 90, 90, 1)));
        let loader = loader(source);
        loader.resume_after_pages(2, None);
        assert_eq!(loader.status(), LoaderStatus::Idle);

        loader.refresh_total().await.unwrap();
        assert!(loader.is_complete());
        assert_eq!(loader.total_pages(), Some(2));
    }

    #[tokio::test]
    async fn filters_are_forwarded_with_every_page() {
        let mut source = MockRecordSource::new();
        source
            .expect_fetch_page()
            .withf(|q| q.filters.get("exchange").map(String::as_str) == Some("NYSE"))
            .times(1)
            .returning(|q| Ok(raw_page(q.page, 1, 10, 50)));
        let filters = BTreeMap::from([("exchange".to_string(), "NYSE".to_string())]);
        let loader = BatchLoader::new(
            Arc::new(source),
            catalog(),
            LoaderSettings::default().with_filters(filters),
        );

        loader.load_next_batch().await.unwrap();
        assert!(loader.is_complete());
    }

    #[tokio::test]
    async fn reset_rewinds_and_clears_catalog() {
        let loader = loader(paged_source(3, 150, 50));
        loader.load_next_batch().await.unwrap();
        loader.reset();

        assert_eq!(loader.next_page(), 1);
        assert_eq!(loader.status(), LoaderStatus::Idle);
        assert_eq!(loader.catalog().read().loaded_count(), 0);
    }
}
