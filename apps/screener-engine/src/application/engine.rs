//! Screener Engine
//!
//! Single owner of every piece of screener state: the shared catalog, the
//! batch loader, both caches, the viewport window, and the render pool
//! bound to a host [`RenderSurface`].
//!
//! The engine is driven by the host: scroll, resize, and timer events go in,
//! [`RenderPass`] reports come out. Loads run on the tokio runtime and report
//! back through a channel drained by [`ScreenerEngine::pump_events`].
//!
//! Lock order is loader state before catalog. The engine only ever takes
//! the catalog lock on its own and never across an `.await`.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::application::ports::{
    ChannelEventSink, CompositeEventSink, InMemorySnapshotStore, LoaderEvent, LoaderEventSink,
    RecordSource, SnapshotStore,
};
use crate::application::services::{
    BatchLoader, ComputeOffload, LoadOutcome, LoaderSettings, LoaderStatus, PersistentCache,
    PostProcessor, QueryCache, QueryCacheStats,
};
use crate::config::{ConfigError, EngineConfig, validate_config};
use crate::domain::catalog::{Catalog, Record, SharedCatalog};
use crate::domain::query::{QueryFilters, QueryRequest, QueryResult, SortSpec, execute};
use crate::domain::rendering::{PoolStats, RenderPool, RenderSurface, SyncReport};
use crate::domain::shared::{Clock, SystemClock};
use crate::domain::viewport::{
    Alignment, Debouncer, ScrollOutcome, ViewportState, VisibleRange, WindowManager,
};
use crate::error::LoadError;
use crate::observability::record_render_pass;

/// Rows the engine currently presents.
#[derive(Debug, Clone, PartialEq)]
pub enum ActiveView {
    /// Every loaded record in store order.
    Full,
    /// Query matches; view index `i` shows store position `positions[i]`.
    Filtered {
        /// Normalized request that produced the positions.
        request: QueryRequest,
        /// Matching store positions in result order.
        positions: Arc<[usize]>,
        /// Catalog generation the positions were computed at.
        generation: u64,
    },
}

impl ActiveView {
    /// Store position shown at view index `index`.
    #[must_use]
    pub fn position(&self, index: usize) -> Option<usize> {
        match self {
            Self::Full => Some(index),
            Self::Filtered { positions, .. } => positions.get(index).copied(),
        }
    }

    /// Active request, if filtered.
    #[must_use]
    pub const fn request(&self) -> Option<&QueryRequest> {
        match self {
            Self::Full => None,
            Self::Filtered { request, .. } => Some(request),
        }
    }
}

/// What one host event did to the rendered rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RenderPass {
    /// Range after the event.
    pub range: VisibleRange,
    /// Whether rows were bound or released.
    pub changed: bool,
    /// Pool work done.
    pub sync: SyncReport,
    /// Whether the event triggered a background page load.
    pub load_requested: bool,
}

/// Loader events drained by [`ScreenerEngine::pump_events`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PumpReport {
    /// Events drained.
    pub processed: usize,
    /// Latest loaded count reported.
    pub loaded: usize,
    /// Latest total reported.
    pub total: Option<usize>,
    /// Whether the collection completed.
    pub complete: bool,
    /// Terminal load errors.
    pub errors: Vec<LoadError>,
    /// Render pass run after the catalog changed.
    pub render: RenderPass,
}

/// How [`ScreenerEngine::warm_start`] populated the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarmStart {
    /// Restored from the full snapshot.
    Snapshot {
        /// Records restored.
        records: usize,
    },
    /// Restored from cached batches.
    Batches {
        /// Records restored.
        records: usize,
    },
    /// Nothing usable cached; the first page was fetched.
    Cold(LoadOutcome),
}

/// Counters for the host's performance overlay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    /// Render passes that bound or released rows.
    pub render_passes: u64,
    /// Duration of the latest render pass.
    pub last_render: Duration,
    /// Mean render pass duration.
    pub average_render: Duration,
    /// Viewport snapshot.
    pub viewport: ViewportState,
    /// Render pool counters.
    pub pool: PoolStats,
    /// Records in the catalog.
    pub loaded: usize,
    /// Server-reported total.
    pub total: Option<usize>,
    /// Loader state.
    pub loader_status: LoaderStatus,
    /// Batches received through the event channel.
    pub batches_loaded: u64,
    /// Background loads started.
    pub load_requests: u64,
    /// Query cache counters.
    pub query_cache: QueryCacheStats,
    /// Post-processing fallbacks to the calling task.
    pub offload_fallbacks: u64,
}

#[derive(Debug, Default)]
struct RenderTimings {
    passes: u64,
    last: Duration,
    total: Duration,
}

/// Builder for [`ScreenerEngine`].
pub struct EngineBuilder<S> {
    surface: S,
    source: Arc<dyn RecordSource>,
    config: EngineConfig,
    store: Option<Arc<dyn SnapshotStore>>,
    clock: Option<Arc<dyn Clock>>,
    offload: Option<Arc<dyn ComputeOffload>>,
    sink: Option<Arc<dyn LoaderEventSink>>,
}

impl<S> fmt::Debug for EngineBuilder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: RenderSurface> EngineBuilder<S> {
    /// Use this configuration instead of the defaults.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Persist snapshots here. Defaults to an in-memory store.
    #[must_use]
    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use this clock for cache TTLs.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Run post-processing on this executor instead of rayon.
    #[must_use]
    pub fn with_offload(mut self, offload: Arc<dyn ComputeOffload>) -> Self {
        self.offload = Some(offload);
        self
    }

    /// Also deliver loader events to this sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn LoaderEventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Validate the configuration and assemble the engine.
    pub fn build(self) -> Result<ScreenerEngine<S>, ConfigError> {
        let config = self.config;
        validate_config(&config)?;

        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let store: Arc<dyn SnapshotStore> = match self.store {
            Some(store) => store,
            None => Arc::new(InMemorySnapshotStore::new()),
        };
        let threshold = config.processing.parallel_threshold;
        let processor = Arc::new(match self.offload {
            Some(offload) => PostProcessor::new(offload, threshold),
            None => PostProcessor::rayon(threshold),
        });

        let (channel, events) = ChannelEventSink::new();
        let sink: Arc<dyn LoaderEventSink> = match self.sink {
            Some(extra) => Arc::new(
                CompositeEventSink::new()
                    .with(Arc::new(channel))
                    .with(extra),
            ),
            None => Arc::new(channel),
        };

        let cache = PersistentCache::new(
            store,
            Arc::clone(&clock),
            config.cache.version.clone(),
            config.cache.snapshot_ttl(),
            config.cache.batch_ttl(),
        );
        let catalog = Catalog::new(config.index.clone()).into_shared();
        let loader = BatchLoader::new(
            self.source,
            Arc::clone(&catalog),
            LoaderSettings::from_config(&config.source),
        )
        .with_cache(cache.clone())
        .with_events(sink)
        .with_processor(Arc::clone(&processor));

        let query_cache = QueryCache::new(
            config.cache.query_capacity,
            config.cache.query_ttl(),
            clock,
        );
        let window = WindowManager::new(config.viewport.to_settings());
        let search = Debouncer::new(config.viewport.search_debounce());

        tracing::info!(
            page_size = loader.page_size(),
            cache_version = %config.cache.version,
            "Screener engine ready"
        );

        Ok(ScreenerEngine {
            config,
            catalog,
            loader,
            cache,
            processor,
            query_cache,
            window,
            pool: RenderPool::new(),
            surface: self.surface,
            view: ActiveView::Full,
            search,
            events,
            load_task: None,
            reconcile_task: None,
            timings: RenderTimings::default(),
            batches_loaded: 0,
            load_requests: 0,
        })
    }
}

/// Virtualized screener over a paginated remote collection.
pub struct ScreenerEngine<S: RenderSurface> {
    config: EngineConfig,
    catalog: SharedCatalog,
    loader: BatchLoader,
    cache: PersistentCache,
    processor: Arc<PostProcessor>,
    query_cache: QueryCache,
    window: WindowManager,
    pool: RenderPool<S::Handle>,
    surface: S,
    view: ActiveView,
    search: Debouncer<String>,
    events: mpsc::UnboundedReceiver<LoaderEvent>,
    load_task: Option<JoinHandle<Result<LoadOutcome, LoadError>>>,
    reconcile_task: Option<JoinHandle<Result<usize, LoadError>>>,
    timings: RenderTimings,
    batches_loaded: u64,
    load_requests: u64,
}

impl<S: RenderSurface> fmt::Debug for ScreenerEngine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScreenerEngine")
            .field("loader", &self.loader)
            .field("range", &self.window.range())
            .field("view", &self.view)
            .finish_non_exhaustive()
    }
}

impl<S: RenderSurface> ScreenerEngine<S> {
    /// Start building an engine over a surface and a record source.
    #[must_use]
    pub fn builder(surface: S, source: Arc<dyn RecordSource>) -> EngineBuilder<S> {
        EngineBuilder {
            surface,
            source,
            config: EngineConfig::default(),
            store: None,
            clock: None,
            offload: None,
            sink: None,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared catalog.
    #[must_use]
    pub fn catalog(&self) -> SharedCatalog {
        Arc::clone(&self.catalog)
    }

    /// Batch loader.
    #[must_use]
    pub const fn loader(&self) -> &BatchLoader {
        &self.loader
    }

    /// Persistent cache.
    #[must_use]
    pub const fn cache(&self) -> &PersistentCache {
        &self.cache
    }

    /// Render surface.
    #[must_use]
    pub const fn surface(&self) -> &S {
        &self.surface
    }

    /// Pooled handle bound at view index `index`.
    #[must_use]
    pub fn handle(&self, index: usize) -> Option<&S::Handle> {
        self.pool.handle(index)
    }

    /// Current materialized range.
    #[must_use]
    pub const fn range(&self) -> VisibleRange {
        self.window.range()
    }

    /// Rows in the active view.
    #[must_use]
    pub fn view_len(&self) -> usize {
        match &self.view {
            ActiveView::Full => self.catalog.read().loaded_count(),
            ActiveView::Filtered { positions, .. } => positions.len(),
        }
    }

    /// Active view.
    #[must_use]
    pub const fn view(&self) -> &ActiveView {
        &self.view
    }

    /// Record shown at view index `index`.
    #[must_use]
    pub fn record_at(&self, index: usize) -> Option<Arc<Record>> {
        let position = self.view.position(index)?;
        self.catalog.read().get(position).cloned()
    }

    // ------------------------------------------------------------------
    // Render-surface contract
    // ------------------------------------------------------------------

    /// Replace every record, e.g. with data the host already holds.
    ///
    /// Cancels any in-flight load; loading resumes after the given records.
    pub fn set_items(&mut self, records: Vec<Record>, total: Option<usize>) -> RenderPass {
        self.abort_tasks();
        let records: Vec<Record> = records
            .into_iter()
            .map(Record::with_derived_fields)
            .collect();
        let count = records.len();
        self.catalog.write().replace(records, total);
        self.loader.resume_from(count, total);
        tracing::info!(records = count, total = ?total, "Items set");
        self.sync_view(true)
    }

    /// Append records after the loaded ones.
    pub fn add_items(&mut self, records: Vec<Record>) -> RenderPass {
        let records: Vec<Record> = records
            .into_iter()
            .map(Record::with_derived_fields)
            .collect();
        let count = records.len();
        self.catalog.write().append_batch(records, None);
        tracing::debug!(records = count, "Items added");
        self.sync_view(false)
    }

    /// Scroll so that view index `index` is visible with the given alignment.
    ///
    /// `None` when the index is outside the view or the viewport has no
    /// usable geometry yet.
    pub fn scroll_to_index(
        &mut self,
        index: usize,
        alignment: Alignment,
        at: Instant,
    ) -> Option<RenderPass> {
        let offset = self.window.offset_for_index(index, alignment)?;
        let container = self.window.state().container_extent;
        Some(self.on_scroll(offset, container, at))
    }

    /// Counters for the host.
    #[must_use]
    pub fn performance_metrics(&self) -> PerformanceMetrics {
        let (loaded, total) = {
            let catalog = self.catalog.read();
            (catalog.loaded_count(), catalog.total_count())
        };
        let average_render = if self.timings.passes == 0 {
            Duration::ZERO
        } else {
            self.timings.total / u32::try_from(self.timings.passes).unwrap_or(u32::MAX)
        };
        PerformanceMetrics {
            render_passes: self.timings.passes,
            last_render: self.timings.last,
            average_render,
            viewport: self.window.state(),
            pool: self.pool.stats(),
            loaded,
            total,
            loader_status: self.loader.status(),
            batches_loaded: self.batches_loaded,
            load_requests: self.load_requests,
            query_cache: self.query_cache.stats(),
            offload_fallbacks: self.processor.fallback_count(),
        }
    }

    // ------------------------------------------------------------------
    // Viewport events
    // ------------------------------------------------------------------

    /// Handle a scroll event.
    ///
    /// Past the load threshold this also starts a background load of the
    /// next page, unless one is running or the collection is complete.
    pub fn on_scroll(&mut self, offset: f64, container_extent: f64, at: Instant) -> RenderPass {
        let outcome = self.window.on_scroll(offset, container_extent, at);
        let mut pass = self.render(outcome, false);
        if outcome.near_boundary {
            pass.load_requested = self.request_more();
        }
        pass
    }

    /// Handle a container resize.
    pub fn on_resize(&mut self, container_extent: f64, at: Instant) -> RenderPass {
        let outcome = self.window.on_resize(container_extent, at);
        self.render(outcome, false)
    }

    /// Timer tick: settles the scroll into idle once it has been quiet.
    pub fn tick(&mut self, at: Instant) -> RenderPass {
        let outcome = self.window.tick(at);
        self.render(outcome, false)
    }

    /// Re-render after the catalog changed outside the event channel,
    /// e.g. after a total reconciliation.
    pub fn refresh(&mut self) -> RenderPass {
        self.sync_view(false)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Show only records matching `filters`, optionally sorted.
    ///
    /// An empty filter set with no sort is the same as
    /// [`clear_filters`](Self::clear_filters).
    pub fn apply_filters(&mut self, filters: QueryFilters, sort: Option<SortSpec>) -> RenderPass {
        let request = QueryRequest {
            filters,
            sort,
            ..QueryRequest::default()
        }
        .normalized();
        if request.filters.is_empty() && request.sort.is_none() {
            return self.clear_filters();
        }

        let (result, generation) = self.run_query(&request);
        tracing::info!(
            matches = result.total_matches,
            generation,
            "Filters applied"
        );
        self.view = ActiveView::Filtered {
            request,
            positions: result.positions,
            generation,
        };
        self.sync_view(true)
    }

    /// Have the source filter the collection and reload it from page 1.
    ///
    /// [`apply_filters`](Self::apply_filters) narrows the records already
    /// loaded; this changes which records are paged in at all. The
    /// persistent cache follows the new filters, so data cached under
    /// other filters is never restored. No filters means the full
    /// collection again.
    pub fn set_source_filters(&mut self, filters: &QueryFilters) -> RenderPass {
        let pairs = filters.to_query_pairs();
        self.abort_tasks();
        tracing::info!(filters = pairs.len(), "Source filters applied");
        self.loader.set_filters(pairs);
        self.query_cache.clear();
        self.search.cancel();
        self.view = ActiveView::Full;
        while self.events.try_recv().is_ok() {}
        self.sync_view(true)
    }

    /// Show every loaded record again.
    pub fn clear_filters(&mut self) -> RenderPass {
        self.view = ActiveView::Full;
        self.search.cancel();
        self.sync_view(true)
    }

    /// Run a query without changing the view. Results are memoized.
    pub fn query(&mut self, request: &QueryRequest) -> QueryResult {
        self.run_query(request).0
    }

    /// Feed a keystroke of the search box.
    pub fn on_search_input(&mut self, text: impl Into<String>, at: Instant) {
        self.search.push(text.into(), at);
    }

    /// Apply the search text once typing has paused.
    pub fn poll_search(&mut self, at: Instant) -> Option<RenderPass> {
        let text = self.search.poll(at)?;
        let (mut filters, sort) = match self.view.request() {
            Some(request) => (request.filters.clone(), request.sort),
            None => (QueryFilters::none(), None),
        };
        filters.search = Some(text);
        Some(self.apply_filters(filters, sort))
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Populate the catalog from the snapshot cache, falling back to the
    /// batch cache and then to fetching the first page.
    ///
    /// A cache hit also starts a background total reconciliation.
    pub async fn warm_start(&mut self) -> Result<WarmStart, LoadError> {
        if let Some(snapshot) = self.cache.load().await {
            let records = snapshot.stocks.len();
            let total = snapshot.total_count.or(Some(records));
            self.restore(snapshot.stocks, total, snapshot.pages);
            self.reconcile_task = self.reconcile_in_background();
            tracing::info!(records, "Warm start from snapshot");
            return Ok(WarmStart::Snapshot { records });
        }

        if let Some(cached) = self.cache.load_batches().await {
            let records = cached.records.len();
            self.restore(cached.records, cached.total_count, Some(cached.pages));
            self.reconcile_task = self.reconcile_in_background();
            tracing::info!(records, "Warm start from cached batches");
            return Ok(WarmStart::Batches { records });
        }

        tracing::info!("Cold start");
        let outcome = self.load_more().await?;
        Ok(WarmStart::Cold(outcome))
    }

    /// Spawn a total reconciliation on the current runtime.
    ///
    /// A changed total arrives as a `Progress` event, so the next
    /// [`pump_events`](Self::pump_events) re-renders. `None` outside a
    /// tokio runtime.
    pub fn reconcile_in_background(&self) -> Option<JoinHandle<Result<usize, LoadError>>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No tokio runtime, skipping total reconciliation");
            return None;
        };
        let loader = self.loader.clone();
        Some(runtime.spawn(async move { loader.refresh_total().await }))
    }

    /// Reconcile the total with the source and re-render.
    pub async fn reconcile(&mut self) -> Result<usize, LoadError> {
        let total = self.loader.refresh_total().await?;
        self.sync_view(false);
        Ok(total)
    }

    /// Start a background load of the next page.
    ///
    /// Returns `false` when a load is already running, the collection is
    /// complete, or there is no tokio runtime.
    pub fn request_more(&mut self) -> bool {
        if self.load_task.as_ref().is_some_and(|task| !task.is_finished()) {
            return false;
        }
        if matches!(
            self.loader.status(),
            LoaderStatus::Loading | LoaderStatus::Complete
        ) {
            return false;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No tokio runtime, cannot load more records");
            return false;
        };

        let loader = self.loader.clone();
        self.load_task = Some(runtime.spawn(async move { loader.load_next_batch().await }));
        self.load_requests += 1;
        tracing::debug!(next_page = self.loader.next_page(), "Background load requested");
        true
    }

    /// Load the next page in place and apply its events.
    pub async fn load_more(&mut self) -> Result<LoadOutcome, LoadError> {
        let result = self.loader.load_next_batch().await;
        self.pump_events();
        result
    }

    /// Wait for the background load, if any, and apply its events.
    pub async fn wait_for_load(&mut self) -> Option<Result<LoadOutcome, LoadError>> {
        let task = self.load_task.take()?;
        let result = match task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "Background load task did not finish");
                Ok(LoadOutcome::Cancelled)
            }
        };
        self.pump_events();
        Some(result)
    }

    /// Drain loader events and re-render if the catalog changed.
    pub fn pump_events(&mut self) -> PumpReport {
        let mut report = PumpReport::default();
        while let Ok(event) = self.events.try_recv() {
            report.processed += 1;
            match event {
                LoaderEvent::Progress { loaded, total } => {
                    report.loaded = loaded;
                    report.total = total;
                }
                LoaderEvent::BatchLoaded { page, records } => {
                    self.batches_loaded += 1;
                    tracing::debug!(page, records = records.len(), "Batch received");
                }
                LoaderEvent::Complete { records } => {
                    report.complete = true;
                    tracing::info!(records = records.len(), "Collection complete");
                }
                LoaderEvent::Error { error } => report.errors.push(error),
            }
        }

        report.render = if report.processed > 0 {
            self.sync_view(false)
        } else {
            RenderPass {
                range: self.window.range(),
                ..RenderPass::default()
            }
        };
        report
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Drop every record and start over. The persistent cache is kept.
    pub fn reset(&mut self) {
        self.abort_tasks();
        self.loader.reset();
        self.query_cache.clear();
        self.search.cancel();
        self.view = ActiveView::Full;
        self.pool.release_all(&mut self.surface);
        self.window.reset();
        while self.events.try_recv().is_ok() {}
        tracing::info!("Screener engine reset");
    }

    /// Remove both persistent cache entries.
    pub async fn clear_persistent_cache(&self) -> Result<(), LoadError> {
        self.cache.clear().await
    }

    /// Stop loading, destroy every pooled handle, and hand back the surface.
    pub fn teardown(mut self) -> S {
        self.abort_tasks();
        self.pool.teardown(&mut self.surface);
        tracing::info!("Screener engine torn down");
        self.surface
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn abort_tasks(&mut self) {
        if let Some(task) = self.load_task.take() {
            task.abort();
        }
        if let Some(task) = self.reconcile_task.take() {
            task.abort();
        }
        self.loader.cancel();
    }

    fn restore(&mut self, records: Vec<Record>, total: Option<usize>, pages: Option<usize>) {
        let count = records.len();
        self.catalog.write().replace(records, total);
        match pages {
            Some(pages) => self.loader.resume_after_pages(pages, total),
            None => self.loader.resume_from(count, total),
        }
        self.sync_view(true);
    }

    fn run_query(&mut self, request: &QueryRequest) -> (QueryResult, u64) {
        let catalog = self.catalog.read();
        let generation = catalog.generation();
        if let Some(hit) = self.query_cache.get(request, generation) {
            return (hit, generation);
        }
        let result = execute(&catalog, request);
        drop(catalog);
        self.query_cache.insert(request, generation, result.clone());
        (result, generation)
    }

    /// Recompute filtered positions if the catalog moved on.
    fn refresh_view(&mut self) -> bool {
        let current = self.catalog.read().generation();
        let stale = match &self.view {
            ActiveView::Filtered {
                request,
                generation,
                ..
            } if *generation != current => Some(request.clone()),
            _ => None,
        };
        let Some(request) = stale else {
            return false;
        };
        let (result, generation) = self.run_query(&request);
        self.view = ActiveView::Filtered {
            request,
            positions: result.positions,
            generation,
        };
        true
    }

    fn sync_view(&mut self, rebind: bool) -> RenderPass {
        let rebind = self.refresh_view() || rebind;
        let view_len = self.view_len();
        let outcome = self.window.set_view_len(view_len);
        self.render(outcome, rebind)
    }

    fn render(&mut self, outcome: ScrollOutcome, rebind: bool) -> RenderPass {
        let mut pass = RenderPass {
            range: outcome.range,
            ..RenderPass::default()
        };
        let needs_sync =
            outcome.changed || rebind || outcome.range.len() != self.pool.stats().active;
        if !needs_sync {
            return pass;
        }

        let started = Instant::now();
        let catalog = self.catalog.read();
        let mut report = if rebind {
            self.pool.rebind_active(
                resolver(&self.view, &catalog),
                &mut self.surface,
            )
        } else {
            SyncReport::default()
        };
        let synced = self.pool.sync(
            outcome.range,
            resolver(&self.view, &catalog),
            &mut self.surface,
        );
        drop(catalog);

        report.released += synced.released;
        report.acquired += synced.acquired;
        report.missing = synced.missing;
        pass.sync = report;
        pass.changed = report.acquired > 0 || report.released > 0;

        if pass.changed {
            let elapsed = started.elapsed();
            self.timings.passes += 1;
            self.timings.last = elapsed;
            self.timings.total += elapsed;
            record_render_pass(report.acquired, report.released);
            tracing::debug!(
                start = outcome.range.start,
                end = outcome.range.end,
                acquired = report.acquired,
                released = report.released,
                missing = report.missing,
                elapsed_us = elapsed.as_micros() as u64,
                "Render pass"
            );
        }
        pass
    }
}

fn resolver<'a>(
    view: &'a ActiveView,
    catalog: &'a Catalog,
) -> impl FnMut(usize) -> Option<Arc<Record>> + 'a {
    move |index| {
        view.position(index)
            .and_then(|position| catalog.get(position).cloned())
    }
}
