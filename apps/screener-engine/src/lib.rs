// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Screener Engine - Virtualized Rendering + Incremental Data Core
//!
//! Client-side engine for a stock screener over a large, paginated remote
//! collection. It keeps only the visible rows materialized, recycles their
//! presentation handles, loads the collection page by page in the
//! background, and warm-starts from a versioned snapshot cache.
//!
//! # Architecture (Clean Architecture + DDD + Hexagonal)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: Pure screener logic
//!   - `catalog`: Canonical records, the ordered store, the catalog aggregate
//!   - `index`: Tier table and secondary indices per category
//!   - `query`: Filters, sort, paging, and evaluation
//!   - `viewport`: Window manager, velocity tracking, debounce
//!   - `rendering`: Render surface port and the handle pool
//!
//! - **Application**: Orchestration
//!   - `ports`: `RecordSource`, `SnapshotStore`, `LoaderEventSink`
//!   - `services`: `BatchLoader`, `PersistentCache`, `QueryCache`, `PostProcessor`
//!   - `engine`: `ScreenerEngine`, the facade a host drives
//!
//! - **Infrastructure**: Adapters
//!   - `source`: HTTP and in-memory record sources
//!   - `persistence`: File snapshot store
//!   - `rendering`: Headless row surface
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Instant;
//!
//! use screener_engine::{
//!     EngineConfig, FileSnapshotStore, HttpRecordSource, RowSurface, ScreenerEngine,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::default();
//! let source = Arc::new(HttpRecordSource::new(&config.source)?);
//! let store = Arc::new(FileSnapshotStore::new(&config.cache.directory));
//!
//! let mut engine = ScreenerEngine::builder(RowSurface::new(), source)
//!     .with_config(config)
//!     .with_snapshot_store(store)
//!     .build()?;
//!
//! engine.on_resize(720.0, Instant::now());
//! engine.warm_start().await?;
//! engine.on_scroll(4_800.0, 720.0, Instant::now());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Clean Architecture Layers
// =============================================================================

/// Domain layer - Core screener logic with no I/O.
pub mod domain;

/// Application layer - Ports, services, and the engine facade.
pub mod application;

/// Infrastructure layer - Adapters for sources, storage, and rendering.
pub mod infrastructure;

// =============================================================================
// Cross-cutting Concerns
// =============================================================================

/// Configuration loading and validation.
pub mod config;

/// Loader and cache error types.
pub mod error;

/// Metrics.
pub mod observability;

/// Retry and backoff.
pub mod resilience;

/// Tracing subscriber setup.
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

// Domain re-exports
pub use domain::catalog::{Catalog, Record, SharedCatalog};
pub use domain::index::{
    BucketKey, Dimension, LeverageTier, MarketCapTier, TierTable, VolumeTier,
};
pub use domain::query::{QueryFilters, QueryRequest, QueryResult, SortDirection, SortField, SortSpec};
pub use domain::rendering::{RenderPool, RenderSurface};
pub use domain::shared::{Clock, ManualClock, Symbol, SystemClock};
pub use domain::viewport::{Alignment, VisibleRange, WindowManager, WindowSettings};

// Application re-exports
pub use application::ports::{
    CallbackSink, ChannelEventSink, InMemorySnapshotStore, LoaderEvent, LoaderEventSink,
    PageQuery, RecordSource, SnapshotStore, SourceError,
};
pub use application::services::{
    BatchLoader, LoadOutcome, LoaderSettings, LoaderStatus, PersistentCache, QueryCache,
};
pub use application::{PerformanceMetrics, RenderPass, ScreenerEngine, WarmStart};

// Infrastructure re-exports
pub use infrastructure::persistence::FileSnapshotStore;
pub use infrastructure::rendering::{RowHandle, RowSurface};
pub use infrastructure::source::{HttpRecordSource, InMemoryRecordSource};

// Cross-cutting re-exports
pub use config::{ConfigError, EngineConfig, load_config, load_config_from_string};
pub use error::LoadError;
pub use telemetry::{TelemetryGuard, init_telemetry};
