//! Application Services
//!
//! Orchestration over the catalog: the batch loader, its post-processing
//! step, and the two caches.

mod batch_loader;
mod post_process;
mod query_cache;
mod snapshot_cache;

pub use batch_loader::{
    BatchLoader, BatchSummary, DEFAULT_PAGE_SIZE, LoadOutcome, LoaderSettings, LoaderStatus,
    SkipReason,
};
pub use post_process::{ComputeOffload, OffloadJob, PostProcessor, RayonOffload};
pub use query_cache::{QueryCache, QueryCacheStats};
pub use snapshot_cache::{
    BATCHES_KEY, CachedBatches, PersistentCache, SNAPSHOT_KEY, Snapshot, batch_key,
};
