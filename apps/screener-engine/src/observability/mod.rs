//! Observability module for metrics.
//!
//! Counters and histograms for loading, caching, and rendering.

mod metrics;

pub use metrics::{
    record_batch_failure, record_batch_loaded, record_batch_retry, record_offload_fallback,
    record_query_cache_lookup, record_records_rejected, record_render_pass, record_snapshot_read,
};
