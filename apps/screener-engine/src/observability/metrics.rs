//! Metrics for the screener engine.
//!
//! Recorded through the `metrics` facade. The library installs no
//! exporter; a host that wants them installs its own recorder.

use std::time::Duration;

use metrics::{counter, histogram};

// ============================================================================
// Batch Loading Metrics
// ============================================================================

/// Record an appended batch.
///
/// # Arguments
///
/// * `records` - Records in the batch
/// * `elapsed` - Time from first attempt to append, including retries
pub fn record_batch_loaded(records: usize, elapsed: Duration) {
    counter!("screener_batches_loaded_total").increment(1);
    counter!("screener_records_loaded_total").increment(records as u64);
    histogram!("screener_batch_load_seconds").record(elapsed.as_secs_f64());
}

/// Record a retry of a page fetch.
pub fn record_batch_retry(reason: &str) {
    counter!("screener_batch_retries_total", "reason" => reason.to_string()).increment(1);
}

/// Record a terminal load failure.
pub fn record_batch_failure(reason: &'static str) {
    counter!("screener_batch_failures_total", "reason" => reason).increment(1);
}

/// Record raw records dropped because they failed normalization.
pub fn record_records_rejected(records: usize) {
    counter!("screener_records_rejected_total").increment(records as u64);
}

/// Record a post-processing fallback to the calling thread.
pub fn record_offload_fallback() {
    counter!("screener_offload_fallbacks_total").increment(1);
}

// ============================================================================
// Cache Metrics
// ============================================================================

/// Record a query cache lookup.
pub fn record_query_cache_lookup(hit: bool) {
    if hit {
        counter!("screener_query_cache_hits_total").increment(1);
    } else {
        counter!("screener_query_cache_misses_total").increment(1);
    }
}

/// Record a snapshot cache read.
///
/// # Arguments
///
/// * `outcome` - "hit", "miss", "expired", "version_mismatch", or "corrupt"
pub fn record_snapshot_read(outcome: &'static str) {
    counter!("screener_snapshot_reads_total", "outcome" => outcome).increment(1);
}

// ============================================================================
// Rendering Metrics
// ============================================================================

/// Record a render pass.
///
/// # Arguments
///
/// * `acquired` - Handles bound in this pass
/// * `released` - Handles returned to the pool in this pass
pub fn record_render_pass(acquired: usize, released: usize) {
    counter!("screener_render_passes_total").increment(1);
    histogram!("screener_render_bound_rows").record(acquired as f64);
    histogram!("screener_render_released_rows").record(released as f64);
}
