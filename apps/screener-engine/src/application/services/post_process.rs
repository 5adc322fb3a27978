//! Post-processing of fetched batches.
//!
//! Derived fields are computed after normalization and before the batch is
//! appended. Large batches run on the rayon pool and are awaited through a
//! oneshot channel; if that channel fails for any reason the batch is
//! processed on the calling task instead, so a batch is never lost to the
//! offload path.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;
use tokio::sync::oneshot;

use crate::domain::catalog::Record;
use crate::observability::record_offload_fallback;

/// Job handed to an offload executor.
pub type OffloadJob = Box<dyn FnOnce() + Send + 'static>;

/// Executor for CPU-bound work off the async runtime.
pub trait ComputeOffload: Send + Sync + fmt::Debug {
    /// Run the job somewhere. Dropping it without running is allowed.
    fn spawn(&self, job: OffloadJob);
}

/// Runs jobs on the global rayon pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct RayonOffload;

impl ComputeOffload for RayonOffload {
    fn spawn(&self, job: OffloadJob) {
        rayon::spawn(job);
    }
}

/// Computes derived fields, offloading large batches.
#[derive(Debug)]
pub struct PostProcessor {
    offload: Arc<dyn ComputeOffload>,
    parallel_threshold: usize,
    fallbacks: AtomicU64,
}

impl PostProcessor {
    /// Create a processor.
    #[must_use]
    pub fn new(offload: Arc<dyn ComputeOffload>, parallel_threshold: usize) -> Self {
        Self {
            offload,
            parallel_threshold,
            fallbacks: AtomicU64::new(0),
        }
    }

    /// Processor on the rayon pool.
    #[must_use]
    pub fn rayon(parallel_threshold: usize) -> Self {
        Self::new(Arc::new(RayonOffload), parallel_threshold)
    }

    /// Times the offload path failed and the batch was processed inline.
    #[must_use]
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    /// Compute derived fields for every record, preserving order.
    pub async fn process(&self, records: Vec<Record>) -> Vec<Record> {
        if records.len() <= self.parallel_threshold {
            return derive_sequential(records);
        }

        let (tx, rx) = oneshot::channel();
        let input = records.clone();
        self.offload.spawn(Box::new(move || {
            let result = catch_unwind(AssertUnwindSafe(|| derive_parallel(input)));
            if let Ok(processed) = result {
                let _ = tx.send(processed);
            }
        }));

        match rx.await {
            Ok(processed) => processed,
            Err(_) => {
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                record_offload_fallback();
                tracing::warn!(
                    records = records.len(),
                    "Offloaded post-processing failed, processing inline"
                );
                derive_sequential(records)
            }
        }
    }
}

fn derive_sequential(records: Vec<Record>) -> Vec<Record> {
    records.into_iter().map(Record::with_derived_fields).collect()
}

fn derive_parallel(records: Vec<Record>) -> Vec<Record> {
    records
        .into_par_iter()
        .map(Record::with_derived_fields)
        .collect()
}
