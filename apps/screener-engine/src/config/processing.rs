//! Post-processing configuration.

use serde::{Deserialize, Serialize};

/// Derived-field computation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Batches larger than this are processed on the rayon pool.
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            parallel_threshold: default_parallel_threshold(),
        }
    }
}

const fn default_parallel_threshold() -> usize {
    100
}
