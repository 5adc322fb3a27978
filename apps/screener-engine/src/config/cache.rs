//! Cache configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Persistent snapshot and query-result cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Envelope version; entries written under another version are ignored.
    #[serde(default = "default_version")]
    pub version: String,
    /// Full snapshot lifetime in seconds.
    #[serde(default = "default_snapshot_ttl_secs")]
    pub snapshot_ttl_secs: u64,
    /// Per-batch cache lifetime in seconds.
    #[serde(default = "default_batch_ttl_secs")]
    pub batch_ttl_secs: u64,
    /// Query result lifetime in seconds.
    #[serde(default = "default_query_ttl_secs")]
    pub query_ttl_secs: u64,
    /// Maximum memoized query results.
    #[serde(default = "default_query_capacity")]
    pub query_capacity: usize,
    /// Directory for the file snapshot store.
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            snapshot_ttl_secs: default_snapshot_ttl_secs(),
            batch_ttl_secs: default_batch_ttl_secs(),
            query_ttl_secs: default_query_ttl_secs(),
            query_capacity: default_query_capacity(),
            directory: default_directory(),
        }
    }
}

impl CacheConfig {
    /// Snapshot TTL.
    #[must_use]
    pub const fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs)
    }

    /// Batch TTL.
    #[must_use]
    pub const fn batch_ttl(&self) -> Duration {
        Duration::from_secs(self.batch_ttl_secs)
    }

    /// Query result TTL.
    #[must_use]
    pub const fn query_ttl(&self) -> Duration {
        Duration::from_secs(self.query_ttl_secs)
    }
}

fn default_version() -> String {
    "1".to_string()
}

const fn default_snapshot_ttl_secs() -> u64 {
    3_600
}

const fn default_batch_ttl_secs() -> u64 {
    3_600
}

const fn default_query_ttl_secs() -> u64 {
    180
}

const fn default_query_capacity() -> usize {
    20
}

fn default_directory() -> PathBuf {
    PathBuf::from("./data/screener-cache")
}
