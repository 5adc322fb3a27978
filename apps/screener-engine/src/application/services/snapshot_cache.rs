//! Persistent Cache
//!
//! Versioned, TTL-bounded snapshots of the record store used to warm-start
//! without a network round trip. Three kinds of entry are kept:
//!
//! - `screener.snapshot`: every record once loading completes
//! - `screener.batches`: manifest of cached pages (offset, page, size, write time)
//! - `screener.batches.<offset>`: records of one page, written as it arrives
//!
//! Every entry carries the cache version and a scope naming the query that
//! produced it (page size and server-side filters). An entry from another
//! version or scope is removed on read, so a filtered load never restores
//! as the full collection. Pages expire individually against the batch TTL.
//!
//! The cache is never authoritative. Anything that fails to decode, carries
//! another version or scope, or has outlived its TTL is removed and reported
//! as a miss.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::application::ports::SnapshotStore;
use crate::domain::catalog::Record;
use crate::domain::shared::{Clock, elapsed_millis};
use crate::error::LoadError;
use crate::observability::record_snapshot_read;

/// Storage key of the full snapshot.
pub const SNAPSHOT_KEY: &str = "screener.snapshot";
/// Storage key of the batch manifest. Page records live under
/// `screener.batches.<offset>`.
pub const BATCHES_KEY: &str = "screener.batches";

/// Storage key of the page cached at `offset`.
#[must_use]
pub fn batch_key(offset: usize) -> String {
    format!("{BATCHES_KEY}.{offset}")
}

/// Full-store snapshot envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Cache version the snapshot was written under.
    pub version: String,
    /// Query scope the records were loaded under.
    #[serde(default)]
    pub scope: String,
    /// Write time, epoch milliseconds.
    pub timestamp: i64,
    /// Records in store order.
    pub stocks: Vec<Record>,
    /// Server-reported total at write time.
    #[serde(default)]
    pub total_count: Option<usize>,
    /// Pages fetched to build the snapshot.
    #[serde(default)]
    pub pages: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BatchManifest {
    version: String,
    #[serde(default)]
    scope: String,
    #[serde(default)]
    total_count: Option<usize>,
    batches: BTreeMap<usize, BatchEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct BatchEntry {
    page: usize,
    len: usize,
    timestamp: i64,
}

/// Records recovered from the per-batch cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedBatches {
    /// Contiguous records from offset 0.
    pub records: Vec<Record>,
    /// Server-reported total at last write.
    pub total_count: Option<usize>,
    /// Pages covered, starting at page 1.
    pub pages: usize,
}

/// Snapshot cache over a [`SnapshotStore`].
///
/// Clones share the scope, so the loader and the engine always agree on
/// which data set is being cached.
#[derive(Debug, Clone)]
pub struct PersistentCache {
    store: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
    version: String,
    scope: Arc<RwLock<String>>,
    snapshot_ttl: Duration,
    batch_ttl: Duration,
}

impl PersistentCache {
    /// Create a cache with an empty scope.
    #[must_use]
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
        version: impl Into<String>,
        snapshot_ttl: Duration,
        batch_ttl: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            version: version.into(),
            scope: Arc::new(RwLock::new(String::new())),
            snapshot_ttl,
            batch_ttl,
        }
    }

    /// Cache version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Current query scope.
    #[must_use]
    pub fn scope(&self) -> String {
        self.scope.read().clone()
    }

    /// Change the query scope for this cache and every clone of it.
    pub fn set_scope(&self, scope: impl Into<String>) {
        *self.scope.write() = scope.into();
    }

    /// Write the full snapshot.
    pub async fn save(
        &self,
        records: &[Record],
        total_count: Option<usize>,
        pages: usize,
    ) -> Result<(), LoadError> {
        let snapshot = Snapshot {
            version: self.version.clone(),
            scope: self.scope(),
            timestamp: self.clock.now_millis(),
            stocks: records.to_vec(),
            total_count,
            pages: Some(pages),
        };
        self.write_json(SNAPSHOT_KEY, &snapshot).await?;
        tracing::debug!(records = records.len(), pages, "Snapshot saved");
        Ok(())
    }

    /// Read the full snapshot if it is present, current, and fresh.
    pub async fn load(&self) -> Option<Snapshot> {
        let snapshot: Snapshot = self.read_json(SNAPSHOT_KEY).await?;
        if let Some(reason) = self.mismatch(&snapshot.version, &snapshot.scope) {
            record_snapshot_read(reason);
            tracing::info!(key = SNAPSHOT_KEY, reason, "Discarding snapshot");
            self.discard(SNAPSHOT_KEY).await;
            return None;
        }
        if self.is_expired(snapshot.timestamp, self.snapshot_ttl) {
            record_snapshot_read("expired");
            tracing::debug!(key = SNAPSHOT_KEY, "Discarding expired snapshot");
            self.discard(SNAPSHOT_KEY).await;
            return None;
        }
        record_snapshot_read("hit");
        Some(snapshot)
    }

    /// Cache one page starting at store position `offset`.
    ///
    /// Only this page's records are written, plus the manifest entry that
    /// records when it was written.
    pub async fn save_batch(
        &self,
        offset: usize,
        page: usize,
        records: &[Record],
        total_count: Option<usize>,
    ) -> Result<(), LoadError> {
        let mut manifest = match self.current_manifest().await {
            Some(manifest) => manifest,
            None => BatchManifest {
                version: self.version.clone(),
                scope: self.scope(),
                total_count: None,
                batches: BTreeMap::new(),
            },
        };

        self.write_json(&batch_key(offset), &records).await?;
        manifest.batches.insert(
            offset,
            BatchEntry {
                page,
                len: records.len(),
                timestamp: self.clock.now_millis(),
            },
        );
        if total_count.is_some() {
            manifest.total_count = total_count;
        }
        self.write_json(BATCHES_KEY, &manifest).await
    }

    /// Contiguous pages from offset 0 in the per-batch cache.
    ///
    /// Stops at the first gap, whether in offsets or page numbers. `None`
    /// when nothing usable is cached.
    pub async fn load_batches(&self) -> Option<CachedBatches> {
        let mut manifest = self.current_manifest().await?;
        let mut records = Vec::new();
        let mut pages = 0;
        let mut lost = None;

        for (&offset, entry) in &manifest.batches {
            if offset != records.len() || entry.page != pages + 1 {
                tracing::debug!(
                    expected_offset = records.len(),
                    found_offset = offset,
                    page = entry.page,
                    "Gap in cached batches"
                );
                break;
            }
            match self.read_batch(offset, entry).await {
                Some(batch) => records.extend(batch),
                None => {
                    lost = Some(offset);
                    break;
                }
            }
            pages += 1;
        }

        if let Some(offset) = lost {
            manifest.batches.remove(&offset);
            self.write_manifest(&manifest).await;
        }
        if records.is_empty() {
            return None;
        }
        record_snapshot_read("hit");
        Some(CachedBatches {
            records,
            total_count: manifest.total_count,
            pages,
        })
    }

    /// The cached first page, if any.
    pub async fn load_first_page(&self) -> Option<Vec<Record>> {
        let manifest = self.current_manifest().await?;
        let entry = manifest.batches.get(&0)?;
        self.read_batch(0, entry).await
    }

    /// Remove the snapshot, the manifest, and every cached page.
    pub async fn clear(&self) -> Result<(), LoadError> {
        self.store.remove(SNAPSHOT_KEY).await?;
        if let Some(manifest) = self.read_json::<BatchManifest>(BATCHES_KEY).await {
            for offset in manifest.batches.keys() {
                self.store.remove(&batch_key(*offset)).await?;
            }
        }
        self.store.remove(BATCHES_KEY).await?;
        tracing::info!("Snapshot cache cleared");
        Ok(())
    }

    /// The manifest with stale pages pruned, or `None` if nothing is left.
    ///
    /// A manifest from another version or scope is removed together with
    /// its pages.
    async fn current_manifest(&self) -> Option<BatchManifest> {
        let mut manifest: BatchManifest = self.read_json(BATCHES_KEY).await?;
        if let Some(reason) = self.mismatch(&manifest.version, &manifest.scope) {
            record_snapshot_read(reason);
            tracing::info!(key = BATCHES_KEY, reason, "Discarding cached batches");
            self.drop_batches(&manifest).await;
            return None;
        }

        let expired: Vec<usize> = manifest
            .batches
            .iter()
            .filter(|(_, entry)| self.is_expired(entry.timestamp, self.batch_ttl))
            .map(|(offset, _)| *offset)
            .collect();
        if !expired.is_empty() {
            record_snapshot_read("expired");
            tracing::debug!(pages = expired.len(), "Discarding expired cached pages");
            for offset in &expired {
                manifest.batches.remove(offset);
                self.discard(&batch_key(*offset)).await;
            }
            self.write_manifest(&manifest).await;
        }

        if manifest.batches.is_empty() {
            return None;
        }
        Some(manifest)
    }

    async fn read_batch(&self, offset: usize, entry: &BatchEntry) -> Option<Vec<Record>> {
        let key = batch_key(offset);
        let batch: Vec<Record> = self.read_json(&key).await?;
        if batch.len() != entry.len {
            tracing::warn!(
                key = %key,
                expected = entry.len,
                found = batch.len(),
                "Removing cached page with unexpected size"
            );
            record_snapshot_read("corrupt");
            self.discard(&key).await;
            return None;
        }
        Some(batch)
    }

    async fn write_manifest(&self, manifest: &BatchManifest) {
        let result = if manifest.batches.is_empty() {
            self.store.remove(BATCHES_KEY).await.map_err(LoadError::from)
        } else {
            self.write_json(BATCHES_KEY, manifest).await
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to update batch manifest");
        }
    }

    async fn drop_batches(&self, manifest: &BatchManifest) {
        for offset in manifest.batches.keys() {
            self.discard(&batch_key(*offset)).await;
        }
        self.discard(BATCHES_KEY).await;
    }

    fn mismatch(&self, version: &str, scope: &str) -> Option<&'static str> {
        if version != self.version {
            Some("version_mismatch")
        } else if scope != self.scope.read().as_str() {
            Some("scope_mismatch")
        } else {
            None
        }
    }

    fn is_expired(&self, timestamp: i64, ttl: Duration) -> bool {
        let age = elapsed_millis(timestamp, self.clock.now_millis());
        u128::from(age) >= ttl.as_millis()
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let text = match self.store.read(key).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                record_snapshot_read("miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Snapshot read failed");
                record_snapshot_read("miss");
                return None;
            }
        };

        match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(e) => {
                let err = LoadError::CacheCorruption {
                    key: key.to_string(),
                    message: e.to_string(),
                };
                tracing::warn!(key, error = %err, "Removing corrupt cache entry");
                record_snapshot_read("corrupt");
                self.discard(key).await;
                None
            }
        }
    }

    async fn write_json<T: Serialize + Sync + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), LoadError> {
        let text = serde_json::to_string(value).map_err(|e| LoadError::Storage {
            message: format!("failed to encode {key}: {e}"),
        })?;
        self.store.write(key, &text).await?;
        Ok(())
    }

    async fn discard(&self, key: &str) {
        if let Err(e) = self.store.remove(key).await {
            tracing::warn!(key, error = %e, "Failed to remove cache entry");
        }
    }
}
