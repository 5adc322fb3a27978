//! Snapshot Store Port (Driven Port)
//!
//! Key/value persistence for cache envelopes. Values are opaque strings;
//! versioning and expiry are the cache's concern, not the store's.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

/// Snapshot store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Read or write failed.
    #[error("Snapshot I/O error on '{key}': {message}")]
    Io {
        /// Storage key.
        key: String,
        /// Error details.
        message: String,
    },

    /// Key cannot be mapped to storage.
    #[error("Invalid snapshot key: {key}")]
    InvalidKey {
        /// Offending key.
        key: String,
    },
}

/// Port for persisting cache envelopes.
#[async_trait]
pub trait SnapshotStore: Send + Sync + std::fmt::Debug {
    /// Read a value; `None` when absent.
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one.
    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a value. Removing an absent key succeeds.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Volatile store for tests and sessions without a cache directory.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemorySnapshotStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Whether a key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_round_trips() {
        let store = InMemorySnapshotStore::new();
        assert_eq!(store.read("k").await.unwrap(), None);

        store.write("k", "v1").await.unwrap();
        store.write("k", "v2").await.unwrap();
        assert_eq!(store.read("k").await.unwrap().as_deref(), Some("v2"));

        store.remove("k").await.unwrap();
        store.remove("k").await.unwrap();
        assert!(store.is_empty());
    }
}
