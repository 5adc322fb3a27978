//! Catalog aggregate
//!
//! The record store and its secondary indices, kept consistent: an append
//! and the index rebuild it requires happen in one mutation, so a reader
//! holding the lock never sees records the indices don't cover.

use std::sync::Arc;

use parking_lot::RwLock;

use super::record::Record;
use super::store::RecordStore;
use crate::domain::index::{IndexSet, TierTable};

/// Catalog shared between the loader and the engine.
///
/// The lock is never held across an `.await`.
pub type SharedCatalog = Arc<RwLock<Catalog>>;

/// Record store plus secondary indices.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    store: RecordStore,
    index: IndexSet,
    generation: u64,
}

impl Catalog {
    /// Create an empty catalog classifying with the given tier table.
    #[must_use]
    pub fn new(tiers: TierTable) -> Self {
        Self {
            store: RecordStore::new(),
            index: IndexSet::new(tiers),
            generation: 0,
        }
    }

    /// Wrap into a [`SharedCatalog`].
    #[must_use]
    pub fn into_shared(self) -> SharedCatalog {
        Arc::new(RwLock::new(self))
    }

    /// Record store.
    #[must_use]
    pub const fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Secondary indices.
    #[must_use]
    pub const fn index(&self) -> &IndexSet {
        &self.index
    }

    /// Loaded record count.
    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.store.len()
    }

    /// Server-reported total, if known.
    #[must_use]
    pub const fn total_count(&self) -> Option<usize> {
        self.store.total_count()
    }

    /// Bumped on every mutation; lets readers detect a changed catalog.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Append a batch and rebuild the indices.
    ///
    /// Returns the position of the first appended record.
    pub fn append_batch(&mut self, records: Vec<Record>, total: Option<usize>) -> usize {
        let start = self.store.append(records);
        if total.is_some() {
            self.store.set_total_count(total);
        }
        self.index.rebuild(&self.store);
        self.generation += 1;
        start
    }

    /// Replace every record and rebuild the indices.
    pub fn replace(&mut self, records: Vec<Record>, total: Option<usize>) {
        self.store.replace(records);
        self.store.set_total_count(total);
        self.index.rebuild(&self.store);
        self.generation += 1;
    }

    /// Update the server-reported total without touching records.
    pub fn set_total_count(&mut self, total: Option<usize>) {
        self.store.set_total_count(total);
        self.generation += 1;
    }

    /// Position of a symbol.
    #[must_use]
    pub fn position_of(&self, symbol: &str) -> Option<usize> {
        self.index.lookup_by_symbol(symbol, &self.store)
    }

    /// Record at a position.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&Arc<Record>> {
        self.store.get(position)
    }

    /// Drop every record and index.
    pub fn reset(&mut self) {
        self.store.reset();
        self.index.clear();
        self.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::index::{BucketKey, MarketCapTier};
    use rust_decimal_macros::dec;

    fn large(symbol: &str) -> Record {
        Record::new(symbol, "NYSE", dec!(100)).with_market_cap(dec!(50000000000))
    }

    #[test]
    fn append_rebuilds_index_in_same_mutation() {
        let catalog = Catalog::new(TierTable::default()).into_shared();
        catalog.write().append_batch(vec![large("A"), large("B")], Some(4));

        let guard = catalog.read();
        assert_eq!(guard.loaded_count(), 2);
        assert_eq!(guard.index().indexed_len(), 2);
        assert_eq!(
            guard.index().query(&BucketKey::MarketCap(MarketCapTier::Large)),
            &[0, 1]
        );
        assert_eq!(guard.total_count(), Some(4));
    }

    #[test]
    fn append_without_total_keeps_previous_total() {
        let mut catalog = Catalog::new(TierTable::default());
        catalog.append_batch(vec![large("A")], Some(3));
        catalog.append_batch(vec![large("B")], None);
        assert_eq!(catalog.total_count(), Some(3));
    }

    #[test]
    fn generation_moves_on_every_mutation() {
        let mut catalog = Catalog::new(TierTable::default());
        let before = catalog.generation();
        catalog.append_batch(vec![large("A")], None);
        catalog.reset();
        assert_eq!(catalog.generation(), before + 2);
        assert_eq!(catalog.loaded_count(), 0);
        assert_eq!(catalog.index().indexed_len(), 0);
    }
}
