//! Record Store
//!
//! Ordered, append-only collection of records. A record's position is
//! its arrival order and never changes until the store is reset.

use std::sync::Arc;

use super::record::Record;

/// Ordered record collection with an optional server-reported total.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: Vec<Arc<Record>>,
    total_count: Option<usize>,
}

impl RecordStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total reported by the source, if known.
    #[must_use]
    pub const fn total_count(&self) -> Option<usize> {
        self.total_count
    }

    /// Record the server-reported total.
    pub fn set_total_count(&mut self, total: Option<usize>) {
        self.total_count = total;
    }

    /// Whether every record the source reported is present.
    #[must_use]
    pub fn is_fully_loaded(&self) -> bool {
        self.total_count
            .is_some_and(|total| self.records.len() >= total)
    }

    /// Append records in order, returning the position of the first one.
    pub fn append(&mut self, records: impl IntoIterator<Item = Record>) -> usize {
        let start = self.records.len();
        self.records.extend(records.into_iter().map(Arc::new));
        start
    }

    /// Replace all records.
    pub fn replace(&mut self, records: impl IntoIterator<Item = Record>) {
        self.records.clear();
        self.append(records);
    }

    /// Record at a position.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&Arc<Record>> {
        self.records.get(position)
    }

    /// Iterate `(position, record)` pairs in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Record)> {
        self.records.iter().enumerate().map(|(i, r)| (i, r.as_ref()))
    }

    /// Cloned records for a set of positions, skipping out-of-range ones.
    #[must_use]
    pub fn collect_positions(&self, positions: &[usize]) -> Vec<Record> {
        positions
            .iter()
            .filter_map(|&p| self.records.get(p))
            .map(|r| r.as_ref().clone())
            .collect()
    }

    /// Snapshot of every record in order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Record> {
        self.records.iter().map(|r| r.as_ref().clone()).collect()
    }

    /// Drop all records and the total.
    pub fn reset(&mut self) {
        self.records.clear();
        self.total_count = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(symbol: &str) -> Record {
        Record::new(symbol, "NYSE", dec!(10))
    }

    #[test]
    fn append_preserves_order_and_reports_start() {
        let mut store = RecordStore::new();
        assert_eq!(store.append([record("A"), record("B")]), 0);
        assert_eq!(store.append([record("C")]), 2);

        let symbols: Vec<_> = store.iter().map(|(_, r)| r.symbol.to_string()).collect();
        assert_eq!(symbols, ["A", "B", "C"]);
    }

    #[test]
    fn fully_loaded_requires_known_total() {
        let mut store = RecordStore::new();
        store.append([record("A")]);
        assert!(!store.is_fully_loaded());

        store.set_total_count(Some(2));
        assert!(!store.is_fully_loaded());

        store.append([record("B")]);
        assert!(store.is_fully_loaded());
    }

    #[test]
    fn reset_clears_records_and_total() {
        let mut store = RecordStore::new();
        store.append([record("A")]);
        store.set_total_count(Some(1));
        store.reset();

        assert!(store.is_empty());
        assert_eq!(store.total_count(), None);
    }

    #[test]
    fn collect_positions_skips_out_of_range() {
        let mut store = RecordStore::new();
        store.append([record("A"), record("B")]);
        let picked = store.collect_positions(&[1, 7]);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].symbol.as_str(), "B");
    }
}
