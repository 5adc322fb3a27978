//! Secondary Index Set
//!
//! Bucketed position lists over the loaded records, one map per
//! classification dimension plus a symbol lookup. The set is rebuilt in
//! full whenever records are appended; it is never patched.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::tiers::{LeverageTier, MarketCapTier, TierTable, VolumeTier};
use crate::domain::catalog::RecordStore;
use crate::domain::shared::Symbol;

/// Classification dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Venue code.
    Exchange,
    /// Market capitalization tier.
    MarketCap,
    /// Dollar volume tier.
    Volume,
    /// Debt-to-equity tier.
    Leverage,
}

/// A bucket within one dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "dimension", content = "bucket", rename_all = "snake_case")]
pub enum BucketKey {
    /// Records listed on a venue (uppercase code).
    Exchange(String),
    /// Records in a market cap tier.
    MarketCap(MarketCapTier),
    /// Records in a dollar volume tier.
    Volume(VolumeTier),
    /// Records in a leverage tier.
    Leverage(LeverageTier),
}

impl BucketKey {
    /// Dimension this bucket belongs to.
    #[must_use]
    pub const fn dimension(&self) -> Dimension {
        match self {
            Self::Exchange(_) => Dimension::Exchange,
            Self::MarketCap(_) => Dimension::MarketCap,
            Self::Volume(_) => Dimension::Volume,
            Self::Leverage(_) => Dimension::Leverage,
        }
    }
}

/// Secondary indices over a [`RecordStore`].
///
/// Every bucket holds ascending positions. Within one dimension buckets are
/// pairwise disjoint and their union is exactly the positions whose value
/// for that dimension is present.
#[derive(Debug, Clone, Default)]
pub struct IndexSet {
    tiers: TierTable,
    by_exchange: HashMap<String, Vec<usize>>,
    by_market_cap: HashMap<MarketCapTier, Vec<usize>>,
    by_volume: HashMap<VolumeTier, Vec<usize>>,
    by_leverage: HashMap<LeverageTier, Vec<usize>>,
    by_symbol: HashMap<Symbol, usize>,
    indexed_len: usize,
}

impl IndexSet {
    /// Create an empty index set with the given tier table.
    #[must_use]
    pub fn new(tiers: TierTable) -> Self {
        Self {
            tiers,
            ..Self::default()
        }
    }

    /// Tier table used for classification.
    #[must_use]
    pub const fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    /// Number of records covered by the last rebuild.
    #[must_use]
    pub const fn indexed_len(&self) -> usize {
        self.indexed_len
    }

    /// Rebuild every index from scratch in one pass over the store.
    ///
    /// When a symbol appears twice the first position wins.
    pub fn rebuild(&mut self, store: &RecordStore) {
        self.clear();

        for (position, record) in store.iter() {
            if !record.exchange.is_empty() {
                self.by_exchange
                    .entry(record.exchange.clone())
                    .or_default()
                    .push(position);
            }
            if let Some(tier) = self.tiers.classify_market_cap(record) {
                self.by_market_cap.entry(tier).or_default().push(position);
            }
            if let Some(tier) = self.tiers.classify_volume(record) {
                self.by_volume.entry(tier).or_default().push(position);
            }
            if let Some(tier) = self.tiers.classify_leverage(record) {
                self.by_leverage.entry(tier).or_default().push(position);
            }
            self.by_symbol
                .entry(record.symbol.clone())
                .or_insert(position);
        }

        self.indexed_len = store.len();
        tracing::debug!(
            records = self.indexed_len,
            exchanges = self.by_exchange.len(),
            "Secondary indices rebuilt"
        );
    }

    /// Positions in a bucket, ascending. Unknown buckets are empty.
    #[must_use]
    pub fn query(&self, key: &BucketKey) -> &[usize] {
        let positions = match key {
            BucketKey::Exchange(code) => self.by_exchange.get(&code.trim().to_uppercase()),
            BucketKey::MarketCap(tier) => self.by_market_cap.get(tier),
            BucketKey::Volume(tier) => self.by_volume.get(tier),
            BucketKey::Leverage(tier) => self.by_leverage.get(tier),
        };
        positions.map_or(&[], Vec::as_slice)
    }

    /// Buckets of one dimension with their sizes, sorted by key.
    #[must_use]
    pub fn buckets(&self, dimension: Dimension) -> Vec<(BucketKey, usize)> {
        let mut buckets: Vec<(BucketKey, usize)> = match dimension {
            Dimension::Exchange => self
                .by_exchange
                .iter()
                .map(|(code, p)| (BucketKey::Exchange(code.clone()), p.len()))
                .collect(),
            Dimension::MarketCap => self
                .by_market_cap
                .iter()
                .map(|(tier, p)| (BucketKey::MarketCap(*tier), p.len()))
                .collect(),
            Dimension::Volume => self
                .by_volume
                .iter()
                .map(|(tier, p)| (BucketKey::Volume(*tier), p.len()))
                .collect(),
            Dimension::Leverage => self
                .by_leverage
                .iter()
                .map(|(tier, p)| (BucketKey::Leverage(*tier), p.len()))
                .collect(),
        };
        buckets.sort_by(|a, b| bucket_order(&a.0).cmp(&bucket_order(&b.0)));
        buckets
    }

    /// Position of a symbol.
    ///
    /// Uses the direct map first; on a miss scans the store so a record
    /// appended after the last rebuild is still found.
    #[must_use]
    pub fn lookup_by_symbol(&self, symbol: &str, store: &RecordStore) -> Option<usize> {
        let key = Symbol::new(symbol);
        if let Some(&position) = self.by_symbol.get(&key) {
            return Some(position);
        }

        let found = store
            .iter()
            .find(|(_, record)| record.symbol == key)
            .map(|(position, _)| position);
        tracing::debug!(
            symbol = %key,
            found = found.is_some(),
            "Symbol index miss, fell back to linear scan"
        );
        found
    }

    /// Drop all buckets.
    pub fn clear(&mut self) {
        self.by_exchange.clear();
        self.by_market_cap.clear();
        self.by_volume.clear();
        self.by_leverage.clear();
        self.by_symbol.clear();
        self.indexed_len = 0;
    }
}

fn bucket_order(key: &BucketKey) -> (u8, String) {
    match key {
        BucketKey::Exchange(code) => (0, code.clone()),
        BucketKey::MarketCap(tier) => (*tier as u8, String::new()),
        BucketKey::Volume(tier) => (*tier as u8, String::new()),
        BucketKey::Leverage(tier) => (*tier as u8, String::new()),
    }
}

/// Intersect ascending position lists, smallest first.
///
/// The result is ascending. An empty input list yields an empty result.
#[must_use]
pub fn intersect_sorted(mut lists: Vec<&[usize]>) -> Vec<usize> {
    if lists.is_empty() {
        return Vec::new();
    }
    lists.sort_by_key(|list| list.len());

    let mut result: Vec<usize> = lists[0].to_vec();
    for other in &lists[1..] {
        if result.is_empty() {
            break;
        }
        result.retain(|position| other.binary_search(position).is_ok());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::Record;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashSet;

    fn sample_store() -> RecordStore {
        let mut store = RecordStore::new();
        store.append([
            Record::new("AAPL", "NASDAQ", dec!(190))
                .with_market_cap(dec!(3000000000000))
                .with_avg_volume(50_000_000)
                .with_debt_to_equity(1.8),
            Record::new("TINY", "NYSE", dec!(2))
                .with_market_cap(dec!(50000000))
                .with_avg_volume(10_000),
            Record::new("MIDC", "NYSE", dec!(40))
                .with_market_cap(dec!(5000000000))
                .with_debt_to_equity(0.7),
            Record::new("NOCAP", "AMEX", dec!(1)),
        ]);
        store
    }

    fn indexed(store: &RecordStore) -> IndexSet {
        let mut index = IndexSet::new(TierTable::default());
        index.rebuild(store);
        index
    }

    #[test]
    fn buckets_hold_expected_positions() {
        let store = sample_store();
        let index = indexed(&store);

        assert_eq!(index.query(&BucketKey::Exchange("NYSE".into())), &[1, 2]);
        assert_eq!(index.query(&BucketKey::Exchange("nyse".into())), &[1, 2]);
        assert_eq!(index.query(&BucketKey::MarketCap(MarketCapTier::Large)), &[0]);
        assert_eq!(index.query(&BucketKey::MarketCap(MarketCapTier::Mid)), &[2]);
        assert_eq!(index.query(&BucketKey::Volume(VolumeTier::Low)), &[1]);
        assert_eq!(index.query(&BucketKey::Leverage(LeverageTier::High)), &[0]);
        assert!(index.query(&BucketKey::Exchange("LSE".into())).is_empty());
    }

    #[test]
    fn null_values_are_left_out_of_every_bucket() {
        let store = sample_store();
        let index = indexed(&store);
        let covered: usize = index
            .buckets(Dimension::MarketCap)
            .iter()
            .map(|(_, n)| n)
            .sum();
        assert_eq!(covered, 3);
    }

    #[test]
    fn symbol_lookup_uses_map_then_scan() {
        let mut store = sample_store();
        let index = indexed(&store);
        assert_eq!(index.lookup_by_symbol("midc", &store), Some(2));

        store.append([Record::new("LATE", "NYSE", dec!(3))]);
        assert_eq!(index.lookup_by_symbol("LATE", &store), Some(4));
        assert_eq!(index.lookup_by_symbol("NONE", &store), None);
    }

    #[test]
    fn duplicate_symbol_keeps_first_position() {
        let mut store = RecordStore::new();
        store.append([
            Record::new("DUP", "NYSE", dec!(1)),
            Record::new("DUP", "NASDAQ", dec!(2)),
        ]);
        let index = indexed(&store);
        assert_eq!(index.lookup_by_symbol("DUP", &store), Some(0));
    }

    #[test]
    fn intersect_is_ascending_and_exact() {
        let a: &[usize] = &[1, 3, 5, 7, 9];
        let b: &[usize] = &[3, 4, 5, 9];
        let c: &[usize] = &[0, 5, 9, 11];
        assert_eq!(intersect_sorted(vec![a, b, c]), vec![5, 9]);
        assert!(intersect_sorted(Vec::new()).is_empty());
    }

    fn arb_record() -> impl Strategy<Value = Record> {
        (
            "[A-Z]{1,4}",
            prop::sample::select(vec!["NYSE", "NASDAQ", "AMEX", ""]),
            1u32..500,
            prop::option::of(0u64..50_000_000_000),
            prop::option::of(0u64..100_000_000),
            prop::option::of(0.0f64..4.0),
        )
            .prop_map(|(symbol, exchange, price, cap, volume, leverage)| {
                let mut record = Record::new(symbol, exchange, Decimal::from(price));
                record.market_cap = cap.map(Decimal::from);
                record.avg_volume = volume;
                record.debt_to_equity = leverage;
                record
            })
    }

    proptest! {
        #[test]
        fn buckets_partition_each_dimension(records in prop::collection::vec(arb_record(), 0..200)) {
            let mut store = RecordStore::new();
            store.append(records);
            let index = indexed(&store);

            let present: [(Dimension, HashSet<usize>); 4] = [
                (Dimension::Exchange, store.iter().filter(|(_, r)| !r.exchange.is_empty()).map(|(p, _)| p).collect()),
                (Dimension::MarketCap, store.iter().filter(|(_, r)| r.market_cap.is_some()).map(|(p, _)| p).collect()),
                (Dimension::Volume, store.iter().filter(|(_, r)| r.avg_volume.is_some()).map(|(p, _)| p).collect()),
                (Dimension::Leverage, store.iter().filter(|(_, r)| r.debt_to_equity.is_some()).map(|(p, _)| p).collect()),
            ];

            for (dimension, expected) in present {
                let mut seen = HashSet::new();
                for (key, _) in index.buckets(dimension) {
                    let positions = index.query(&key);
                    prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
                    for &p in positions {
                        prop_assert!(seen.insert(p), "position {} in two buckets", p);
                    }
                }
                prop_assert_eq!(seen, expected);
            }
        }
    }
}
