//! Query Result Cache
//!
//! Memoizes query results keyed by the canonical JSON of the normalized
//! (filters, sort, page) triple. Bounded to a fixed number of entries,
//! evicted first-in-first-out, each with its own TTL.
//!
//! Keys also carry the catalog generation. An append bumps the generation,
//! so results computed over a smaller catalog simply stop matching and age
//! out; there is no write-side invalidation hook.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::domain::query::{QueryRequest, QueryResult};
use crate::domain::shared::{Clock, elapsed_millis};
use crate::observability::record_query_cache_lookup;

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueryCacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that missed or found an expired entry.
    pub misses: u64,
    /// Entries dropped for capacity.
    pub evictions: u64,
    /// Live entries.
    pub entries: usize,
}

impl QueryCacheStats {
    /// Hits over lookups; 0.0 before any lookup.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    result: QueryResult,
    inserted_at: i64,
}

/// Bounded FIFO cache of query results.
#[derive(Debug)]
pub struct QueryCache {
    entries: HashMap<String, Entry>,
    order: VecDeque<String>,
    capacity: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    stats: QueryCacheStats,
}

impl QueryCache {
    /// Create a cache. A capacity of zero disables caching.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
            ttl,
            clock,
            stats: QueryCacheStats::default(),
        }
    }

    /// Look up a result computed at the given catalog generation.
    pub fn get(&mut self, request: &QueryRequest, generation: u64) -> Option<QueryResult> {
        let key = Self::key(request, generation);
        let now = self.clock.now_millis();

        let fresh = match self.entries.get(&key) {
            Some(entry) => u128::from(elapsed_millis(entry.inserted_at, now)) < self.ttl.as_millis(),
            None => {
                self.miss();
                return None;
            }
        };

        if !fresh {
            self.remove(&key);
            self.miss();
            return None;
        }

        self.stats.hits += 1;
        record_query_cache_lookup(true);
        self.entries.get(&key).map(|entry| entry.result.clone())
    }

    /// Store a result. Re-inserting a key moves it to the back of the queue.
    pub fn insert(&mut self, request: &QueryRequest, generation: u64, result: QueryResult) {
        if self.capacity == 0 {
            return;
        }
        let key = Self::key(request, generation);
        if self.entries.contains_key(&key) {
            self.order.retain(|k| k != &key);
        }

        while self.order.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
            self.stats.evictions += 1;
        }

        self.entries.insert(
            key.clone(),
            Entry {
                result,
                inserted_at: self.clock.now_millis(),
            },
        );
        self.order.push_back(key);
    }

    /// Drop every entry; counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Live entry count, including entries not yet found expired.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> QueryCacheStats {
        QueryCacheStats {
            entries: self.entries.len(),
            ..self.stats
        }
    }

    fn key(request: &QueryRequest, generation: u64) -> String {
        format!("{generation}:{}", request.cache_key())
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
        self.order.retain(|k| k != key);
    }

    fn miss(&mut self) {
        self.stats.misses += 1;
        record_query_cache_lookup(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::index::MarketCapTier;
    use crate::domain::query::QueryFilters;
    use crate::domain::shared::ManualClock;

    fn result(total: usize) -> QueryResult {
        QueryResult {
            positions: (0..total).collect::<Vec<_>>().into(),
            records: Vec::<crate::domain::catalog::Record>::new().into(),
            total_matches: total,
            page: 1,
            pages: 1,
        }
    }

    fn request(search: &str) -> QueryRequest {
        QueryRequest::new(QueryFilters::none().with_search(search))
    }

    fn cache(capacity: usize) -> (QueryCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let cache = QueryCache::new(capacity, Duration::from_secs(180), clock.clone());
        (cache, clock)
    }

    #[test]
    fn hit_after_insert() {
        let (mut cache, _) = cache(4);
        assert!(cache.get(&request("a"), 1).is_none());
        cache.insert(&request("a"), 1, result(3));

        let hit = cache.get(&request("a"), 1).unwrap();
        assert_eq!(hit.total_matches, 3);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn equivalent_requests_share_a_key() {
        let (mut cache, _) = cache(4);
        let spaced = QueryRequest::new(QueryFilters::none().with_exchange(" nyse "));
        let plain = QueryRequest::new(QueryFilters::none().with_exchange("NYSE"));
        cache.insert(&spaced, 1, result(2));
        assert!(cache.get(&plain, 1).is_some());
    }

    #[test]
    fn new_generation_misses() {
        let (mut cache, _) = cache(4);
        let req = QueryRequest::new(QueryFilters::none().with_market_cap(MarketCapTier::Large));
        cache.insert(&req, 1, result(2));
        assert!(cache.get(&req, 2).is_none());
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let (mut cache, _) = cache(2);
        cache.insert(&request("a"), 1, result(1));
        cache.insert(&request("b"), 1, result(2));
        cache.insert(&request("c"), 1, result(3));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&request("a"), 1).is_none());
        assert!(cache.get(&request("b"), 1).is_some());
        assert!(cache.get(&request("c"), 1).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn reinsert_moves_key_to_back() {
        let (mut cache, _) = cache(2);
        cache.insert(&request("a"), 1, result(1));
        cache.insert(&request("b"), 1, result(2));
        cache.insert(&request("a"), 1, result(9));
        cache.insert(&request("c"), 1, result(3));

        assert!(cache.get(&request("b"), 1).is_none());
        assert_eq!(cache.get(&request("a"), 1).unwrap().total_matches, 9);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let (mut cache, clock) = cache(4);
        cache.insert(&request("a"), 1, result(1));
        clock.advance(Duration::from_secs(179));
        assert!(cache.get(&request("a"), 1).is_some());
        clock.advance(Duration::from_secs(1));
        assert!(cache.get(&request("a"), 1).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_capacity_never_stores() {
        let (mut cache, _) = cache(0);
        cache.insert(&request("a"), 1, result(1));
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_keeps_counters() {
        let (mut cache, _) = cache(4);
        cache.insert(&request("a"), 1, result(1));
        let _ = cache.get(&request("a"), 1);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().hits, 1);
    }
}
