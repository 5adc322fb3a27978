//! Query execution
//!
//! Resolves a [`QueryRequest`] against the catalog: index buckets are
//! intersected smallest first, the residual predicates scan only that
//! candidate set, then the survivors are sorted and paged.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::filters::QueryFilters;
use super::sort::SortSpec;
use crate::domain::catalog::{Catalog, Record};
use crate::domain::index::intersect_sorted;

/// Which slice of the result to materialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSpec {
    /// Every match.
    #[default]
    All,
    /// One 1-based page.
    Page {
        /// Page number, starting at 1.
        number: usize,
        /// Page size.
        size: usize,
    },
}

/// A (filters, sort, page) triple.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Filters.
    pub filters: QueryFilters,
    /// Sort order; `None` keeps store order.
    pub sort: Option<SortSpec>,
    /// Page.
    pub page: PageSpec,
}

impl QueryRequest {
    /// Request over the given filters with store order and no paging.
    #[must_use]
    pub fn new(filters: QueryFilters) -> Self {
        Self {
            filters,
            ..Self::default()
        }
    }

    /// Set the sort.
    #[must_use]
    pub const fn sorted(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Set the page.
    #[must_use]
    pub const fn paged(mut self, number: usize, size: usize) -> Self {
        self.page = PageSpec::Page { number, size };
        self
    }

    /// Request with normalized filters.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            filters: self.filters.normalized(),
            sort: self.sort,
            page: self.page,
        }
    }

    /// Canonical cache key: JSON of the normalized request.
    ///
    /// Equivalent requests (e.g. differing only in whitespace or case of
    /// the venue) share a key.
    #[must_use]
    pub fn cache_key(&self) -> String {
        serde_json::to_string(&self.normalized()).unwrap_or_else(|_| format!("{self:?}"))
    }
}

/// Outcome of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Every matching position in result order.
    pub positions: Arc<[usize]>,
    /// Records of the requested page (all matches for [`PageSpec::All`]).
    pub records: Arc<[Record]>,
    /// Total matches before paging.
    pub total_matches: usize,
    /// Page returned (1 for [`PageSpec::All`]).
    pub page: usize,
    /// Page count (1 for [`PageSpec::All`], 0 when nothing matched and paging).
    pub pages: usize,
}

impl QueryResult {
    /// Whether nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_matches == 0
    }
}

/// Evaluate a request against the catalog.
#[must_use]
pub fn execute(catalog: &Catalog, request: &QueryRequest) -> QueryResult {
    let request = request.normalized();
    let filters = &request.filters;
    let store = catalog.store();

    let keys = filters.bucket_keys();
    let candidates: Vec<usize> = if keys.is_empty() {
        (0..store.len()).collect()
    } else {
        let lists: Vec<&[usize]> = keys.iter().map(|k| catalog.index().query(k)).collect();
        intersect_sorted(lists)
    };

    let mut positions: Vec<usize> = if filters.has_residual() {
        candidates
            .into_iter()
            .filter(|&p| store.get(p).is_some_and(|r| filters.matches_residual(r)))
            .collect()
    } else {
        candidates
    };

    if let Some(sort) = request.sort {
        // sort_by is stable: ties keep store order.
        positions.sort_by(|&a, &b| match (store.get(a), store.get(b)) {
            (Some(ra), Some(rb)) => sort.compare(ra, rb),
            _ => a.cmp(&b),
        });
    }

    let total_matches = positions.len();
    let (page, pages, window) = match request.page {
        PageSpec::All => (1, 1, 0..total_matches),
        PageSpec::Page { number, size } => {
            let size = size.max(1);
            let pages = total_matches.div_ceil(size);
            let number = number.max(1);
            let start = (number - 1).saturating_mul(size).min(total_matches);
            let end = start.saturating_add(size).min(total_matches);
            (number, pages, start..end)
        }
    };

    let records: Vec<Record> = store.collect_positions(&positions[window]);

    tracing::debug!(
        total_matches,
        page,
        pages,
        returned = records.len(),
        "Query executed"
    );

    QueryResult {
        positions: positions.into(),
        records: records.into(),
        total_matches,
        page,
        pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::index::{MarketCapTier, TierTable};
    use crate::domain::query::sort::SortField;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new(TierTable::default());
        let records = (0..30)
            .map(|i| {
                let exchange = if i % 2 == 0 { "NYSE" } else { "NASDAQ" };
                let cap = if i % 3 == 0 {
                    dec!(20000000000)
                } else {
                    dec!(500000000)
                };
                Record::new(format!("S{i:02}"), exchange, Decimal::from(i + 1))
                    .with_name(format!("Company {i}"))
                    .with_market_cap(cap)
                    .with_derived_fields()
            })
            .collect();
        catalog.append_batch(records, Some(30));
        catalog
    }

    #[test]
    fn empty_filters_return_everything_in_order() {
        let result = execute(&catalog(), &QueryRequest::default());
        assert_eq!(result.total_matches, 30);
        assert_eq!(result.positions.first(), Some(&0));
        assert_eq!(result.records.len(), 30);
    }

    #[test]
    fn category_filters_intersect() {
        let filters = QueryFilters::none()
            .with_exchange("nyse")
            .with_market_cap(MarketCapTier::Large);
        let result = execute(&catalog(), &QueryRequest::new(filters));
        // Even positions divisible by three.
        assert_eq!(&*result.positions, &[0, 6, 12, 18, 24]);
    }

    #[test]
    fn residual_scan_narrows_candidates() {
        let filters = QueryFilters::none()
            .with_exchange("NYSE")
            .with_price_range(Some(dec!(10)), Some(dec!(15)));
        let result = execute(&catalog(), &QueryRequest::new(filters));
        // Prices are position + 1; NYSE is even positions.
        assert_eq!(&*result.positions, &[10, 12, 14]);
    }

    #[test]
    fn search_matches_names() {
        let filters = QueryFilters::none().with_search("company 2");
        let result = execute(&catalog(), &QueryRequest::new(filters));
        // "Company 2" and "Company 20".."Company 29".
        assert_eq!(result.total_matches, 11);
    }

    #[test]
    fn sorted_and_paged() {
        let request = QueryRequest::default()
            .sorted(SortSpec::desc(SortField::Price))
            .paged(2, 7);
        let result = execute(&catalog(), &request);
        assert_eq!(result.pages, 5);
        assert_eq!(result.page, 2);
        let symbols: Vec<_> = result.records.iter().map(|r| r.symbol.to_string()).collect();
        assert_eq!(symbols, ["S22", "S21", "S20", "S19", "S18", "S17", "S16"]);
    }

    #[test]
    fn page_past_end_is_empty() {
        let result = execute(&catalog(), &QueryRequest::default().paged(9, 10));
        assert!(result.records.is_empty());
        assert_eq!(result.total_matches, 30);
    }

    #[test]
    fn cache_key_ignores_cosmetic_differences() {
        let a = QueryRequest::new(QueryFilters::none().with_exchange(" nyse"));
        let b = QueryRequest::new(QueryFilters::none().with_exchange("NYSE "));
        assert_eq!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), a.clone().paged(1, 10).cache_key());
    }
}
