//! Query filters
//!
//! Category predicates resolve through the secondary indices; the rest
//! (text search, numeric ranges) are evaluated only against the candidates
//! the indices leave.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::catalog::Record;
use crate::domain::index::{BucketKey, LeverageTier, MarketCapTier, VolumeTier};

/// Filter set for a screener query. All predicates are conjunctive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryFilters {
    /// Venue code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
    /// Market cap tier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<MarketCapTier>,
    /// Dollar volume tier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<VolumeTier>,
    /// Debt-to-equity tier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leverage: Option<LeverageTier>,
    /// Free-text match on symbol or name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Inclusive lower price bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_min: Option<Decimal>,
    /// Inclusive upper price bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_max: Option<Decimal>,
    /// Inclusive lower P/E bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pe_min: Option<f64>,
    /// Inclusive upper P/E bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pe_max: Option<f64>,
    /// Minimum composite score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,
}

impl QueryFilters {
    /// No filters.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Restrict to a venue.
    #[must_use]
    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = Some(exchange.into());
        self
    }

    /// Restrict to a market cap tier.
    #[must_use]
    pub const fn with_market_cap(mut self, tier: MarketCapTier) -> Self {
        self.market_cap = Some(tier);
        self
    }

    /// Restrict to a volume tier.
    #[must_use]
    pub const fn with_volume(mut self, tier: VolumeTier) -> Self {
        self.volume = Some(tier);
        self
    }

    /// Restrict to a leverage tier.
    #[must_use]
    pub const fn with_leverage(mut self, tier: LeverageTier) -> Self {
        self.leverage = Some(tier);
        self
    }

    /// Free-text search.
    #[must_use]
    pub fn with_search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    /// Inclusive price range; either side may be open.
    #[must_use]
    pub const fn with_price_range(mut self, min: Option<Decimal>, max: Option<Decimal>) -> Self {
        self.price_min = min;
        self.price_max = max;
        self
    }

    /// Minimum composite score.
    #[must_use]
    pub const fn with_min_score(mut self, score: f64) -> Self {
        self.min_score = Some(score);
        self
    }

    /// Canonical form: trimmed text, uppercase venue, lowercase search,
    /// blanks and non-finite bounds dropped.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let text = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let finite = |value: Option<f64>| value.filter(|v| v.is_finite());

        Self {
            exchange: text(&self.exchange).map(|s| s.to_uppercase()),
            market_cap: self.market_cap,
            volume: self.volume,
            leverage: self.leverage,
            search: text(&self.search).map(|s| s.to_lowercase()),
            price_min: self.price_min,
            price_max: self.price_max,
            pe_min: finite(self.pe_min),
            pe_max: finite(self.pe_max),
            min_score: finite(self.min_score),
        }
    }

    /// Whether no predicate is set (after normalization).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.normalized() == Self::default()
    }

    /// Index buckets this filter set restricts to.
    #[must_use]
    pub fn bucket_keys(&self) -> Vec<BucketKey> {
        let mut keys = Vec::new();
        if let Some(exchange) = &self.exchange {
            keys.push(BucketKey::Exchange(exchange.clone()));
        }
        if let Some(tier) = self.market_cap {
            keys.push(BucketKey::MarketCap(tier));
        }
        if let Some(tier) = self.volume {
            keys.push(BucketKey::Volume(tier));
        }
        if let Some(tier) = self.leverage {
            keys.push(BucketKey::Leverage(tier));
        }
        keys
    }

    /// Whether any predicate needs a per-record check.
    #[must_use]
    pub const fn has_residual(&self) -> bool {
        self.search.is_some()
            || self.price_min.is_some()
            || self.price_max.is_some()
            || self.pe_min.is_some()
            || self.pe_max.is_some()
            || self.min_score.is_some()
    }

    /// Evaluate the predicates that have no index.
    ///
    /// Expects a normalized filter set. A record missing a bounded value
    /// fails that bound.
    #[must_use]
    pub fn matches_residual(&self, record: &Record) -> bool {
        if let Some(needle) = &self.search
            && !record.matches_text(needle)
        {
            return false;
        }
        if self.price_min.is_some_and(|min| record.price < min) {
            return false;
        }
        if self.price_max.is_some_and(|max| record.price > max) {
            return false;
        }
        if self.pe_min.is_some() || self.pe_max.is_some() {
            let Some(pe) = record.pe_ratio else {
                return false;
            };
            if self.pe_min.is_some_and(|min| pe < min) || self.pe_max.is_some_and(|max| pe > max) {
                return false;
            }
        }
        if let Some(min) = self.min_score
            && record.score.is_none_or(|score| score < min)
        {
            return false;
        }
        true
    }

    /// Query-string pairs understood by the remote source.
    #[must_use]
    pub fn to_query_pairs(&self) -> BTreeMap<String, String> {
        let normalized = self.normalized();
        let mut pairs = BTreeMap::new();
        if let Some(exchange) = normalized.exchange {
            pairs.insert("exchange".to_string(), exchange);
        }
        if let Some(tier) = normalized.market_cap {
            pairs.insert("marketCap".to_string(), tier.to_string());
        }
        if let Some(tier) = normalized.volume {
            pairs.insert("volume".to_string(), tier.to_string());
        }
        if let Some(tier) = normalized.leverage {
            pairs.insert("debtToEquity".to_string(), tier.to_string());
        }
        if let Some(search) = normalized.search {
            pairs.insert("search".to_string(), search);
        }
        if let Some(min) = normalized.price_min {
            pairs.insert("priceMin".to_string(), min.to_string());
        }
        if let Some(max) = normalized.price_max {
            pairs.insert("priceMax".to_string(), max.to_string());
        }
        if let Some(min) = normalized.pe_min {
            pairs.insert("peMin".to_string(), min.to_string());
        }
        if let Some(max) = normalized.pe_max {
            pairs.insert("peMax".to_string(), max.to_string());
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn normalization_canonicalizes_text() {
        let filters = QueryFilters::none()
            .with_exchange(" nasdaq ")
            .with_search("  Apple ");
        let normalized = filters.normalized();
        assert_eq!(normalized.exchange.as_deref(), Some("NASDAQ"));
        assert_eq!(normalized.search.as_deref(), Some("apple"));
    }

    #[test]
    fn blank_filters_are_empty() {
        let filters = QueryFilters::none().with_search("   ").with_exchange("");
        assert!(filters.is_empty());
        assert!(!QueryFilters::none().with_min_score(10.0).is_empty());
    }

    #[test]
    fn residual_bounds_reject_missing_values() {
        let record = Record::new("AAPL", "NASDAQ", dec!(150));
        let filters = QueryFilters {
            pe_max: Some(30.0),
            ..QueryFilters::default()
        };
        assert!(!filters.matches_residual(&record));
        assert!(filters.matches_residual(&record.clone().with_pe_ratio(20.0)));
    }

    #[test]
    fn residual_price_range_is_inclusive() {
        let record = Record::new("AAPL", "NASDAQ", dec!(150));
        let filters = QueryFilters::none().with_price_range(Some(dec!(150)), Some(dec!(150)));
        assert!(filters.matches_residual(&record));
        let filters = QueryFilters::none().with_price_range(Some(dec!(150.01)), None);
        assert!(!filters.matches_residual(&record));
    }

    #[test]
    fn bucket_keys_follow_category_filters() {
        let filters = QueryFilters::none()
            .with_exchange("NYSE")
            .with_market_cap(MarketCapTier::Large)
            .with_search("x");
        assert_eq!(
            filters.bucket_keys(),
            vec![
                BucketKey::Exchange("NYSE".into()),
                BucketKey::MarketCap(MarketCapTier::Large)
            ]
        );
        assert!(filters.has_residual());
    }

    #[test]
    fn query_pairs_use_source_parameter_names() {
        let pairs = QueryFilters::none()
            .with_market_cap(MarketCapTier::Mid)
            .with_exchange("nyse")
            .to_query_pairs();
        assert_eq!(pairs.get("marketCap").map(String::as_str), Some("mid"));
        assert_eq!(pairs.get("exchange").map(String::as_str), Some("NYSE"));
    }
}
