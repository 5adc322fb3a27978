//! Canonical screener record.
//!
//! One instrument as the rest of the engine sees it. Field-name variants
//! from the remote source are resolved before a `Record` is built, so
//! nothing downstream branches on aliases.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::domain::shared::Symbol;

/// Weight of the valuation component in the composite score.
const VALUATION_WEIGHT: f64 = 0.4;
/// Weight of the leverage component in the composite score.
const LEVERAGE_WEIGHT: f64 = 0.3;
/// Weight of the liquidity component in the composite score.
const LIQUIDITY_WEIGHT: f64 = 0.3;

/// P/E at which the valuation component reaches zero.
const PE_CEILING: f64 = 50.0;
/// Debt-to-equity at which the leverage component reaches zero.
const LEVERAGE_CEILING: f64 = 3.0;
/// log10 dollar volume mapped to a liquidity component of 0.0 ($100K).
const LIQUIDITY_FLOOR_LOG: f64 = 5.0;
/// Span of log10 dollar volume mapped onto 0.0..=1.0 ($100K..$1B).
const LIQUIDITY_SPAN_LOG: f64 = 4.0;

/// A single financial instrument.
///
/// Immutable once received. A re-fetch supersedes it by replacing the
/// whole store, never by patching fields in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Ticker symbol (primary key).
    pub symbol: Symbol,
    /// Company name.
    #[serde(default)]
    pub name: Option<String>,
    /// Venue code (e.g. "NASDAQ", "NYSE").
    pub exchange: String,
    /// Last price.
    pub price: Decimal,
    /// Market capitalization in dollars.
    #[serde(default)]
    pub market_cap: Option<Decimal>,
    /// Average daily traded volume in shares.
    #[serde(default)]
    pub avg_volume: Option<u64>,
    /// Leverage ratio (total debt / shareholder equity).
    #[serde(default)]
    pub debt_to_equity: Option<f64>,
    /// Valuation ratio (price / earnings).
    #[serde(default)]
    pub pe_ratio: Option<f64>,
    /// Derived composite score in `0.0..=100.0`.
    #[serde(default)]
    pub score: Option<f64>,
}

impl Record {
    /// Create a record with only the required fields set.
    #[must_use]
    pub fn new(symbol: impl Into<Symbol>, exchange: impl Into<String>, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            name: None,
            exchange: exchange.into().trim().to_uppercase(),
            price,
            market_cap: None,
            avg_volume: None,
            debt_to_equity: None,
            pe_ratio: None,
            score: None,
        }
    }

    /// Set the company name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the market capitalization.
    #[must_use]
    pub const fn with_market_cap(mut self, market_cap: Decimal) -> Self {
        self.market_cap = Some(market_cap);
        self
    }

    /// Set the average volume.
    #[must_use]
    pub const fn with_avg_volume(mut self, avg_volume: u64) -> Self {
        self.avg_volume = Some(avg_volume);
        self
    }

    /// Set the debt-to-equity ratio.
    #[must_use]
    pub const fn with_debt_to_equity(mut self, ratio: f64) -> Self {
        self.debt_to_equity = Some(ratio);
        self
    }

    /// Set the P/E ratio.
    #[must_use]
    pub const fn with_pe_ratio(mut self, ratio: f64) -> Self {
        self.pe_ratio = Some(ratio);
        self
    }

    /// Average dollar volume (`price * avg_volume`).
    ///
    /// `None` when either input is missing or the product does not fit a
    /// `Decimal`.
    #[must_use]
    pub fn dollar_volume(&self) -> Option<Decimal> {
        self.avg_volume
            .and_then(|volume| self.price.checked_mul(Decimal::from(volume)))
    }

    /// Recompute every derived field.
    ///
    /// Idempotent: running it twice yields the same record.
    #[must_use]
    pub fn with_derived_fields(mut self) -> Self {
        self.exchange = self.exchange.trim().to_uppercase();
        self.score = composite_score(&self);
        self
    }

    /// Case-insensitive substring match on symbol and name.
    ///
    /// `needle` must already be lowercase.
    #[must_use]
    pub fn matches_text(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        if self.symbol.as_str().to_lowercase().contains(needle) {
            return true;
        }
        self.name
            .as_deref()
            .is_some_and(|name| name.to_lowercase().contains(needle))
    }
}

/// Composite score blending valuation, leverage, and liquidity.
///
/// Each component is normalized to `0.0..=1.0` and weighted; missing
/// components are dropped and the remaining weights renormalized.
/// Returns `None` when no component is available.
#[must_use]
pub fn composite_score(record: &Record) -> Option<f64> {
    let mut weighted = 0.0;
    let mut weight_sum = 0.0;

    if let Some(pe) = record.pe_ratio.filter(|pe| pe.is_finite()) {
        // Negative earnings score zero on valuation.
        let component = if pe <= 0.0 {
            0.0
        } else {
            (1.0 - pe / PE_CEILING).clamp(0.0, 1.0)
        };
        weighted += component * VALUATION_WEIGHT;
        weight_sum += VALUATION_WEIGHT;
    }

    if let Some(ratio) = record.debt_to_equity.filter(|r| r.is_finite()) {
        let component = (1.0 - ratio.max(0.0) / LEVERAGE_CEILING).clamp(0.0, 1.0);
        weighted += component * LEVERAGE_WEIGHT;
        weight_sum += LEVERAGE_WEIGHT;
    }

    if let Some(dollars) = record.dollar_volume().and_then(|d| d.to_f64()) {
        let component = if dollars <= 0.0 {
            0.0
        } else {
            ((dollars.log10() - LIQUIDITY_FLOOR_LOG) / LIQUIDITY_SPAN_LOG).clamp(0.0, 1.0)
        };
        weighted += component * LIQUIDITY_WEIGHT;
        weight_sum += LIQUIDITY_WEIGHT;
    }

    if weight_sum == 0.0 {
        return None;
    }

    let score = (weighted / weight_sum) * 100.0;
    Some((score * 10.0).round() / 10.0)
}
