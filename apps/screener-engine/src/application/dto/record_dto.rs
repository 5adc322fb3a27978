//! Wire-format records and pages.
//!
//! The remote source is loose about field names (snake_case, camelCase,
//! vendor spellings) and about numbers (JSON numbers or numeric strings).
//! Everything is accepted here and normalized once into [`Record`].

use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::catalog::Record;
use crate::domain::shared::Symbol;

/// Reason a raw record could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    /// Symbol missing or blank.
    #[error("record has no symbol")]
    MissingSymbol,

    /// Price missing.
    #[error("record {symbol} has no price")]
    MissingPrice {
        /// Offending symbol.
        symbol: String,
    },

    /// Price present but unusable.
    #[error("record {symbol} has invalid price: {value}")]
    InvalidPrice {
        /// Offending symbol.
        symbol: String,
        /// Raw value.
        value: String,
    },
}

/// A record as sent by the remote source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Ticker.
    #[serde(default, alias = "ticker")]
    pub symbol: Option<String>,
    /// Company name.
    #[serde(default, alias = "companyName", alias = "company_name")]
    pub name: Option<String>,
    /// Venue code.
    #[serde(
        default,
        alias = "exchangeShortName",
        alias = "exchange_short_name",
        alias = "venue"
    )]
    pub exchange: Option<String>,
    /// Last price.
    #[serde(default)]
    pub price: Option<Value>,
    /// Market capitalization.
    #[serde(default, alias = "marketCap", alias = "mktCap")]
    pub market_cap: Option<Value>,
    /// Average share volume.
    #[serde(default, alias = "avgVolume", alias = "volAvg", alias = "averageVolume")]
    pub avg_volume: Option<Value>,
    /// Debt-to-equity.
    #[serde(default, alias = "debtToEquity", alias = "debt_equity")]
    pub debt_to_equity: Option<Value>,
    /// P/E ratio.
    #[serde(default, alias = "peRatio", alias = "pe")]
    pub pe_ratio: Option<Value>,
}

impl RawRecord {
    /// Normalize into a canonical record.
    ///
    /// Symbol and price are required. Optional numeric fields that are
    /// absent, unparseable, negative where that is meaningless, or
    /// non-finite become `None`. Derived fields are not computed here.
    pub fn normalize(&self) -> Result<Record, NormalizeError> {
        let symbol = self
            .symbol
            .as_deref()
            .map(Symbol::new)
            .filter(|s| !s.is_empty())
            .ok_or(NormalizeError::MissingSymbol)?;

        let raw_price = self
            .price
            .as_ref()
            .filter(|v| !v.is_null())
            .ok_or_else(|| NormalizeError::MissingPrice {
                symbol: symbol.to_string(),
            })?;
        let price = decimal_value(raw_price)
            .filter(|p| !p.is_sign_negative())
            .ok_or_else(|| NormalizeError::InvalidPrice {
                symbol: symbol.to_string(),
                value: raw_price.to_string(),
            })?;

        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        let exchange = self.exchange.as_deref().unwrap_or_default();

        let mut record = Record::new(symbol, exchange, price);
        record.name = name;
        record.market_cap = self
            .market_cap
            .as_ref()
            .and_then(decimal_value)
            .filter(|cap| !cap.is_sign_negative());
        record.avg_volume = self
            .avg_volume
            .as_ref()
            .and_then(float_value)
            .filter(|v| *v >= 0.0)
            .and_then(|v| v.round().to_u64());
        record.debt_to_equity = self.debt_to_equity.as_ref().and_then(float_value);
        record.pe_ratio = self.pe_ratio.as_ref().and_then(float_value);
        Ok(record)
    }
}

impl From<&Record> for RawRecord {
    fn from(record: &Record) -> Self {
        Self {
            symbol: Some(record.symbol.to_string()),
            name: record.name.clone(),
            exchange: Some(record.exchange.clone()),
            price: Some(Value::String(record.price.to_string())),
            market_cap: record.market_cap.map(|cap| Value::String(cap.to_string())),
            avg_volume: record.avg_volume.map(Value::from),
            debt_to_equity: record.debt_to_equity.map(Value::from),
            pe_ratio: record.pe_ratio.map(Value::from),
        }
    }
}

/// Pagination block of a page response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPagination {
    /// Page number served (1-based).
    pub page: usize,
    /// Total pages.
    #[serde(alias = "totalPages", alias = "total_pages")]
    pub pages: usize,
    /// Total records across all pages.
    #[serde(alias = "totalCount", alias = "total_count")]
    pub total: usize,
}

/// One page response from the remote source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPage {
    /// Records on this page.
    #[serde(alias = "data", alias = "stocks")]
    pub items: Vec<RawRecord>,
    /// Pagination metadata.
    pub pagination: RawPagination,
}

/// A page after normalization.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedPage {
    /// Records that normalized, in page order.
    pub records: Vec<Record>,
    /// Why the other records were dropped.
    pub rejected: Vec<NormalizeError>,
}

impl RawPage {
    /// Normalize every record, setting invalid ones aside.
    #[must_use]
    pub fn normalize(&self) -> NormalizedPage {
        let mut page = NormalizedPage {
            records: Vec::with_capacity(self.items.len()),
            rejected: Vec::new(),
        };
        for raw in &self.items {
            match raw.normalize() {
                Ok(record) => page.records.push(record),
                Err(e) => page.rejected.push(e),
            }
        }
        page
    }
}

fn decimal_value(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn float_value(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}
