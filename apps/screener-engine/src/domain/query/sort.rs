//! Sort specification
//!
//! Sorting is stable and puts missing values last in both directions, so
//! a descending sort on P/E still ends with the records that have none.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::domain::catalog::Record;

/// Sortable record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    /// Ticker symbol.
    Symbol,
    /// Company name.
    Name,
    /// Last price.
    Price,
    /// Market capitalization.
    MarketCap,
    /// Average share volume.
    AvgVolume,
    /// Average dollar volume.
    DollarVolume,
    /// Debt-to-equity ratio.
    DebtToEquity,
    /// P/E ratio.
    PeRatio,
    /// Composite score.
    Score,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

/// Field and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    /// Field to order by.
    pub field: SortField,
    /// Direction.
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    /// Ascending sort on a field.
    #[must_use]
    pub const fn asc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Asc,
        }
    }

    /// Descending sort on a field.
    #[must_use]
    pub const fn desc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Desc,
        }
    }

    /// Compare two records. Missing values order after present ones
    /// regardless of direction.
    #[must_use]
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let ordering = match self.field {
            SortField::Symbol => Some(a.symbol.cmp(&b.symbol)),
            SortField::Name => nulls_last(a.name.as_deref(), b.name.as_deref(), |x, y| {
                x.to_lowercase().cmp(&y.to_lowercase())
            }),
            SortField::Price => Some(a.price.cmp(&b.price)),
            SortField::MarketCap => nulls_last(a.market_cap, b.market_cap, |x, y| x.cmp(&y)),
            SortField::AvgVolume => nulls_last(a.avg_volume, b.avg_volume, |x, y| x.cmp(&y)),
            SortField::DollarVolume => {
                nulls_last(a.dollar_volume(), b.dollar_volume(), |x, y| x.cmp(&y))
            }
            SortField::DebtToEquity => {
                nulls_last(a.debt_to_equity, b.debt_to_equity, |x: f64, y: f64| x.total_cmp(&y))
            }
            SortField::PeRatio => nulls_last(a.pe_ratio, b.pe_ratio, |x: f64, y: f64| x.total_cmp(&y)),
            SortField::Score => nulls_last(a.score, b.score, |x: f64, y: f64| x.total_cmp(&y)),
        };

        match ordering {
            Some(ordering) if self.direction == SortDirection::Desc => ordering.reverse(),
            Some(ordering) => ordering,
            // One side missing: already final, direction does not apply.
            None => match (self.is_missing(a), self.is_missing(b)) {
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                _ => Ordering::Equal,
            },
        }
    }

    fn is_missing(&self, record: &Record) -> bool {
        match self.field {
            SortField::Symbol | SortField::Price => false,
            SortField::Name => record.name.is_none(),
            SortField::MarketCap => record.market_cap.is_none(),
            SortField::AvgVolume | SortField::DollarVolume => record.avg_volume.is_none(),
            SortField::DebtToEquity => record.debt_to_equity.is_none(),
            SortField::PeRatio => record.pe_ratio.is_none(),
            SortField::Score => record.score.is_none(),
        }
    }
}

/// `Some(ordering)` when both sides are present, `None` otherwise.
fn nulls_last<T>(a: Option<T>, b: Option<T>, cmp: impl Fn(T, T) -> Ordering) -> Option<Ordering> {
    match (a, b) {
        (Some(x), Some(y)) => Some(cmp(x, y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn records() -> Vec<Record> {
        vec![
            Record::new("B", "NYSE", dec!(20)).with_pe_ratio(15.0),
            Record::new("A", "NYSE", dec!(10)),
            Record::new("C", "NYSE", dec!(30)).with_pe_ratio(5.0),
        ]
    }

    fn sorted_symbols(spec: SortSpec) -> Vec<String> {
        let mut records = records();
        records.sort_by(|a, b| spec.compare(a, b));
        records.iter().map(|r| r.symbol.to_string()).collect()
    }

    #[test]
    fn ascending_puts_missing_last() {
        assert_eq!(sorted_symbols(SortSpec::asc(SortField::PeRatio)), ["C", "B", "A"]);
    }

    #[test]
    fn descending_still_puts_missing_last() {
        assert_eq!(sorted_symbols(SortSpec::desc(SortField::PeRatio)), ["B", "C", "A"]);
    }

    #[test]
    fn price_sort_respects_direction() {
        assert_eq!(sorted_symbols(SortSpec::desc(SortField::Price)), ["C", "B", "A"]);
        assert_eq!(sorted_symbols(SortSpec::asc(SortField::Symbol)), ["A", "B", "C"]);
    }

    #[test]
    fn equal_keys_keep_input_order() {
        let mut records = vec![
            Record::new("X", "NYSE", dec!(1)),
            Record::new("Y", "NYSE", dec!(1)),
            Record::new("Z", "NYSE", dec!(1)),
        ];
        let spec = SortSpec::desc(SortField::Price);
        records.sort_by(|a, b| spec.compare(a, b));
        let symbols: Vec<_> = records.iter().map(|r| r.symbol.to_string()).collect();
        assert_eq!(symbols, ["X", "Y", "Z"]);
    }
}
