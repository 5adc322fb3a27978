//! Headless row surface.
//!
//! Renders each record into a map of display strings. Text UIs print the
//! rows; tests inspect them to prove a recycled handle carries nothing of
//! its previous record.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::catalog::Record;
use crate::domain::rendering::RenderSurface;

/// Column order for [`RowSurface::render_line`].
pub const COLUMNS: [&str; 9] = [
    "symbol",
    "name",
    "exchange",
    "price",
    "market_cap",
    "avg_volume",
    "debt_to_equity",
    "pe_ratio",
    "score",
];

/// One pooled row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowHandle {
    id: usize,
    index: Option<usize>,
    fields: BTreeMap<&'static str, String>,
}

impl RowHandle {
    /// Stable handle id, assigned at creation.
    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }

    /// View index the row is attached to.
    #[must_use]
    pub const fn index(&self) -> Option<usize> {
        self.index
    }

    /// Display value of a column, if set.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Every set column.
    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<&'static str, String> {
        &self.fields
    }
}

/// Surface counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SurfaceStats {
    /// Handles created.
    pub created: usize,
    /// Handles destroyed.
    pub destroyed: usize,
    /// Bind calls.
    pub binds: u64,
}

/// Surface producing [`RowHandle`]s.
#[derive(Debug, Default)]
pub struct RowSurface {
    stats: SurfaceStats,
}

impl RowSurface {
    /// Create a surface.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters.
    #[must_use]
    pub const fn stats(&self) -> SurfaceStats {
        self.stats
    }

    /// Pipe-separated line in [`COLUMNS`] order; unset columns are blank.
    #[must_use]
    pub fn render_line(handle: &RowHandle) -> String {
        let mut line = String::new();
        for (i, column) in COLUMNS.iter().enumerate() {
            if i > 0 {
                line.push_str(" | ");
            }
            let _ = write!(line, "{}", handle.field(column).unwrap_or(""));
        }
        line
    }
}

impl RenderSurface for RowSurface {
    type Handle = RowHandle;

    fn create(&mut self) -> RowHandle {
        self.stats.created += 1;
        RowHandle {
            id: self.stats.created,
            ..RowHandle::default()
        }
    }

    fn clear(&mut self, handle: &mut RowHandle) {
        handle.fields.clear();
    }

    fn bind(&mut self, handle: &mut RowHandle, index: usize, record: &Record) {
        self.stats.binds += 1;
        handle.index = Some(index);

        let fields = &mut handle.fields;
        fields.insert("symbol", record.symbol.to_string());
        fields.insert("exchange", record.exchange.clone());
        fields.insert("price", format_price(record.price));
        if let Some(name) = &record.name {
            fields.insert("name", name.clone());
        }
        if let Some(cap) = record.market_cap {
            fields.insert("market_cap", compact_dollars(cap));
        }
        if let Some(volume) = record.avg_volume {
            fields.insert("avg_volume", volume.to_string());
        }
        if let Some(ratio) = record.debt_to_equity {
            fields.insert("debt_to_equity", format!("{ratio:.2}"));
        }
        if let Some(pe) = record.pe_ratio {
            fields.insert("pe_ratio", format!("{pe:.1}"));
        }
        if let Some(score) = record.score {
            fields.insert("score", format!("{score:.1}"));
        }
    }

    fn unbind(&mut self, handle: &mut RowHandle, _index: usize) {
        handle.index = None;
    }

    fn destroy(&mut self, handle: RowHandle) {
        self.stats.destroyed += 1;
        drop(handle);
    }
}

fn format_price(price: Decimal) -> String {
    format!("{:.2}", price.round_dp(2))
}

fn compact_dollars(value: Decimal) -> String {
    const UNITS: [(i64, &str); 3] = [
        (1_000_000_000_000, "T"),
        (1_000_000_000, "B"),
        (1_000_000, "M"),
    ];
    for (scale, suffix) in UNITS {
        let scale = Decimal::from(scale);
        if value.abs() >= scale {
            return format!("${:.2}{suffix}", (value / scale).round_dp(2));
        }
    }
    format!("${}", value.round_dp(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rich() -> Record {
        Record::new("AAPL", "NASDAQ", dec!(190.123))
            .with_name("Apple Inc.")
            .with_market_cap(dec!(2950000000000))
            .with_pe_ratio(29.41)
            .with_derived_fields()
    }

    #[test]
    fn binds_display_fields() {
        let mut surface = RowSurface::new();
        let mut handle = surface.create();
        surface.bind(&mut handle, 7, &rich());

        assert_eq!(handle.index(), Some(7));
        assert_eq!(handle.field("price"), Some("190.12"));
        assert_eq!(handle.field("market_cap"), Some("$2.95T"));
        assert_eq!(handle.field("pe_ratio"), Some("29.4"));
        assert_eq!(handle.field("avg_volume"), None);
    }

    #[test]
    fn clear_then_bind_leaves_nothing_behind() {
        let mut surface = RowSurface::new();
        let mut handle = surface.create();
        surface.bind(&mut handle, 0, &rich());

        let bare = Record::new("ZZZ", "NYSE", dec!(1));
        surface.clear(&mut handle);
        surface.bind(&mut handle, 1, &bare);

        assert_eq!(handle.field("name"), None);
        assert_eq!(handle.field("market_cap"), None);
        assert_eq!(handle.fields().len(), 3);
    }

    #[test]
    fn render_line_keeps_column_positions() {
        let mut surface = RowSurface::new();
        let mut handle = surface.create();
        surface.bind(&mut handle, 0, &Record::new("X", "NYSE", dec!(2)));
        assert_eq!(
            RowSurface::render_line(&handle),
            "X |  | NYSE | 2.00 |  |  |  |  | "
        );
    }

    #[test]
    fn compact_dollars_picks_unit() {
        assert_eq!(compact_dollars(dec!(1500000)), "$1.50M");
        assert_eq!(compact_dollars(dec!(12000000000)), "$12.00B");
        assert_eq!(compact_dollars(dec!(950)), "$950");
    }
}
