//! Domain Layer
//!
//! Pure screener logic with no I/O. This layer defines:
//!
//! - **Aggregates**: The catalog (record store plus indices) as one
//!   consistency boundary
//! - **Value Objects**: Records, symbols, tiers, filters, ranges
//! - **Domain Services**: Query execution, window computation, handle recycling
//!
//! # Bounded Contexts
//!
//! - [`catalog`]: Records and the ordered store
//! - [`index`]: Secondary indices and tier classification
//! - [`query`]: Filters, sort, paging, and evaluation
//! - [`viewport`]: Visible range, velocity, debounce
//! - [`rendering`]: Render surface port and the handle pool

pub mod catalog;
pub mod index;
pub mod query;
pub mod rendering;
pub mod shared;
pub mod viewport;
