//! Query Bounded Context
//!
//! Filters, sort order, paging, and their evaluation over the catalog.

pub mod executor;
pub mod filters;
pub mod sort;

pub use executor::{PageSpec, QueryRequest, QueryResult, execute};
pub use filters::QueryFilters;
pub use sort::{SortDirection, SortField, SortSpec};
