//! Catalog Bounded Context
//!
//! Records, their ordered store, and the aggregate that keeps the store
//! and its secondary indices in step.

pub mod aggregate;
pub mod record;
pub mod store;

pub use aggregate::{Catalog, SharedCatalog};
pub use record::{Record, composite_score};
pub use store::RecordStore;
