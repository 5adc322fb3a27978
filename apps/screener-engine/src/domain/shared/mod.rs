//! Shared Domain Types
//!
//! Value objects shared across the catalog, index, and viewport contexts.

pub mod clock;
pub mod symbol;

pub use clock::{Clock, ManualClock, SystemClock, elapsed_millis};
pub use symbol::Symbol;
