//! Data Transfer Objects (DTOs)
//!
//! Wire shapes of the remote source, normalized at the loader boundary.

mod record_dto;

pub use record_dto::{NormalizeError, NormalizedPage, RawPage, RawPagination, RawRecord};
