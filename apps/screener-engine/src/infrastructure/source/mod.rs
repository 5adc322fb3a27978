//! Record source adapters.

mod http;
mod memory;

pub use http::HttpRecordSource;
pub use memory::InMemoryRecordSource;
