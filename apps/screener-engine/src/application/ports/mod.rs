//! Application Ports
//!
//! Driven ports the loader and cache depend on. Adapters live in the
//! infrastructure layer; test doubles live next to the traits.

mod loader_event_port;
mod record_source_port;
mod snapshot_store_port;

pub use loader_event_port::{
    CallbackSink, ChannelEventSink, CompositeEventSink, LoaderEvent, LoaderEventSink,
    NoOpEventSink,
};
#[cfg(test)]
pub use record_source_port::MockRecordSource;
pub use record_source_port::{PageQuery, RecordSource, SourceError};
pub use snapshot_store_port::{InMemorySnapshotStore, SnapshotStore, StoreError};
