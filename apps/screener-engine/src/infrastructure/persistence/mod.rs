//! Snapshot store adapters.

mod file_store;

pub use file_store::FileSnapshotStore;
