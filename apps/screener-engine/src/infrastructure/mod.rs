//! Infrastructure Layer
//!
//! Adapters for the application ports:
//!
//! - `source`: HTTP and in-memory [`RecordSource`](crate::application::ports::RecordSource)
//! - `persistence`: file-backed [`SnapshotStore`](crate::application::ports::SnapshotStore)
//! - `rendering`: headless [`RenderSurface`](crate::domain::rendering::RenderSurface)

pub mod persistence;
pub mod rendering;
pub mod source;
