//! Rendering Bounded Context
//!
//! Handle recycling against an abstract render surface.

pub mod pool;
pub mod surface;

pub use pool::{PoolStats, RenderPool, SyncReport};
pub use surface::RenderSurface;
