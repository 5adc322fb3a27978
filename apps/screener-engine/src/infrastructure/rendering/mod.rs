//! Render surface adapters.

mod row_surface;

pub use row_surface::{RowHandle, RowSurface, SurfaceStats};
