//! Render surface port.
//!
//! Whatever actually displays rows (a terminal table, a DOM bridge, a test
//! recorder) implements [`RenderSurface`]. The pool only ever talks to
//! handles through it.

use crate::domain::catalog::Record;

/// Presentation backend for pooled row handles.
pub trait RenderSurface {
    /// Presentation object recycled by the pool.
    type Handle;

    /// Create a fresh, empty handle.
    fn create(&mut self) -> Self::Handle;

    /// Remove every field previously set on the handle.
    fn clear(&mut self, handle: &mut Self::Handle);

    /// Populate the handle from a record and attach it at `index`.
    fn bind(&mut self, handle: &mut Self::Handle, index: usize, record: &Record);

    /// Detach the handle from `index`.
    fn unbind(&mut self, handle: &mut Self::Handle, index: usize);

    /// Dispose of a handle for good.
    fn destroy(&mut self, handle: Self::Handle) {
        drop(handle);
    }
}
