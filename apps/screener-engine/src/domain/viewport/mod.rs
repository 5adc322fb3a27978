//! Viewport Bounded Context
//!
//! Scroll geometry, velocity, and the debounce primitive shared with the
//! search box.

pub mod debounce;
pub mod velocity;
pub mod window;

pub use debounce::Debouncer;
pub use velocity::{ScrollPhase, VelocityTracker};
pub use window::{
    Alignment, ScrollOutcome, ViewportState, VisibleRange, WindowManager, WindowSettings,
};
