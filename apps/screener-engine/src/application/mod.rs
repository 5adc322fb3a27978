//! Application Layer
//!
//! Orchestrates the domain against the outside world:
//!
//! - `ports`: Interfaces for the record source, snapshot storage, and
//!   loader notifications
//! - `dto`: Wire shapes of the remote source
//! - `services`: Batch loader, post-processing, and the two caches
//! - `engine`: The screener facade the host drives

pub mod dto;
pub mod engine;
pub mod ports;
pub mod services;

pub use engine::{
    ActiveView, EngineBuilder, PerformanceMetrics, PumpReport, RenderPass, ScreenerEngine,
    WarmStart,
};
