//! Viewport configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::viewport::WindowSettings;

/// Row geometry and buffering for the window manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewportConfig {
    /// Row height.
    #[serde(default = "default_item_extent")]
    pub item_extent: f64,
    /// Minimum buffer rows on each side.
    #[serde(default = "default_base_buffer")]
    pub base_buffer: usize,
    /// Maximum buffer rows on each side.
    #[serde(default = "default_max_buffer")]
    pub max_buffer: usize,
    /// Fixed extra rows beyond the buffer.
    #[serde(default = "default_overscan")]
    pub overscan: usize,
    /// Buffer rows per unit of velocity (extent per ms).
    #[serde(default = "default_velocity_factor")]
    pub velocity_factor: f64,
    /// Quiet period before scrolling counts as idle, in milliseconds.
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,
    /// Scroll fraction that triggers the next page load.
    #[serde(default = "default_load_threshold")]
    pub load_threshold: f64,
    /// Quiet period for the search box, in milliseconds.
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            item_extent: default_item_extent(),
            base_buffer: default_base_buffer(),
            max_buffer: default_max_buffer(),
            overscan: default_overscan(),
            velocity_factor: default_velocity_factor(),
            idle_ms: default_idle_ms(),
            load_threshold: default_load_threshold(),
            search_debounce_ms: default_search_debounce_ms(),
        }
    }
}

impl ViewportConfig {
    /// Window manager settings.
    #[must_use]
    pub fn to_settings(&self) -> WindowSettings {
        WindowSettings {
            item_extent: self.item_extent,
            base_buffer: self.base_buffer,
            max_buffer: self.max_buffer,
            overscan: self.overscan,
            velocity_factor: self.velocity_factor,
            idle_after: Duration::from_millis(self.idle_ms),
            load_threshold: self.load_threshold,
        }
    }

    /// Search debounce period.
    #[must_use]
    pub const fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}

const fn default_item_extent() -> f64 {
    48.0
}

const fn default_base_buffer() -> usize {
    5
}

const fn default_max_buffer() -> usize {
    50
}

const fn default_overscan() -> usize {
    3
}

const fn default_velocity_factor() -> f64 {
    10.0
}

const fn default_idle_ms() -> u64 {
    150
}

const fn default_load_threshold() -> f64 {
    0.8
}

const fn default_search_debounce_ms() -> u64 {
    300
}
