//! Viewport Window Manager
//!
//! Turns scroll geometry into the index range that must be materialized.
//! The range covers the visible rows plus a buffer that grows with scroll
//! velocity (capped) and a fixed overscan on each side.

use std::ops::Range;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::velocity::{ScrollPhase, VelocityTracker};

/// Half-open index range `[start, end)` within the active view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct VisibleRange {
    /// First index, inclusive.
    pub start: usize,
    /// Last index, exclusive.
    pub end: usize,
}

impl VisibleRange {
    /// Empty range.
    pub const EMPTY: Self = Self { start: 0, end: 0 };

    /// Create a range; `end` is raised to `start` if smaller.
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Number of indices covered.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the range covers nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Whether an index falls in the range.
    #[must_use]
    pub const fn contains(&self, index: usize) -> bool {
        index >= self.start && index < self.end
    }

    /// As a std range.
    #[must_use]
    pub const fn as_range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Where a target row should land after `scroll_to_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    /// Row at the top edge.
    Start,
    /// Row centered.
    Center,
    /// Row at the bottom edge.
    End,
    /// Scroll the minimum needed to show the row; no-op if already visible.
    #[default]
    Auto,
}

/// Geometry and buffer tuning for the window manager.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSettings {
    /// Height of one row.
    pub item_extent: f64,
    /// Buffer rows kept on each side when idle.
    pub base_buffer: usize,
    /// Upper bound on buffer rows.
    pub max_buffer: usize,
    /// Extra rows beyond the buffer.
    pub overscan: usize,
    /// Buffer rows added per unit of velocity (extent per ms).
    pub velocity_factor: f64,
    /// Quiet period before scrolling is considered finished.
    pub idle_after: Duration,
    /// Scroll fraction beyond which more data is requested.
    pub load_threshold: f64,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            item_extent: 48.0,
            base_buffer: 5,
            max_buffer: 50,
            overscan: 3,
            velocity_factor: 10.0,
            idle_after: Duration::from_millis(150),
            load_threshold: 0.8,
        }
    }
}

/// Snapshot of the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewportState {
    /// Clamped scroll offset.
    pub scroll_offset: f64,
    /// Container height.
    pub container_extent: f64,
    /// Current range.
    pub visible_range: VisibleRange,
    /// Extent units per millisecond.
    pub velocity: f64,
    /// Scrolling or idle.
    pub phase: ScrollPhase,
    /// Buffer rows in use.
    pub buffer: usize,
    /// Rows in the active view.
    pub view_len: usize,
}

/// Result of feeding a scroll or resize event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollOutcome {
    /// Range after the event.
    pub range: VisibleRange,
    /// Whether it differs from the previous range (a render pass is due).
    pub changed: bool,
    /// Whether the scroll position passed the load threshold.
    pub near_boundary: bool,
}

/// Computes the materialized range for a scrolling list.
#[derive(Debug, Clone)]
pub struct WindowManager {
    settings: WindowSettings,
    view_len: usize,
    scroll_offset: f64,
    container_extent: f64,
    range: VisibleRange,
    velocity: VelocityTracker,
}

impl WindowManager {
    /// Create a manager over an empty view.
    #[must_use]
    pub fn new(settings: WindowSettings) -> Self {
        let velocity = VelocityTracker::new(settings.idle_after);
        Self {
            settings,
            view_len: 0,
            scroll_offset: 0.0,
            container_extent: 0.0,
            range: VisibleRange::EMPTY,
            velocity,
        }
    }

    /// Settings in use.
    #[must_use]
    pub const fn settings(&self) -> &WindowSettings {
        &self.settings
    }

    /// Current range.
    #[must_use]
    pub const fn range(&self) -> VisibleRange {
        self.range
    }

    /// Rows in the active view.
    #[must_use]
    pub const fn view_len(&self) -> usize {
        self.view_len
    }

    /// Full scrollable extent.
    #[must_use]
    pub fn total_extent(&self) -> f64 {
        self.view_len as f64 * self.settings.item_extent
    }

    /// Buffer rows for the current velocity.
    #[must_use]
    pub fn buffer(&self) -> usize {
        let base = self.settings.base_buffer;
        let cap = self.settings.max_buffer.max(base);
        let scaled = (self.velocity.velocity() * self.settings.velocity_factor).ceil();
        if !scaled.is_finite() || scaled <= 0.0 {
            return base;
        }
        if scaled >= cap as f64 {
            return cap;
        }
        (scaled as usize).clamp(base, cap)
    }

    /// Snapshot of the viewport.
    #[must_use]
    pub fn state(&self) -> ViewportState {
        ViewportState {
            scroll_offset: self.scroll_offset,
            container_extent: self.container_extent,
            visible_range: self.range,
            velocity: self.velocity.velocity(),
            phase: self.velocity.phase(),
            buffer: self.buffer(),
            view_len: self.view_len,
        }
    }

    /// Handle a scroll event.
    pub fn on_scroll(&mut self, offset: f64, container_extent: f64, at: Instant) -> ScrollOutcome {
        let offset = if offset.is_finite() { offset } else { 0.0 };
        self.container_extent = container_extent;
        self.scroll_offset = self.clamp_offset(offset);
        self.velocity.record(self.scroll_offset, at);
        self.refresh()
    }

    /// Handle a container resize.
    pub fn on_resize(&mut self, container_extent: f64, _at: Instant) -> ScrollOutcome {
        self.container_extent = container_extent;
        self.scroll_offset = self.clamp_offset(self.scroll_offset);
        self.refresh()
    }

    /// Change the number of rows in the active view.
    pub fn set_view_len(&mut self, view_len: usize) -> ScrollOutcome {
        self.view_len = view_len;
        self.scroll_offset = self.clamp_offset(self.scroll_offset);
        self.refresh()
    }

    /// Apply the idle transition without a scroll event.
    ///
    /// Going idle drops the velocity buffer, which may shrink the range.
    pub fn tick(&mut self, at: Instant) -> ScrollOutcome {
        if self.velocity.tick(at) {
            self.refresh()
        } else {
            ScrollOutcome {
                range: self.range,
                changed: false,
                near_boundary: self.near_boundary(),
            }
        }
    }

    /// Offset that brings `index` into view with the given alignment.
    ///
    /// `None` when the index is outside the view or the geometry is unusable.
    #[must_use]
    pub fn offset_for_index(&self, index: usize, alignment: Alignment) -> Option<f64> {
        if index >= self.view_len || !self.geometry_valid() {
            return None;
        }
        let item = self.settings.item_extent;
        let container = self.container_extent;
        let top = index as f64 * item;
        let bottom = top + item;

        let target = match alignment {
            Alignment::Start => top,
            Alignment::End => bottom - container,
            Alignment::Center => top - (container - item) / 2.0,
            Alignment::Auto => {
                if top < self.scroll_offset {
                    top
                } else if bottom > self.scroll_offset + container {
                    bottom - container
                } else {
                    self.scroll_offset
                }
            }
        };
        Some(self.clamp_offset(target))
    }

    /// Forget scroll position and velocity, keeping settings.
    pub fn reset(&mut self) {
        self.view_len = 0;
        self.scroll_offset = 0.0;
        self.range = VisibleRange::EMPTY;
        self.velocity.reset();
    }

    fn geometry_valid(&self) -> bool {
        let item = self.settings.item_extent;
        let container = self.container_extent;
        item.is_finite() && item > 0.0 && container.is_finite() && container > 0.0
    }

    fn clamp_offset(&self, offset: f64) -> f64 {
        if !self.geometry_valid() {
            return offset.max(0.0);
        }
        let max_offset = (self.total_extent() - self.container_extent).max(0.0);
        offset.clamp(0.0, max_offset)
    }

    fn compute_range(&self) -> VisibleRange {
        if self.view_len == 0 || !self.geometry_valid() {
            return VisibleRange::EMPTY;
        }
        let item = self.settings.item_extent;
        let pad = self.buffer() + self.settings.overscan;

        let first = (self.scroll_offset / item).floor() as usize;
        let last = ((self.scroll_offset + self.container_extent) / item).ceil() as usize;

        let start = first.saturating_sub(pad).min(self.view_len);
        let end = last.saturating_add(pad).min(self.view_len);
        VisibleRange::new(start, end)
    }

    fn near_boundary(&self) -> bool {
        let total = self.total_extent();
        if self.view_len == 0 || !self.geometry_valid() || total <= 0.0 {
            return false;
        }
        (self.scroll_offset + self.container_extent) / total > self.settings.load_threshold
    }

    fn refresh(&mut self) -> ScrollOutcome {
        let range = self.compute_range();
        let changed = range != self.range;
        self.range = range;
        if changed {
            tracing::trace!(start = range.start, end = range.end, "Visible range changed");
        }
        ScrollOutcome {
            range,
            changed,
            near_boundary: self.near_boundary(),
        }
    }
}
