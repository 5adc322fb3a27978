//! Scroll velocity tracking.

use std::time::{Duration, Instant};

use serde::Serialize;

use super::debounce::Debouncer;

/// Whether the user is actively scrolling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollPhase {
    /// No movement within the idle period.
    #[default]
    Idle,
    /// Moved recently.
    Scrolling,
}

/// Tracks offset change per millisecond and the scrolling phase.
#[derive(Debug, Clone)]
pub struct VelocityTracker {
    last: Option<(f64, Instant)>,
    velocity: f64,
    phase: ScrollPhase,
    idle: Debouncer<()>,
}

impl VelocityTracker {
    /// Create a tracker that goes idle after `idle_after` without movement.
    #[must_use]
    pub const fn new(idle_after: Duration) -> Self {
        Self {
            last: None,
            velocity: 0.0,
            phase: ScrollPhase::Idle,
            idle: Debouncer::new(idle_after),
        }
    }

    /// Current velocity in extent units per millisecond.
    #[must_use]
    pub const fn velocity(&self) -> f64 {
        self.velocity
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> ScrollPhase {
        self.phase
    }

    /// Feed a new offset observation and return the updated velocity.
    pub fn record(&mut self, offset: f64, at: Instant) -> f64 {
        if let Some((last_offset, last_at)) = self.last {
            let delta = (offset - last_offset).abs();
            let elapsed_ms = at.saturating_duration_since(last_at).as_secs_f64() * 1_000.0;
            if elapsed_ms > 0.0 {
                self.velocity = delta / elapsed_ms;
            }
            if delta > 0.0 {
                self.phase = ScrollPhase::Scrolling;
                self.idle.push((), at);
            }
        }
        if !self.velocity.is_finite() {
            self.velocity = 0.0;
        }
        self.last = Some((offset, at));
        self.velocity
    }

    /// Apply the idle transition if the quiet period has passed.
    ///
    /// Returns true when the tracker moved from scrolling to idle.
    pub fn tick(&mut self, at: Instant) -> bool {
        if self.idle.poll(at).is_some() {
            self.velocity = 0.0;
            self.phase = ScrollPhase::Idle;
            return true;
        }
        false
    }

    /// Forget all observations.
    pub fn reset(&mut self) {
        self.last = None;
        self.velocity = 0.0;
        self.phase = ScrollPhase::Idle;
        self.idle.cancel();
    }
}
