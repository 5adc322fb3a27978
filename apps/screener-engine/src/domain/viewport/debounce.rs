//! Debounce primitive
//!
//! Holds the most recent value and releases it once nothing newer has
//! arrived for a quiet period. Time is passed in by the caller, so the
//! same type serves the scroll idle timer and the search box.

use std::time::{Duration, Instant};

/// Trailing-edge debouncer.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    quiet: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    /// Create a debouncer with the given quiet period.
    #[must_use]
    pub const fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: None,
        }
    }

    /// Quiet period.
    #[must_use]
    pub const fn quiet_period(&self) -> Duration {
        self.quiet
    }

    /// Store a value, replacing any pending one and restarting the timer.
    pub fn push(&mut self, value: T, at: Instant) {
        self.pending = Some((value, at));
    }

    /// Take the pending value if the quiet period has elapsed.
    pub fn poll(&mut self, at: Instant) -> Option<T> {
        let ready = self
            .pending
            .as_ref()
            .is_some_and(|(_, since)| at.saturating_duration_since(*since) >= self.quiet);
        if ready {
            self.pending.take().map(|(value, _)| value)
        } else {
            None
        }
    }

    /// When the pending value becomes ready, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, since)| *since + self.quiet)
    }

    /// Whether a value is waiting.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop the pending value.
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }
}
