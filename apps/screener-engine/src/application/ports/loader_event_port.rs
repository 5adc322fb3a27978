//! Loader Event Port (Driven Port)
//!
//! Notifications the batch loader emits as pages arrive. Emission is
//! synchronous and must not block; sinks hand events off and return.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::domain::catalog::Record;
use crate::error::LoadError;

/// Loader notification.
#[derive(Debug, Clone, PartialEq)]
pub enum LoaderEvent {
    /// Records loaded so far against the reported total.
    Progress {
        /// Records in the store.
        loaded: usize,
        /// Server-reported total, if known.
        total: Option<usize>,
    },
    /// A page was appended.
    BatchLoaded {
        /// Page number.
        page: usize,
        /// Records of that page.
        records: Arc<[Record]>,
    },
    /// The last page was appended.
    Complete {
        /// Every loaded record.
        records: Arc<[Record]>,
    },
    /// A load failed terminally.
    Error {
        /// What went wrong.
        error: LoadError,
    },
}

impl LoaderEvent {
    /// Short name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Progress { .. } => "progress",
            Self::BatchLoaded { .. } => "batch_loaded",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }
}

/// Port for receiving loader notifications.
pub trait LoaderEventSink: Send + Sync + fmt::Debug {
    /// Deliver one event.
    fn emit(&self, event: LoaderEvent);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl LoaderEventSink for NoOpEventSink {
    fn emit(&self, _event: LoaderEvent) {}
}

/// Sink that forwards events onto an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<LoaderEvent>,
}

impl ChannelEventSink {
    /// Create a sink and the receiver its events arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LoaderEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl LoaderEventSink for ChannelEventSink {
    fn emit(&self, event: LoaderEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Loader event receiver dropped");
        }
    }
}

type ProgressFn = dyn Fn(usize, Option<usize>) + Send + Sync;
type RecordsFn = dyn Fn(&[Record]) + Send + Sync;
type ErrorFn = dyn Fn(&LoadError) + Send + Sync;

/// Sink that invokes registered closures, one per event kind.
#[derive(Default)]
pub struct CallbackSink {
    progress: Option<Box<ProgressFn>>,
    batch_loaded: Option<Box<RecordsFn>>,
    complete: Option<Box<RecordsFn>>,
    error: Option<Box<ErrorFn>>,
}

impl CallbackSink {
    /// Create a sink with no callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with `(loaded, total)` after each page.
    #[must_use]
    pub fn on_progress(mut self, f: impl Fn(usize, Option<usize>) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    /// Called with the records of each page.
    #[must_use]
    pub fn on_batch_loaded(mut self, f: impl Fn(&[Record]) + Send + Sync + 'static) -> Self {
        self.batch_loaded = Some(Box::new(f));
        self
    }

    /// Called with every record once the last page lands.
    #[must_use]
    pub fn on_complete(mut self, f: impl Fn(&[Record]) + Send + Sync + 'static) -> Self {
        self.complete = Some(Box::new(f));
        self
    }

    /// Called on terminal failure.
    #[must_use]
    pub fn on_error(mut self, f: impl Fn(&LoadError) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for CallbackSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSink")
            .field("progress", &self.progress.is_some())
            .field("batch_loaded", &self.batch_loaded.is_some())
            .field("complete", &self.complete.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

impl LoaderEventSink for CallbackSink {
    fn emit(&self, event: LoaderEvent) {
        match event {
            LoaderEvent::Progress { loaded, total } => {
                if let Some(f) = &self.progress {
                    f(loaded, total);
                }
            }
            LoaderEvent::BatchLoaded { records, .. } => {
                if let Some(f) = &self.batch_loaded {
                    f(&records[..]);
                }
            }
            LoaderEvent::Complete { records } => {
                if let Some(f) = &self.complete {
                    f(&records[..]);
                }
            }
            LoaderEvent::Error { error } => {
                if let Some(f) = &self.error {
                    f(&error);
                }
            }
        }
    }
}

/// Sink that fans each event out to several sinks.
#[derive(Debug, Clone, Default)]
pub struct CompositeEventSink {
    sinks: Vec<Arc<dyn LoaderEventSink>>,
}

impl CompositeEventSink {
    /// Create an empty composite.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    #[must_use]
    pub fn with(mut self, sink: Arc<dyn LoaderEventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl LoaderEventSink for CompositeEventSink {
    fn emit(&self, event: LoaderEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}
