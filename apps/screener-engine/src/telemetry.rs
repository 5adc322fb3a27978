//! Tracing Setup
//!
//! Installs a `tracing-subscriber` fmt subscriber for hosts that do not
//! bring their own. `RUST_LOG` overrides the configured level.
//!
//! # Usage
//!
//! ```rust,ignore
//! use screener_engine::config::LoggingConfig;
//! use screener_engine::telemetry::init_telemetry;
//!
//! let _guard = init_telemetry(&LoggingConfig::default());
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use crate::config::LoggingConfig;

/// Returned by [`init_telemetry`]; records whether this call installed the
/// global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryGuard {
    installed: bool,
}

impl TelemetryGuard {
    /// Whether this call installed the subscriber (false if one existed).
    #[must_use]
    pub const fn installed(&self) -> bool {
        self.installed
    }
}

/// Install the global subscriber.
///
/// Safe to call more than once: later calls leave the existing subscriber
/// in place and return a guard with `installed() == false`.
#[must_use]
pub fn init_telemetry(config: &LoggingConfig) -> TelemetryGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let span_events = if config.include_spans {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let result = if config.format == "pretty" {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_span_events(span_events)
            .pretty()
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_span_events(span_events)
            .json()
            .try_init()
    };

    let installed = result.is_ok();
    if installed {
        tracing::info!(
            level = %config.level,
            format = %config.format,
            "Logging initialized"
        );
    }
    TelemetryGuard { installed }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        let config = LoggingConfig::default();
        let _first = init_telemetry(&config);
        let second = init_telemetry(&config);
        assert!(!second.installed());
    }
}
