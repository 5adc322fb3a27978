//! Configuration for the screener engine.
//!
//! YAML configuration with `${VAR}` / `${VAR:-default}` environment
//! interpolation. Every field has a default, so an empty document is a
//! valid configuration.
//!
//! # Usage
//!
//! ```rust,ignore
//! use screener_engine::config::{EngineConfig, load_config};
//!
//! let config = load_config(Some("screener.yaml"))?;
//! println!("page size: {}", config.source.page_size);
//! ```

mod cache;
mod observability;
mod processing;
mod source;
mod viewport;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use cache::CacheConfig;
pub use observability::{LoggingConfig, ObservabilityConfig};
pub use processing::ProcessingConfig;
pub use source::{RetrySettings, SourceConfig};
pub use viewport::ViewportConfig;

use crate::domain::index::TierTable;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Remote source.
    #[serde(default)]
    pub source: SourceConfig,
    /// Viewport geometry and buffering.
    #[serde(default)]
    pub viewport: ViewportConfig,
    /// Snapshot and query caches.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Tier thresholds for the secondary indices.
    #[serde(default)]
    pub index: TierTable,
    /// Post-processing.
    #[serde(default)]
    pub processing: ProcessingConfig,
    /// Logging.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to "screener.yaml".
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<EngineConfig, ConfigError> {
    let path = path.unwrap_or("screener.yaml");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string.
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<EngineConfig, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: EngineConfig = if interpolated.trim().is_empty() {
        EngineConfig::default()
    } else {
        serde_yaml_bw::from_str(&interpolated)?
    };
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is a constant; it always compiles
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let default_value = cap.get(2).map(|m| m.as_str());
        match cap.get(1).map(|m| std::env::var(m.as_str())) {
            Some(Ok(v)) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        }
    })
    .into_owned()
}

/// Validate configuration values.
pub fn validate_config(config: &EngineConfig) -> Result<(), ConfigError> {
    let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

    if config.source.base_url.trim().is_empty() {
        return invalid("source.base_url must not be empty");
    }
    if config.source.page_size == 0 {
        return invalid("source.page_size must be positive");
    }
    if config.source.retry.max_delay_ms < config.source.retry.base_delay_ms {
        return invalid("source.retry.max_delay_ms must be >= base_delay_ms");
    }
    if !(0.0..=1.0).contains(&config.source.retry.jitter_factor) {
        return invalid("source.retry.jitter_factor must be between 0.0 and 1.0");
    }

    let viewport = &config.viewport;
    if !viewport.item_extent.is_finite() || viewport.item_extent <= 0.0 {
        return invalid("viewport.item_extent must be a positive number");
    }
    if viewport.max_buffer < viewport.base_buffer {
        return invalid("viewport.max_buffer must be >= base_buffer");
    }
    if !viewport.velocity_factor.is_finite() || viewport.velocity_factor < 0.0 {
        return invalid("viewport.velocity_factor must be non-negative");
    }
    if !(viewport.load_threshold > 0.0 && viewport.load_threshold <= 1.0) {
        return invalid("viewport.load_threshold must be in (0.0, 1.0]");
    }

    if config.cache.version.trim().is_empty() {
        return invalid("cache.version must not be empty");
    }
    if config.cache.query_capacity == 0 {
        return invalid("cache.query_capacity must be positive");
    }
    if config.cache.query_ttl_secs > config.cache.snapshot_ttl_secs {
        return invalid("cache.query_ttl_secs must not exceed snapshot_ttl_secs");
    }

    config
        .index
        .validate()
        .map_err(|e| ConfigError::ValidationError(format!("index: {e}")))?;

    let valid_formats = ["json", "pretty"];
    if !valid_formats.contains(&config.observability.logging.format.as_str()) {
        return Err(ConfigError::ValidationError(format!(
            "observability.logging.format must be one of: {valid_formats:?}"
        )));
    }

    Ok(())
}
