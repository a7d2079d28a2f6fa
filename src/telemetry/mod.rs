//! Tracing subscriber setup
//!
//! Combines an `EnvFilter` (RUST_LOG, falling back to the configured level) with a
//! fmt layer writing either JSON or human-readable lines.
//!
//! ```text
//! Registry
//!   ├── EnvFilter (RUST_LOG or logging.level)
//!   └── Fmt Layer (json | pretty)
//! ```

use crate::config::LoggingConfig;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Subscriber initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("Failed to set global subscriber (may already be initialized): {0}")]
    AlreadyInitialized(String),
}

/// Build the filter: RUST_LOG wins, then the configured level
pub fn env_filter(default_level: &str) -> Result<EnvFilter, TelemetryError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_level)
            .map_err(|e| TelemetryError::InvalidFilter(e.to_string())),
    }
}

/// Install the global subscriber
pub fn init_subscriber(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let env_filter = env_filter(&config.level)?;

    let result = if config.format == "pretty" {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_line_number(true);

        tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(env_filter).with(fmt_layer),
        )
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_current_span(true);

        tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(env_filter).with(fmt_layer),
        )
    };

    result.map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))
}
