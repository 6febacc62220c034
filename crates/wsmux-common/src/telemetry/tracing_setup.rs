//! Tracing and logging setup
//!
//! Log lines go to stderr; stdout belongs to the operator console.
//! `RUST_LOG` takes precedence over the configured level.

use std::io;
use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogSettings;

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Compact single-line text
    #[default]
    Compact,
    /// One JSON object per line
    Json,
}

/// Subscriber settings resolved from the `log` config section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    pub level: Level,
    pub format: LogFormat,
    /// Print the emitting module path
    pub with_target: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::Compact,
            with_target: false,
        }
    }
}

impl TracingConfig {
    pub fn from_settings(settings: &LogSettings) -> Result<Self, TracingError> {
        let level = Level::from_str(settings.level.trim())
            .map_err(|_| TracingError::InvalidLevel(settings.level.clone()))?;

        Ok(Self {
            level,
            format: if settings.json {
                LogFormat::Json
            } else {
                LogFormat::Compact
            },
            with_target: level >= Level::DEBUG,
        })
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
    }
}

/// Install the global subscriber
///
/// Fails with `AlreadyInitialized` when a subscriber is already set, which
/// callers may treat as a warning.
pub fn try_init_tracing_with_config(config: TracingConfig) -> Result<(), TracingError> {
    let registry = tracing_subscriber::registry().with(config.filter());

    let result = match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(io::stderr)
                    .with_target(config.with_target)
                    .with_current_span(false),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_writer(io::stderr)
                    .with_target(config.with_target),
            )
            .try_init(),
    };

    result.map_err(|_| TracingError::AlreadyInitialized)
}

/// Tracing initialization errors
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Tracing subscriber already initialized")]
    AlreadyInitialized,

    #[error("Invalid log level: {0}")]
    InvalidLevel(String),
}
