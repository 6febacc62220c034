//! Application error types
//!
//! Errors that reach the binary boundary and decide the exit status.

use wsmux_core::MuxError;

use crate::config::ConfigError;
use crate::telemetry::TracingError;

/// Application-wide error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Startup errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Tracing setup error: {0}")]
    Tracing(#[from] TracingError),

    #[error("TLS setup error: {0}")]
    Tls(String),

    // Session errors
    #[error(transparent)]
    Mux(#[from] MuxError),

    // Console errors
    #[error("Failed to read operator input: {0}")]
    Input(#[source] std::io::Error),
}

impl AppError {
    /// Process exit status for this error
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Tracing(_) | Self::Tls(_) | Self::Input(_) => 1,
            Self::Mux(_) => 2,
        }
    }

    /// Get error code for log fields
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Tracing(_) => "TRACING_ERROR",
            Self::Tls(_) => "TLS_ERROR",
            Self::Mux(e) => e.code(),
            Self::Input(_) => "INPUT_ERROR",
        }
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let err = AppError::Config(ConfigError::Parse("bad".to_string()));
        assert_eq!(err.exit_code(), 1);

        let err = AppError::Input(std::io::Error::other("closed"));
        assert_eq!(err.exit_code(), 1);

        let err = AppError::Mux(MuxError::NoFocus);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::Mux(MuxError::NoPeer).error_code(), "NO_PEER");
        assert_eq!(AppError::Tls("no key".into()).error_code(), "TLS_ERROR");
    }

    #[test]
    fn test_mux_errors_are_transparent() {
        let err = AppError::from(MuxError::NoFocus);
        assert_eq!(err.to_string(), "No session is focused");
    }
}
