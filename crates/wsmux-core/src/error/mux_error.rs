//! Multiplexer errors - the error taxonomy shared by every session operation

use thiserror::Error;

use crate::entities::{SessionKind, SessionState};

/// Errors raised by sessions, the registry, and the focus router
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MuxError {
    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("No {kind} session at index {index} ({len} available)")]
    IndexOutOfRange {
        kind: SessionKind,
        index: usize,
        len: usize,
    },

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    #[error("Failed to connect to {endpoint}: {reason}")]
    ConnectFailed { endpoint: String, reason: String },

    #[error("Failed to bind {endpoint}: {reason}")]
    BindFailed { endpoint: String, reason: String },

    #[error("Session is not open (state: {0})")]
    NotOpen(SessionState),

    #[error("No peer is attached to this server session")]
    NoPeer,

    #[error("No session is focused")]
    NoFocus,

    // =========================================================================
    // Transport Errors
    // =========================================================================
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Transport closed: {0}")]
    TransportFatal(String),
}

impl MuxError {
    /// Get an error code string for logs and console output
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidEndpoint(_) => "INVALID_ENDPOINT",
            Self::IndexOutOfRange { .. } => "INDEX_OUT_OF_RANGE",
            Self::ConnectFailed { .. } => "CONNECT_FAILED",
            Self::BindFailed { .. } => "BIND_FAILED",
            Self::NotOpen(_) => "NOT_OPEN",
            Self::NoPeer => "NO_PEER",
            Self::NoFocus => "NO_FOCUS",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::TransportFatal(_) => "TRANSPORT_FATAL",
        }
    }

    /// Validation errors are reported synchronously and never retried
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidEndpoint(_) | Self::IndexOutOfRange { .. })
    }

    /// Errors the receive pump retries after a backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Errors that end a receive pump for good
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::TransportFatal(_) | Self::NotOpen(_) | Self::NoPeer)
    }

    /// Create an index error
    pub fn out_of_range(kind: SessionKind, index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { kind, index, len }
    }

    /// Create a transient transport error from any displayable error
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    /// Create a fatal transport error from any displayable error
    pub fn fatal(err: impl std::fmt::Display) -> Self {
        Self::TransportFatal(err.to_string())
    }
}

/// Result type for multiplexer operations
pub type MuxResult<T> = Result<T, MuxError>;
