//! Session events - everything background tasks report to the focus router
//!
//! Events are tagged with the `SessionRef` captured at task-spawn time, so a
//! positional index shift never redirects them to another session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

use crate::entities::SessionRef;
use crate::error::MuxError;

/// An event produced by a session's background task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub session: SessionRef,
    pub kind: SessionEventKind,
    pub at: DateTime<Utc>,
}

impl SessionEvent {
    /// Create an event stamped with the current time
    pub fn new(session: SessionRef, kind: SessionEventKind) -> Self {
        Self {
            session,
            kind,
            at: Utc::now(),
        }
    }

    /// One full inbound text frame
    pub fn inbound(session: SessionRef, text: impl Into<String>) -> Self {
        Self::new(session, SessionEventKind::Inbound(text.into()))
    }
}

/// What happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEventKind {
    /// One decoded text frame
    Inbound(String),
    /// A transient receive failure; the pump keeps retrying
    ReceiveFailed(MuxError),
    /// A peer occupied a server session's slot
    PeerAttached(SocketAddr),
    /// The server session's slot became free again
    PeerDetached(SocketAddr),
    /// A supervised task stopped
    TaskEnded { task: String, outcome: TaskOutcome },
}

/// How a supervised task stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The task returned on its own
    Finished(String),
    /// The task was cancelled on request
    Cancelled,
    /// The task panicked
    Panicked(String),
    /// The task was aborted after ignoring cancellation
    Aborted,
}

impl TaskOutcome {
    /// Panics and aborts are abnormal terminations worth a warning
    pub fn is_abnormal(&self) -> bool {
        matches!(self, Self::Panicked(_) | Self::Aborted)
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finished(reason) => write!(f, "finished: {reason}"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Panicked(message) => write!(f, "panicked: {message}"),
            Self::Aborted => f.write_str("aborted"),
        }
    }
}
