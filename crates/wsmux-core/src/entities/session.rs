//! Session entity types - kind, lifecycle state, and listing snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

use crate::value_objects::{Endpoint, SessionId};

/// Which registry list a session lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Outbound dial to a remote endpoint
    Client,
    /// Local listener accepting one inbound peer at a time
    Server,
}

impl SessionKind {
    /// Lowercase name used in console output
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Server => "server",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session lifecycle state
///
/// `Idle → Connecting → Open → Closing → Closed`, with `Failed` reachable
/// from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
    Failed,
}

impl SessionState {
    /// `Closed` and `Failed` admit no further transitions
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// Sending and receiving are only allowed while open
    pub const fn permits_io(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Whether a disconnect request is meaningful in this state
    pub const fn permits_disconnect(self) -> bool {
        matches!(self, Self::Open | Self::Connecting)
    }

    /// Check whether moving to `next` is a legal transition
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Idle, Self::Connecting)
            | (Self::Connecting, Self::Open)
            | (Self::Connecting | Self::Open, Self::Closing)
            | (Self::Closing, Self::Closed) => true,
            // A peer can vanish without a closing handshake
            (Self::Open, Self::Closed) => true,
            (from, Self::Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Short name used in listings
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::Open => "Open",
            Self::Closing => "Closing",
            Self::Closed => "Closed",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable reference to a session, handed to pump tasks at spawn time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionRef {
    pub kind: SessionKind,
    pub id: SessionId,
}

impl SessionRef {
    pub const fn new(kind: SessionKind, id: SessionId) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for SessionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// Read-only snapshot of one registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Current positional index within its list
    pub index: usize,
    pub id: SessionId,
    pub kind: SessionKind,
    pub endpoint: Endpoint,
    pub secure: bool,
    pub state: SessionState,
    /// Bound address for servers once listening
    pub local_addr: Option<SocketAddr>,
    /// Attached peer for servers
    pub peer_addr: Option<SocketAddr>,
    /// Whether the session's supervised task is still running
    pub task_alive: bool,
    pub created_at: DateTime<Utc>,
}

impl SessionInfo {
    /// Session reference for routing comparisons
    pub const fn session_ref(&self) -> SessionRef {
        SessionRef::new(self.kind, self.id)
    }
}

impl fmt::Display for SessionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} secure={} state={}",
            self.index, self.endpoint, self.secure, self.state
        )?;
        if let Some(local) = self.local_addr {
            write!(f, " bound={local}")?;
        }
        if let Some(peer) = self.peer_addr {
            write!(f, " peer={peer}")?;
        }
        if !self.task_alive && !self.state.is_terminal() {
            f.write_str(" (task stopped)")?;
        }
        Ok(())
    }
}
