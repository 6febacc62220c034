//! Sessions
//!
//! Client and server sessions, the single-peer slot, and TLS loading.

mod client;
mod peer;
mod server;
mod tls;

pub use client::ClientSession;
pub use peer::{PeerConnection, PeerLease, PeerSlot, SlotReservation};
pub use server::ServerSession;
pub use tls::{load_acceptor, TlsSetupError};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use wsmux_core::{
    Endpoint, MuxResult, SessionId, SessionInfo, SessionKind, SessionRef, SessionState,
    SessionTransport,
};

/// A registered session of either kind
#[derive(Clone)]
pub enum Session {
    Client(Arc<ClientSession>),
    Server(Arc<ServerSession>),
}

impl Session {
    pub fn kind(&self) -> SessionKind {
        match self {
            Self::Client(_) => SessionKind::Client,
            Self::Server(_) => SessionKind::Server,
        }
    }

    pub fn id(&self) -> SessionId {
        match self {
            Self::Client(client) => client.id(),
            Self::Server(server) => server.id(),
        }
    }

    pub fn session_ref(&self) -> SessionRef {
        SessionRef::new(self.kind(), self.id())
    }

    pub fn endpoint(&self) -> &Endpoint {
        match self {
            Self::Client(client) => client.endpoint(),
            Self::Server(server) => server.endpoint(),
        }
    }

    pub fn state(&self) -> SessionState {
        match self {
            Self::Client(client) => client.state(),
            Self::Server(server) => server.state(),
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Client(client) => client.created_at(),
            Self::Server(server) => server.created_at(),
        }
    }

    /// Send one text frame to the remote side (or the attached peer)
    pub async fn send(&self, text: &str) -> MuxResult<()> {
        match self {
            Self::Client(client) => client.send(text).await,
            Self::Server(server) => server.send(text).await,
        }
    }

    /// Wait for one text frame; `None` once the stream is closed
    pub async fn receive(&self) -> MuxResult<Option<String>> {
        match self {
            Self::Client(client) => client.receive().await,
            Self::Server(server) => server.receive().await,
        }
    }

    /// Close with normal closure
    ///
    /// For a server this closes the attached peer only.
    pub async fn disconnect(&self) -> MuxResult<()> {
        match self {
            Self::Client(client) => client.disconnect().await,
            Self::Server(server) => server.disconnect().await,
        }
    }

    /// Final close used when the session leaves the registry
    pub(crate) async fn shutdown(&self, timeout: Duration) -> MuxResult<()> {
        match self {
            Self::Client(client) => {
                if client.state().permits_disconnect() {
                    client.disconnect().await
                } else {
                    Ok(())
                }
            }
            Self::Server(server) => server.shutdown(timeout).await,
        }
    }

    /// Listing snapshot at `index`
    pub fn info(&self, index: usize, task_alive: bool) -> SessionInfo {
        let endpoint = self.endpoint().clone();
        let (local_addr, peer_addr) = match self {
            Self::Client(_) => (None, None),
            Self::Server(server) => (server.local_addr(), server.peer_addr()),
        };
        SessionInfo {
            index,
            id: self.id(),
            kind: self.kind(),
            secure: endpoint.is_secure(),
            endpoint,
            state: self.state(),
            local_addr,
            peer_addr,
            task_alive,
            created_at: self.created_at(),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("ref", &self.session_ref())
            .field("endpoint", self.endpoint())
            .field("state", &self.state())
            .finish()
    }
}
