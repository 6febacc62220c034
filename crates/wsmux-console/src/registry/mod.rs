//! Session registry
//!
//! Two ordered lists, clients and servers, addressed by positional index.
//! Removing an entry shifts every later index down by one; the stable
//! `SessionId` inside each entry is what background tasks hold on to.
//!
//! Mutations (add, remove) are serialized by one async lock. Lookups and
//! listings only take the short read lock on the lists, so they never block
//! behind a slow connect or a pending cancellation.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use wsmux_core::{
    Endpoint, MuxError, MuxResult, SessionIdGenerator, SessionInfo, SessionKind, SessionRef,
};

use crate::pump::PumpLauncher;
use crate::session::{ClientSession, ServerSession, Session};
use crate::supervisor::TaskHandle;

#[derive(Clone)]
struct Entry {
    session: Session,
    task: Arc<TaskHandle>,
}

impl Entry {
    fn info(&self, index: usize) -> SessionInfo {
        self.session.info(index, !self.task.is_finished())
    }
}

/// Owner of every live session
pub struct SessionRegistry {
    clients: RwLock<Vec<Entry>>,
    servers: RwLock<Vec<Entry>>,
    mutations: Mutex<()>,
    ids: SessionIdGenerator,
    launcher: PumpLauncher,
    tls: Option<TlsAcceptor>,
}

impl SessionRegistry {
    /// Create an empty registry
    ///
    /// `tls` is required for secure server sessions.
    pub fn new(launcher: PumpLauncher, tls: Option<TlsAcceptor>) -> Self {
        Self {
            clients: RwLock::new(Vec::new()),
            servers: RwLock::new(Vec::new()),
            mutations: Mutex::new(()),
            ids: SessionIdGenerator::new(),
            launcher,
            tls,
        }
    }

    fn list_lock(&self, kind: SessionKind) -> &RwLock<Vec<Entry>> {
        match kind {
            SessionKind::Client => &self.clients,
            SessionKind::Server => &self.servers,
        }
    }

    fn entry(&self, kind: SessionKind, index: usize) -> MuxResult<Entry> {
        let list = self.list_lock(kind).read();
        list.get(index)
            .cloned()
            .ok_or_else(|| MuxError::out_of_range(kind, index, list.len()))
    }

    /// Dial a remote server and register it at the end of the client list
    ///
    /// Nothing is registered unless the connection opens.
    pub async fn add_client(&self, endpoint: Endpoint) -> MuxResult<usize> {
        endpoint.validate_ipv4()?;

        let client = ClientSession::new(self.ids.generate(), endpoint);
        client.connect().await?;

        let _guard = self.mutations.lock().await;
        let session = client.session_ref();
        let task = self
            .launcher
            .launch(session, Arc::clone(&client) as _, CancellationToken::new());

        let mut clients = self.clients.write();
        clients.push(Entry {
            session: Session::Client(client),
            task: Arc::new(task),
        });
        let index = clients.len() - 1;
        tracing::info!(session_id = %session.id, kind = %session.kind, index, "Client session added");
        Ok(index)
    }

    /// Start listening and register at the end of the server list
    pub async fn add_server(&self, endpoint: Endpoint) -> MuxResult<usize> {
        let server = ServerSession::new(self.ids.generate(), endpoint);
        let listener = server.listen(self.tls.as_ref()).await?;
        let tls = if server.endpoint().is_secure() {
            self.tls.clone()
        } else {
            None
        };

        let _guard = self.mutations.lock().await;
        let session = server.session_ref();
        let task = server.spawn_accept_loop(listener, tls, self.launcher.clone());

        let mut servers = self.servers.write();
        servers.push(Entry {
            session: Session::Server(server),
            task: Arc::new(task),
        });
        let index = servers.len() - 1;
        tracing::info!(session_id = %session.id, kind = %session.kind, index, "Server session added");
        Ok(index)
    }

    /// Stop a session's task, close its transport, and drop it from the list
    ///
    /// The entry stays visible until both steps are done; a close failure is
    /// logged and does not keep the entry alive.
    pub async fn remove(&self, kind: SessionKind, index: usize) -> MuxResult<SessionInfo> {
        let _guard = self.mutations.lock().await;
        let entry = self.entry(kind, index)?;
        let session = entry.session.session_ref();
        let timeout = self.launcher.config().cancel_timeout;

        if let Err(e) = entry.task.shutdown(timeout).await {
            tracing::warn!(session_id = %session.id, kind = %session.kind, error = %e, "Task did not stop cleanly");
        }
        if let Err(e) = entry.session.shutdown(timeout).await {
            tracing::warn!(session_id = %session.id, kind = %session.kind, error = %e, "Close failed during removal");
        }

        // Index is still valid: every other mutation waits on `mutations`
        let removed = self.list_lock(kind).write().remove(index);
        tracing::info!(session_id = %session.id, kind = %session.kind, index, "Session removed");
        Ok(removed.info(index))
    }

    /// Remove every session, servers first
    pub async fn remove_all(&self) {
        for kind in [SessionKind::Server, SessionKind::Client] {
            while !self.is_empty(kind) {
                if let Err(e) = self.remove(kind, 0).await {
                    tracing::debug!(kind = %kind, error = %e, "Removal during shutdown failed");
                    break;
                }
            }
        }
    }

    /// Snapshot of one list in index order
    pub fn list(&self, kind: SessionKind) -> Vec<SessionInfo> {
        self.list_lock(kind)
            .read()
            .iter()
            .enumerate()
            .map(|(index, entry)| entry.info(index))
            .collect()
    }

    pub fn get(&self, kind: SessionKind, index: usize) -> MuxResult<Session> {
        self.entry(kind, index).map(|entry| entry.session)
    }

    pub fn info(&self, kind: SessionKind, index: usize) -> MuxResult<SessionInfo> {
        self.entry(kind, index).map(|entry| entry.info(index))
    }

    /// Resolve a stable reference to its current index and session
    pub fn find(&self, session: SessionRef) -> Option<(usize, Session)> {
        self.list_lock(session.kind)
            .read()
            .iter()
            .enumerate()
            .find(|(_, entry)| entry.session.id() == session.id)
            .map(|(index, entry)| (index, entry.session.clone()))
    }

    pub fn len(&self, kind: SessionKind) -> usize {
        self.list_lock(kind).read().len()
    }

    pub fn is_empty(&self, kind: SessionKind) -> bool {
        self.len(kind) == 0
    }
}
