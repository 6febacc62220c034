//! Server session
//!
//! A local listener that admits one WebSocket peer at a time. While a peer is
//! attached, every further upgrade request and every plain HTTP request is
//! answered with `500 Internal Server Error`.

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocket},
        State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Router,
};
use chrono::{DateTime, Utc};
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use wsmux_core::{
    Endpoint, MuxError, MuxResult, SessionEvent, SessionEventKind, SessionId, SessionKind,
    SessionRef, SessionState, SessionTransport, TaskOutcome,
};

use super::peer::{PeerConnection, PeerSlot, SlotReservation};
use crate::pump::PumpLauncher;
use crate::supervisor::{spawn_supervised, TaskHandle};

/// Pause after a failed accept before trying again
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// A listening session with a single-peer slot
pub struct ServerSession {
    id: SessionId,
    endpoint: Endpoint,
    state: RwLock<SessionState>,
    local_addr: RwLock<Option<SocketAddr>>,
    slot: Arc<PeerSlot>,
    peer_task: Mutex<Option<TaskHandle>>,
    shutdown: CancellationToken,
    created_at: DateTime<Utc>,
}

impl ServerSession {
    pub fn new(id: SessionId, endpoint: Endpoint) -> Arc<Self> {
        Arc::new(Self {
            id,
            endpoint,
            state: RwLock::new(SessionState::Idle),
            local_addr: RwLock::new(None),
            slot: Arc::new(PeerSlot::new()),
            peer_task: Mutex::new(None),
            shutdown: CancellationToken::new(),
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn session_ref(&self) -> SessionRef {
        SessionRef::new(SessionKind::Server, self.id)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Address actually bound, which differs from the endpoint for port 0
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read()
    }

    /// Remote address of the attached peer
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.slot.current().map(|peer| peer.remote_addr())
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Token that stops the accept loop and every peer pump
    pub fn cancel_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn transition(&self, next: SessionState) {
        let mut state = self.state.write();
        if state.can_transition_to(next) {
            *state = next;
        }
    }

    fn bind_failed(&self, reason: impl std::fmt::Display) -> MuxError {
        MuxError::BindFailed {
            endpoint: self.endpoint.listen_url(),
            reason: reason.to_string(),
        }
    }

    /// Bind the listening socket
    ///
    /// A secure endpoint needs an acceptor built from the configured
    /// certificate and key.
    pub async fn listen(&self, tls: Option<&TlsAcceptor>) -> MuxResult<TcpListener> {
        if self.endpoint.is_secure() && tls.is_none() {
            self.transition(SessionState::Failed);
            return Err(self.bind_failed("secure listening requires tls.certPath and tls.keyPath"));
        }
        self.transition(SessionState::Connecting);

        let addr = format!("{}:{}", self.endpoint.host(), self.endpoint.port());
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.transition(SessionState::Failed);
                return Err(self.bind_failed(e));
            }
        };
        let local = listener.local_addr().map_err(|e| self.bind_failed(e))?;
        *self.local_addr.write() = Some(local);
        self.transition(SessionState::Open);

        tracing::info!(
            session_id = %self.id, kind = %SessionKind::Server,
            endpoint = %self.endpoint,
            url = %self.endpoint.listen_url(),
            bound = %local,
            "Server session listening"
        );
        Ok(listener)
    }

    /// Run the accept loop under supervision
    pub fn spawn_accept_loop(
        self: &Arc<Self>,
        listener: TcpListener,
        tls: Option<TlsAcceptor>,
        launcher: PumpLauncher,
    ) -> TaskHandle {
        let events = launcher.events().clone();
        let server = Arc::clone(self);
        spawn_supervised(
            "accept",
            self.session_ref(),
            self.cancel_token(),
            events,
            server.accept_loop(listener, tls, launcher),
        )
    }

    async fn accept_loop(
        self: Arc<Self>,
        listener: TcpListener,
        tls: Option<TlsAcceptor>,
        launcher: PumpLauncher,
    ) -> TaskOutcome {
        loop {
            let accepted = tokio::select! {
                () = self.shutdown.cancelled() => return TaskOutcome::Cancelled,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, remote)) => {
                    tracing::debug!(session_id = %self.id, kind = %SessionKind::Server, peer = %remote, "Connection accepted");
                    let app = upgrade_router(UpgradeState {
                        server: Arc::clone(&self),
                        remote,
                        launcher: launcher.clone(),
                    });
                    tokio::spawn(serve_connection(
                        stream,
                        remote,
                        tls.clone(),
                        app,
                        self.shutdown.clone(),
                    ));
                }
                Err(e) => {
                    tracing::warn!(session_id = %self.id, kind = %SessionKind::Server, error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }
    }

    /// Occupy the slot with an upgraded socket and start its receive pump
    fn attach_peer(
        &self,
        socket: WebSocket,
        remote: SocketAddr,
        reservation: SlotReservation,
        launcher: &PumpLauncher,
    ) {
        let session = self.session_ref();
        if self.shutdown.is_cancelled() {
            tracing::debug!(session_id = %session.id, kind = %session.kind, peer = %remote, "Upgrade finished after shutdown, dropping peer");
            return;
        }

        // Not a child of the listener token: the peer must outlive the accept
        // loop long enough to receive its close frame
        let peer = PeerConnection::new(socket, remote, CancellationToken::new());
        let lease = reservation.commit(Arc::clone(&peer), session, launcher.events().clone());

        tracing::info!(session_id = %session.id, kind = %session.kind, peer = %remote, "Peer attached");
        let event = SessionEvent::new(session, SessionEventKind::PeerAttached(remote));
        if launcher.events().try_send(event).is_err() {
            tracing::debug!(session_id = %session.id, kind = %session.kind, "Event inbox full, attach not reported");
        }

        // The pump owns the lease, so the slot frees whenever the pump stops
        let cancel = peer.cancel_token();
        let handle = launcher.launch_holding(session, peer, cancel, lease);
        *self.peer_task.lock() = Some(handle);
    }

    fn current_peer(&self) -> MuxResult<Arc<PeerConnection>> {
        let state = self.state();
        if !state.permits_io() {
            return Err(MuxError::NotOpen(state));
        }
        self.slot.current().ok_or(MuxError::NoPeer)
    }

    pub async fn send(&self, text: &str) -> MuxResult<()> {
        self.current_peer()?.send(text).await
    }

    pub async fn receive(&self) -> MuxResult<Option<String>> {
        self.current_peer()?.receive().await
    }

    /// Close the attached peer, if any; the listener keeps accepting
    pub async fn disconnect(&self) -> MuxResult<()> {
        match self.slot.current() {
            Some(peer) => peer.disconnect().await,
            None => Ok(()),
        }
    }

    /// Stop listening for good, closing any attached peer first
    pub async fn shutdown(&self, timeout: Duration) -> MuxResult<()> {
        self.transition(SessionState::Closing);

        let closed = match self.slot.current() {
            Some(peer) => peer.disconnect().await,
            None => Ok(()),
        };
        self.shutdown.cancel();

        let peer_task = self.peer_task.lock().take();
        if let Some(task) = peer_task {
            if let Err(e) = task.shutdown(timeout).await {
                tracing::warn!(session_id = %self.id, kind = %SessionKind::Server, error = %e, "Peer pump did not stop in time");
            }
        }

        self.transition(SessionState::Closed);
        tracing::info!(session_id = %self.id, kind = %SessionKind::Server, "Server session closed");
        closed
    }
}

#[derive(Clone)]
struct UpgradeState {
    server: Arc<ServerSession>,
    remote: SocketAddr,
    launcher: PumpLauncher,
}

fn upgrade_router(state: UpgradeState) -> Router {
    Router::new()
        .fallback(upgrade_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Accept a WebSocket upgrade on any path when the slot is free
async fn upgrade_handler(
    State(state): State<UpgradeState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let session = state.server.session_ref();

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::debug!(session_id = %session.id, kind = %session.kind, peer = %state.remote, reason = %rejection, "Rejecting non-WebSocket request");
            return (StatusCode::INTERNAL_SERVER_ERROR, "WebSocket upgrade required").into_response();
        }
    };

    let Some(reservation) = state.server.slot.try_reserve() else {
        tracing::info!(session_id = %session.id, kind = %session.kind, peer = %state.remote, "Rejecting peer, slot occupied");
        return (StatusCode::INTERNAL_SERVER_ERROR, "A peer is already connected").into_response();
    };

    ws.on_upgrade(move |socket| async move {
        state
            .server
            .attach_peer(socket, state.remote, reservation, &state.launcher);
    })
}

/// Serve one TCP connection, with upgrades, until it ends or the server stops
async fn serve_connection(
    stream: TcpStream,
    remote: SocketAddr,
    tls: Option<TlsAcceptor>,
    app: Router,
    shutdown: CancellationToken,
) {
    let service = TowerToHyperService::new(app);

    let served = match tls {
        Some(acceptor) => {
            let stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::debug!(remote = %remote, error = %e, "TLS handshake failed");
                    return;
                }
            };
            let conn = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .with_upgrades();
            tokio::select! {
                () = shutdown.cancelled() => return,
                served = conn => served,
            }
        }
        None => {
            let conn = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .with_upgrades();
            tokio::select! {
                () = shutdown.cancelled() => return,
                served = conn => served,
            }
        }
    };

    if let Err(e) = served {
        tracing::debug!(remote = %remote, error = %e, "Connection ended with error");
    }
}
