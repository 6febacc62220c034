//! Inbound peer connection and the single-peer slot of a server session

use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use wsmux_core::{
    MuxError, MuxResult, SessionEvent, SessionEventKind, SessionRef, SessionState,
    SessionTransport,
};

/// One accepted WebSocket peer
pub struct PeerConnection {
    id: Uuid,
    remote: SocketAddr,
    state: RwLock<SessionState>,
    sink: Mutex<SplitSink<WebSocket, Message>>,
    stream: Mutex<SplitStream<WebSocket>>,
    cancel: CancellationToken,
}

impl PeerConnection {
    /// Wrap an upgraded socket; the peer starts out open
    pub fn new(socket: WebSocket, remote: SocketAddr, cancel: CancellationToken) -> Arc<Self> {
        let (sink, stream) = socket.split();
        Arc::new(Self {
            id: Uuid::new_v4(),
            remote,
            state: RwLock::new(SessionState::Open),
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            cancel,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// Token that stops this peer's receive pump
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn transition(&self, next: SessionState) {
        let mut state = self.state.write();
        if state.can_transition_to(next) {
            *state = next;
        }
    }
}

#[async_trait]
impl SessionTransport for PeerConnection {
    async fn send(&self, text: &str) -> MuxResult<()> {
        let state = self.state();
        if !state.permits_io() {
            return Err(MuxError::NotOpen(state));
        }

        self.sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| {
                self.transition(SessionState::Failed);
                MuxError::fatal(e)
            })
    }

    async fn receive(&self) -> MuxResult<Option<String>> {
        let state = self.state();
        if !state.permits_io() {
            return Err(MuxError::NotOpen(state));
        }

        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(data))) => {
                    tracing::debug!(peer = %self.remote, len = data.len(), "Ignoring binary frame");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    // Pong is handled automatically by axum
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(peer = %self.remote, frame = ?frame, "Peer closed connection");
                    if let Err(e) = self.sink.lock().await.close().await {
                        tracing::debug!(peer = %self.remote, error = %e, "Close reply not sent");
                    }
                    self.transition(SessionState::Closed);
                    return Ok(None);
                }
                // axum does not say whether the socket survives an error,
                // so the peer is dropped and the slot reopened
                Some(Err(e)) => {
                    self.transition(SessionState::Failed);
                    return Err(MuxError::fatal(e));
                }
                None => {
                    self.transition(SessionState::Closed);
                    return Ok(None);
                }
            }
        }
    }

    async fn disconnect(&self) -> MuxResult<()> {
        let state = self.state();
        if !state.permits_disconnect() {
            return Err(MuxError::NotOpen(state));
        }
        self.transition(SessionState::Closing);

        let frame = CloseFrame {
            code: close_code::NORMAL,
            reason: "".into(),
        };
        let result = self.sink.lock().await.send(Message::Close(Some(frame))).await;

        // The pump may be parked on a peer that never answers the close
        self.cancel.cancel();

        match result {
            Ok(()) => {
                self.transition(SessionState::Closed);
                tracing::info!(peer = %self.remote, "Peer disconnected");
                Ok(())
            }
            Err(e) => {
                self.transition(SessionState::Failed);
                Err(MuxError::fatal(e))
            }
        }
    }

    fn state(&self) -> SessionState {
        *self.state.read()
    }

    fn mark_failed(&self) {
        self.transition(SessionState::Failed);
    }
}

#[derive(Clone, Default)]
enum SlotState {
    #[default]
    Free,
    /// An upgrade is in flight
    Reserved,
    Occupied(Arc<PeerConnection>),
}

impl SlotState {
    fn is_free(&self) -> bool {
        matches!(self, Self::Free)
    }
}

/// At most one peer per server session
///
/// A request reserves the slot before the upgrade completes, so two
/// concurrent handshakes can never both succeed.
pub struct PeerSlot {
    state: watch::Sender<SlotState>,
}

impl Default for PeerSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerSlot {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SlotState::Free);
        Self { state }
    }

    /// Claim the free slot for an upgrade in flight
    pub fn try_reserve(self: &Arc<Self>) -> Option<SlotReservation> {
        let reserved = self.state.send_if_modified(|state| {
            if state.is_free() {
                *state = SlotState::Reserved;
                true
            } else {
                false
            }
        });
        reserved.then(|| SlotReservation {
            slot: Some(Arc::clone(self)),
        })
    }

    /// Currently attached peer, if any
    pub fn current(&self) -> Option<Arc<PeerConnection>> {
        match &*self.state.borrow() {
            SlotState::Occupied(peer) => Some(Arc::clone(peer)),
            _ => None,
        }
    }

    pub fn is_free(&self) -> bool {
        self.state.borrow().is_free()
    }

    fn release_reservation(&self) {
        self.state.send_if_modified(|state| {
            if matches!(state, SlotState::Reserved) {
                *state = SlotState::Free;
                true
            } else {
                false
            }
        });
    }

    fn release_peer(&self, peer_id: Uuid) -> bool {
        self.state.send_if_modified(|state| match state {
            SlotState::Occupied(peer) if peer.id() == peer_id => {
                *state = SlotState::Free;
                true
            }
            _ => false,
        })
    }
}

/// Holds a reserved slot; dropping it before `commit` frees the slot again
pub struct SlotReservation {
    slot: Option<Arc<PeerSlot>>,
}

impl SlotReservation {
    /// Attach the upgraded peer, turning the reservation into a lease
    pub fn commit(
        mut self,
        peer: Arc<PeerConnection>,
        session: SessionRef,
        events: mpsc::Sender<SessionEvent>,
    ) -> PeerLease {
        let slot = self.slot.take();
        if let Some(slot) = &slot {
            slot.state
                .send_modify(|state| *state = SlotState::Occupied(Arc::clone(&peer)));
        }
        PeerLease {
            slot,
            peer,
            session,
            events,
        }
    }
}

impl Drop for SlotReservation {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            tracing::debug!("Upgrade abandoned, releasing peer slot");
            slot.release_reservation();
        }
    }
}

/// Occupancy of the slot for the lifetime of one peer's receive pump
pub struct PeerLease {
    slot: Option<Arc<PeerSlot>>,
    peer: Arc<PeerConnection>,
    session: SessionRef,
    events: mpsc::Sender<SessionEvent>,
}

impl PeerLease {
    pub fn peer(&self) -> &Arc<PeerConnection> {
        &self.peer
    }
}

impl Drop for PeerLease {
    fn drop(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        if slot.release_peer(self.peer.id()) {
            let remote = self.peer.remote_addr();
            tracing::info!(session_id = %self.session.id, kind = %self.session.kind, peer = %remote, "Peer slot released");
            let event = SessionEvent::new(self.session, SessionEventKind::PeerDetached(remote));
            if self.events.try_send(event).is_err() {
                tracing::debug!(session_id = %self.session.id, kind = %self.session.kind, "Event inbox full, detach not reported");
            }
        }
    }
}
