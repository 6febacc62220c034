//! Client session
//!
//! An outbound WebSocket dial to a remote `ws://` or `wss://` endpoint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use wsmux_core::{
    Endpoint, MuxError, MuxResult, SessionId, SessionKind, SessionRef, SessionState,
    SessionTransport,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An outbound WebSocket session
pub struct ClientSession {
    id: SessionId,
    endpoint: Endpoint,
    state: RwLock<SessionState>,
    sink: Mutex<Option<SplitSink<WsStream, Message>>>,
    stream: Mutex<Option<SplitStream<WsStream>>>,
    created_at: DateTime<Utc>,
}

impl ClientSession {
    /// Create an idle session; nothing is dialed until `connect`
    pub fn new(id: SessionId, endpoint: Endpoint) -> Arc<Self> {
        Arc::new(Self {
            id,
            endpoint,
            state: RwLock::new(SessionState::Idle),
            sink: Mutex::new(None),
            stream: Mutex::new(None),
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
        SessionRef::new(SessionKind::Client, self.id)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Dial the endpoint and complete the opening handshake
    pub async fn connect(&self) -> MuxResult<()> {
        if !self.transition(SessionState::Connecting) {
            return Err(MuxError::ConnectFailed {
                endpoint: self.endpoint.to_string(),
                reason: format!("session is already {}", self.state()),
            });
        }

        let url = self.endpoint.client_url();
        tracing::debug!(session_id = %self.id, kind = %SessionKind::Client, endpoint = %self.endpoint, url = %url, "Connecting");

        match connect_async(url.as_str()).await {
            Ok((socket, response)) => {
                let (sink, stream) = socket.split();
                *self.sink.lock().await = Some(sink);
                *self.stream.lock().await = Some(stream);
                self.transition(SessionState::Open);

                tracing::info!(
                    session_id = %self.id, kind = %SessionKind::Client,
                    endpoint = %self.endpoint,
                    status = %response.status(),
                    "Client session open"
                );
                Ok(())
            }
            Err(e) => {
                self.transition(SessionState::Failed);
                tracing::warn!(
                    session_id = %self.id, kind = %SessionKind::Client,
                    endpoint = %self.endpoint,
                    error = %e,
                    "Connect failed"
                );
                Err(MuxError::ConnectFailed {
                    endpoint: self.endpoint.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Apply a state transition, ignoring illegal ones
    fn transition(&self, next: SessionState) -> bool {
        let mut state = self.state.write();
        if state.can_transition_to(next) {
            *state = next;
            true
        } else {
            tracing::trace!(
                session_id = %self.id,
                kind = %SessionKind::Client,
                from = %*state,
                to = %next,
                "Ignoring state transition"
            );
            false
        }
    }

    fn ensure_open(&self) -> MuxResult<()> {
        let state = self.state();
        if state.permits_io() {
            Ok(())
        } else {
            Err(MuxError::NotOpen(state))
        }
    }

    /// Finish a close the peer started
    async fn complete_close(&self) {
        if let Some(sink) = self.sink.lock().await.as_mut() {
            // Flushes the queued close reply
            if let Err(e) = sink.close().await {
                tracing::debug!(session_id = %self.id, kind = %SessionKind::Client, error = %e, "Close reply not sent");
            }
        }
        self.transition(SessionState::Closing);
        self.transition(SessionState::Closed);
    }

    /// Map a socket failure, marking the session failed when it is unusable
    fn classify(&self, err: WsError) -> MuxError {
        let fatal = matches!(
            err,
            WsError::ConnectionClosed
                | WsError::AlreadyClosed
                | WsError::Io(_)
                | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake)
        );
        if fatal {
            self.transition(SessionState::Failed);
            MuxError::fatal(err)
        } else {
            MuxError::transport(err)
        }
    }
}

#[async_trait]
impl SessionTransport for ClientSession {
    async fn send(&self, text: &str) -> MuxResult<()> {
        self.ensure_open()?;

        let mut sink = self.sink.lock().await;
        let sink = sink.as_mut().ok_or(MuxError::NotOpen(self.state()))?;
        sink.send(Message::Text(text.into()))
            .await
            .map_err(|e| self.classify(e))
    }

    async fn receive(&self) -> MuxResult<Option<String>> {
        self.ensure_open()?;

        let mut stream = self.stream.lock().await;
        let stream = stream.as_mut().ok_or(MuxError::NotOpen(self.state()))?;

        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(data))) => {
                    tracing::debug!(
                        session_id = %self.id, kind = %SessionKind::Client,
                        len = data.len(),
                        "Ignoring binary frame"
                    );
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(
                        session_id = %self.id, kind = %SessionKind::Client,
                        frame = ?frame,
                        "Remote closed connection"
                    );
                    self.complete_close().await;
                    return Ok(None);
                }
                Some(Err(e)) => return Err(self.classify(e)),
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
            code: CloseCode::Normal,
            reason: "".into(),
        };
        let result = match self.sink.lock().await.as_mut() {
            Some(sink) => sink.send(Message::Close(Some(frame))).await,
            None => Ok(()),
        };

        match result {
            // The peer already went away; nothing left to close
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                self.transition(SessionState::Closed);
                tracing::info!(session_id = %self.id, kind = %SessionKind::Client, "Client session closed");
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
