//! Stand-in WebSocket peers
//!
//! `RemotePeer` plays the remote server a client session dials.
//! `connect_peer` plays the inbound peer of a server session.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use wsmux_core::Endpoint;

use crate::helpers::{wait_until, WAIT};

type ServerSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Client side of an inbound peer connection
pub type PeerSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Default)]
struct PeerLog {
    received: Vec<String>,
    normal_closes: usize,
}

/// A plain `ws://` server that records what it receives
pub struct RemotePeer {
    addr: SocketAddr,
    sinks: Arc<Mutex<Vec<ServerSink>>>,
    log: Arc<std::sync::Mutex<PeerLog>>,
    _handle: JoinHandle<()>,
}

impl RemotePeer {
    /// Start listening on an ephemeral local port
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let sinks = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::new(std::sync::Mutex::new(PeerLog::default()));

        let handle = {
            let sinks = Arc::clone(&sinks);
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let Ok(socket) = tokio_tungstenite::accept_async(stream).await else {
                        continue;
                    };
                    let (sink, mut stream) = socket.split();
                    sinks.lock().await.push(sink);

                    let log = Arc::clone(&log);
                    tokio::spawn(async move {
                        while let Some(Ok(message)) = stream.next().await {
                            let mut log = log.lock().unwrap();
                            match message {
                                Message::Text(text) => log.received.push(text),
                                Message::Close(Some(frame)) if frame.code == CloseCode::Normal => {
                                    log.normal_closes += 1;
                                }
                                _ => {}
                            }
                        }
                    });
                }
            })
        };

        Ok(Self {
            addr,
            sinks,
            log,
            _handle: handle,
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Plain endpoint a client session can dial
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new("127.0.0.1", self.port(), false)
    }

    /// Wait until `count` connections completed the handshake
    pub async fn wait_for_connections(&self, count: usize) -> bool {
        let sinks = Arc::clone(&self.sinks);
        let deadline = tokio::time::Instant::now() + WAIT;
        while tokio::time::Instant::now() < deadline {
            if sinks.lock().await.len() >= count {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        false
    }

    /// Send `text` on the connection accepted `index`-th
    pub async fn say_on(&self, index: usize, text: &str) -> Result<()> {
        let mut sinks = self.sinks.lock().await;
        let sink = sinks
            .get_mut(index)
            .ok_or_else(|| anyhow::anyhow!("no connection {index}"))?;
        sink.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Send `text` on the first connection
    pub async fn say(&self, text: &str) -> Result<()> {
        self.say_on(0, text).await
    }

    /// Start a closing handshake on every connection
    pub async fn close_all(&self) -> Result<()> {
        for sink in self.sinks.lock().await.iter_mut() {
            sink.close().await?;
        }
        Ok(())
    }

    /// Texts received so far, in arrival order
    pub fn received(&self) -> Vec<String> {
        self.log.lock().unwrap().received.clone()
    }

    pub fn normal_closes(&self) -> usize {
        self.log.lock().unwrap().normal_closes
    }

    /// Wait until `text` arrives
    pub async fn wait_for_text(&self, text: &str) -> bool {
        wait_until(WAIT, || self.received().iter().any(|t| t == text)).await
    }
}

/// Connect to a server session the way a remote peer would
pub async fn connect_peer(addr: SocketAddr) -> Result<PeerSocket, tungstenite::Error> {
    let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/")).await?;
    Ok(socket)
}

/// Next text frame from an inbound peer socket, skipping control frames
pub async fn next_text(socket: &mut PeerSocket) -> Option<String> {
    let read = async {
        while let Some(message) = socket.next().await {
            match message {
                Ok(Message::Text(text)) => return Some(text),
                Ok(_) => {}
                Err(_) => return None,
            }
        }
        None
    };
    tokio::time::timeout(WAIT, read).await.ok().flatten()
}

/// Close code of the next close frame, skipping any text still in flight
///
/// `None` when the connection ends without a closing handshake.
pub async fn next_close(socket: &mut PeerSocket) -> Option<CloseCode> {
    let read = async {
        while let Some(message) = socket.next().await {
            match message {
                Ok(Message::Close(frame)) => return frame.map(|f| f.code),
                Ok(_) => {}
                Err(_) => return None,
            }
        }
        None
    };
    tokio::time::timeout(WAIT, read).await.ok().flatten()
}
