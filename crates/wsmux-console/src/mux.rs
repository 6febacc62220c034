//! Multiplexer context
//!
//! Owns the registry, the focus router, and the task draining the event
//! inbox. One instance lives for the whole console session.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use wsmux_common::AppConfig;
use wsmux_core::{Endpoint, MuxResult, SessionInfo, SessionKind};

use crate::pump::{PumpConfig, PumpLauncher};
use crate::registry::SessionRegistry;
use crate::router::{ConsoleSink, FocusRouter, Outbound, DEFAULT_QUIT_SENTINEL};
use crate::session::{load_acceptor, TlsSetupError};

/// Capacity of the event inbox; pumps wait when it is full
const EVENT_BUFFER_SIZE: usize = 1024;

/// Runtime options for a multiplexer
#[derive(Clone)]
pub struct MuxOptions {
    pub pump: PumpConfig,
    pub quit_sentinel: String,
    pub tls: Option<TlsAcceptor>,
}

impl Default for MuxOptions {
    fn default() -> Self {
        Self {
            pump: PumpConfig::default(),
            quit_sentinel: DEFAULT_QUIT_SENTINEL.to_string(),
            tls: None,
        }
    }
}

impl MuxOptions {
    /// Build options from loaded configuration, reading TLS files if set
    pub fn from_config(config: &AppConfig) -> Result<Self, TlsSetupError> {
        let tls = config.tls.as_ref().map(load_acceptor).transpose()?;
        Ok(Self {
            pump: PumpConfig::from(&config.pump),
            quit_sentinel: config.quit_sentinel.clone(),
            tls,
        })
    }
}

pub struct Multiplexer {
    registry: Arc<SessionRegistry>,
    router: Arc<FocusRouter>,
    inbox: JoinHandle<()>,
}

impl Multiplexer {
    /// Create the registry and router and start draining events
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(options: MuxOptions, sink: Arc<dyn ConsoleSink>) -> Self {
        let (events, inbox) = mpsc::channel(EVENT_BUFFER_SIZE);
        let launcher = PumpLauncher::new(events, options.pump);
        let registry = Arc::new(SessionRegistry::new(launcher, options.tls));
        let router = Arc::new(FocusRouter::new(
            Arc::clone(&registry),
            sink,
            options.quit_sentinel,
        ));
        let inbox = tokio::spawn(Arc::clone(&router).run(inbox));

        Self {
            registry,
            router,
            inbox,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<FocusRouter> {
        &self.router
    }

    pub async fn add_client(&self, endpoint: Endpoint) -> MuxResult<usize> {
        self.registry.add_client(endpoint).await
    }

    pub async fn add_server(&self, endpoint: Endpoint) -> MuxResult<usize> {
        self.registry.add_server(endpoint).await
    }

    /// Remove a session, clearing focus if it was the focused one
    pub async fn remove(&self, kind: SessionKind, index: usize) -> MuxResult<SessionInfo> {
        let removed = self.registry.remove(kind, index).await?;
        self.router.session_removed(removed.session_ref());
        Ok(removed)
    }

    pub fn list(&self, kind: SessionKind) -> Vec<SessionInfo> {
        self.registry.list(kind)
    }

    /// Attach the console to a session
    pub fn select(&self, kind: SessionKind, index: usize) -> MuxResult<SessionInfo> {
        self.router.set_focus(kind, index)
    }

    /// Send a console line to the focused session
    pub async fn send(&self, text: &str) -> MuxResult<Outbound> {
        self.router.send_outbound(text).await
    }

    /// Close every session and stop routing events
    pub async fn shutdown(self) {
        self.router.clear_focus();
        self.registry.remove_all().await;
        self.inbox.abort();
        tracing::debug!("Multiplexer stopped");
    }
}
