//! Test helpers for integration tests
//!
//! Provides a multiplexer bound to a recording console, polling helpers,
//! and port utilities.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use wsmux_console::pump::PumpConfig;
use wsmux_console::{ConsoleSink, MemorySink, Multiplexer, MuxOptions};
use wsmux_core::SessionKind;

/// Default wait for anything that happens over the network
pub const WAIT: Duration = Duration::from_secs(5);

/// Options with short retry and cancel windows
pub fn test_options() -> MuxOptions {
    MuxOptions {
        pump: PumpConfig {
            retry_interval: Duration::from_millis(50),
            max_consecutive_failures: None,
            cancel_timeout: Duration::from_secs(2),
        },
        ..MuxOptions::default()
    }
}

/// A multiplexer whose console output is recorded
pub struct TestMux {
    pub mux: Multiplexer,
    pub sink: Arc<MemorySink>,
}

impl TestMux {
    pub fn start() -> Self {
        Self::with_options(test_options())
    }

    pub fn with_options(options: MuxOptions) -> Self {
        let sink = Arc::new(MemorySink::new());
        let mux = Multiplexer::new(options, Arc::clone(&sink) as Arc<dyn ConsoleSink>);
        Self { mux, sink }
    }

    /// Address a server session actually bound
    pub fn server_addr(&self, index: usize) -> Result<SocketAddr> {
        self.mux
            .registry()
            .info(SessionKind::Server, index)?
            .local_addr
            .context("server session has no bound address")
    }

    /// Wait until the console has shown `text`
    pub async fn wait_for_message(&self, text: &str) -> bool {
        wait_until(WAIT, || self.sink.messages().iter().any(|m| m == text)).await
    }

    pub async fn shutdown(self) {
        self.mux.shutdown().await;
    }
}

/// Poll `condition` every 10 ms until it holds or `timeout` passes
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A local port with nothing listening on it
pub async fn closed_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}
