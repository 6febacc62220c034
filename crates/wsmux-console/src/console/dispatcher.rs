//! Console dispatcher
//!
//! Reads operator lines. Without focus a line is a command; with focus it is
//! outbound text for the focused session.

use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use wsmux_common::{AppError, AppResult};
use wsmux_core::SessionKind;

use super::command::{Command, CommandError, MENU};
use crate::mux::Multiplexer;
use crate::router::{ConsoleSink, Outbound};

/// Whether the console loop keeps going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

pub struct ConsoleDispatcher<'a> {
    mux: &'a Multiplexer,
    sink: Arc<dyn ConsoleSink>,
}

impl<'a> ConsoleDispatcher<'a> {
    pub fn new(mux: &'a Multiplexer, sink: Arc<dyn ConsoleSink>) -> Self {
        Self { mux, sink }
    }

    /// Run until `quit`, end of input, or Ctrl-C
    pub async fn run<R>(&self, input: R) -> AppResult<()>
    where
        R: AsyncBufRead + Unpin,
    {
        self.run_until(input, async {
            if tokio::signal::ctrl_c().await.is_err() {
                tracing::warn!("Ctrl-C handler unavailable");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until `quit`, end of input, or `shutdown` completes
    pub async fn run_until<R, F>(&self, input: R, shutdown: F) -> AppResult<()>
    where
        R: AsyncBufRead + Unpin,
        F: Future<Output = ()>,
    {
        let mut lines = input.lines();
        tokio::pin!(shutdown);

        self.sink.notice(MENU);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("Interrupted, shutting down");
                    return Ok(());
                }
                line = lines.next_line() => {
                    let Some(line) = line.map_err(AppError::Input)? else {
                        tracing::debug!("End of input");
                        return Ok(());
                    };
                    if self.handle_line(&line).await == Control::Quit {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Handle one operator line
    pub async fn handle_line(&self, line: &str) -> Control {
        if self.mux.router().is_focused() {
            self.forward(line).await;
            return Control::Continue;
        }

        match Command::parse(line) {
            Ok(command) => self.execute(command).await,
            Err(CommandError::Unknown(word)) => {
                if !word.is_empty() {
                    self.sink.notice(&format!("Unknown command '{word}'."));
                }
                self.sink.notice(MENU);
                Control::Continue
            }
            Err(e) => {
                self.sink.notice(&e.to_string());
                Control::Continue
            }
        }
    }

    async fn forward(&self, line: &str) {
        match self.mux.send(line).await {
            Ok(Outbound::Sent) => {}
            Ok(Outbound::Detached) => {
                self.sink.notice("Back to command mode.");
            }
            Err(e) => {
                self.sink
                    .notice(&format!("Send failed: {e}. Back to command mode."));
            }
        }
    }

    async fn execute(&self, command: Command) -> Control {
        match command {
            Command::List(kind) => self.print_list(kind),
            Command::NewClient(endpoint) => {
                self.sink
                    .notice(&format!("Connecting to {}...", endpoint.client_url()));
                match self.mux.add_client(endpoint).await {
                    Ok(index) => self.sink.notice(&format!("Client {index} connected.")),
                    Err(e) => self.sink.notice(&format!("Error: {e}")),
                }
            }
            Command::NewServer(endpoint) => match self.mux.add_server(endpoint).await {
                Ok(index) => {
                    let bound = self
                        .mux
                        .registry()
                        .info(SessionKind::Server, index)
                        .ok()
                        .and_then(|info| info.local_addr);
                    match bound {
                        Some(addr) => self
                            .sink
                            .notice(&format!("Server {index} listening on {addr}.")),
                        None => self.sink.notice(&format!("Server {index} listening.")),
                    }
                }
                Err(e) => self.sink.notice(&format!("Error: {e}")),
            },
            Command::Select(kind, index) => match self.mux.select(kind, index) {
                Ok(info) => self.sink.notice(&format!(
                    "Attached to {kind} {index} ({}). Type {} to return.",
                    info.endpoint,
                    self.mux.router().quit_sentinel()
                )),
                Err(e) => self.sink.notice(&format!("Error: {e}")),
            },
            Command::Remove(kind, index) => match self.mux.remove(kind, index).await {
                Ok(info) => self
                    .sink
                    .notice(&format!("Removed {kind} {index} ({}).", info.endpoint)),
                Err(e) => self.sink.notice(&format!("Error: {e}")),
            },
            Command::Help => self.sink.notice(MENU),
            Command::Quit => return Control::Quit,
        }
        Control::Continue
    }

    fn print_list(&self, kind: SessionKind) {
        let title = match kind {
            SessionKind::Client => "Listing clients...",
            SessionKind::Server => "Listing servers...",
        };
        self.sink.notice(title);

        let sessions = self.mux.list(kind);
        if sessions.is_empty() {
            self.sink.notice(&format!("No {kind} sessions."));
        }
        for info in &sessions {
            self.sink.notice(&format!("  {info}"));
        }
    }
}
