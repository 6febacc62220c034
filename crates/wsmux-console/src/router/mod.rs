//! Focus router
//!
//! Holds which session, if any, the operator is attached to. Inbound text is
//! shown only when it comes from the focused session; everything else is
//! dropped. Outbound console lines go to the focused session, except the quit
//! sentinel, which only detaches.

mod sink;

pub use sink::{ConsoleLine, ConsoleSink, MemorySink, StdoutSink};

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use wsmux_core::{
    MuxError, MuxResult, SessionEvent, SessionEventKind, SessionInfo, SessionKind, SessionRef,
    TaskOutcome,
};

use crate::registry::SessionRegistry;

/// Default line that returns the console to command mode
pub const DEFAULT_QUIT_SENTINEL: &str = "\\q";

/// Which session receives console input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FocusState {
    #[default]
    None,
    Focused(SessionRef),
}

impl FocusState {
    pub fn session(self) -> Option<SessionRef> {
        match self {
            Self::None => None,
            Self::Focused(session) => Some(session),
        }
    }
}

/// What happened to an outbound line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outbound {
    /// Transmitted as one text frame
    Sent,
    /// The line was the quit sentinel; focus is now `None`
    Detached,
}

pub struct FocusRouter {
    registry: Arc<SessionRegistry>,
    sink: Arc<dyn ConsoleSink>,
    focus: Mutex<FocusState>,
    quit_sentinel: String,
}

impl FocusRouter {
    pub fn new(
        registry: Arc<SessionRegistry>,
        sink: Arc<dyn ConsoleSink>,
        quit_sentinel: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            sink,
            focus: Mutex::new(FocusState::None),
            quit_sentinel: quit_sentinel.into(),
        }
    }

    pub fn focus(&self) -> FocusState {
        *self.focus.lock()
    }

    pub fn is_focused(&self) -> bool {
        self.focus().session().is_some()
    }

    pub fn quit_sentinel(&self) -> &str {
        &self.quit_sentinel
    }

    /// Current list position of the focused session
    pub fn focus_index(&self) -> Option<(SessionKind, usize)> {
        let session = self.focus().session()?;
        self.registry
            .find(session)
            .map(|(index, _)| (session.kind, index))
    }

    /// Focus the session at `index`; on error the focus is unchanged
    pub fn set_focus(&self, kind: SessionKind, index: usize) -> MuxResult<SessionInfo> {
        let info = self.registry.info(kind, index)?;
        *self.focus.lock() = FocusState::Focused(info.session_ref());
        tracing::debug!(session_id = %info.id, kind = %info.kind, endpoint = %info.endpoint, index, "Focus set");
        Ok(info)
    }

    pub fn clear_focus(&self) {
        let previous = std::mem::take(&mut *self.focus.lock());
        if let FocusState::Focused(session) = previous {
            tracing::debug!(session_id = %session.id, kind = %session.kind, "Focus cleared");
        }
    }

    /// Forget focus on a session that left the registry
    pub fn session_removed(&self, session: SessionRef) {
        let mut focus = self.focus.lock();
        if *focus == FocusState::Focused(session) {
            *focus = FocusState::None;
            drop(focus);
            self.sink.notice("Focused session was removed.");
        }
    }

    /// Show `text` if it comes from the focused session
    ///
    /// Returns whether it was shown.
    pub fn on_inbound(&self, session: SessionRef, text: &str) -> bool {
        // Held while printing so a concurrent focus change cannot interleave
        let focus = self.focus.lock();
        if *focus == FocusState::Focused(session) {
            self.sink.message(session, text);
            true
        } else {
            tracing::trace!(session_id = %session.id, kind = %session.kind, "Dropping text from unfocused session");
            false
        }
    }

    /// Route one event from a background task
    pub fn handle_event(&self, event: SessionEvent) {
        let session = event.session;
        let focused = self.focus() == FocusState::Focused(session);

        match event.kind {
            SessionEventKind::Inbound(text) => {
                self.on_inbound(session, &text);
            }
            SessionEventKind::ReceiveFailed(err) => {
                tracing::debug!(session_id = %session.id, kind = %session.kind, error = %err, "Receive failure reported");
                if focused {
                    self.sink.notice(&format!("Receive failed: {err}"));
                }
            }
            SessionEventKind::PeerAttached(remote) => {
                if focused {
                    self.sink.notice(&format!("Peer {remote} connected."));
                }
            }
            SessionEventKind::PeerDetached(remote) => {
                if focused {
                    self.sink.notice(&format!("Peer {remote} disconnected."));
                }
            }
            SessionEventKind::TaskEnded { task, outcome } => {
                if outcome.is_abnormal() {
                    tracing::warn!(session_id = %session.id, kind = %session.kind, task = %task, outcome = %outcome, "Background task ended abnormally");
                }
                if !focused {
                    return;
                }
                if task == "receive" {
                    self.sink.notice(&format!("Connection closed ({outcome})."));
                } else if !matches!(outcome, TaskOutcome::Cancelled) {
                    self.sink.notice(&format!("Task '{task}' stopped ({outcome})."));
                }
            }
        }
    }

    /// Send one console line to the focused session
    ///
    /// The quit sentinel is never transmitted. A failed send clears focus.
    pub async fn send_outbound(&self, text: &str) -> MuxResult<Outbound> {
        let FocusState::Focused(target) = self.focus() else {
            return Err(MuxError::NoFocus);
        };

        if text == self.quit_sentinel {
            self.clear_focus();
            return Ok(Outbound::Detached);
        }

        let Some((_, session)) = self.registry.find(target) else {
            self.clear_focus();
            return Err(MuxError::NoFocus);
        };

        match session.send(text).await {
            Ok(()) => Ok(Outbound::Sent),
            Err(err) => {
                tracing::warn!(session_id = %target.id, kind = %target.kind, error = %err, "Send failed, leaving session");
                self.clear_focus();
                Err(err)
            }
        }
    }

    /// Drain the event inbox until every sender is gone
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        tracing::debug!("Event inbox closed");
    }
}
