//! Receive pump
//!
//! One background loop per open transport. It waits for inbound text frames
//! and forwards them, tagged with the owning session, to the event inbox.
//! Transient failures are retried after a fixed interval; end of stream and
//! fatal failures stop the loop.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wsmux_common::PumpSettings;
use wsmux_core::{MuxError, SessionEvent, SessionEventKind, SessionRef, SessionTransport, TaskOutcome};

use crate::supervisor::{spawn_supervised, EventSender, TaskHandle};

/// Default pause between failed receive attempts
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Default time a cancelled task gets before it is aborted
pub const DEFAULT_CANCEL_TIMEOUT: Duration = Duration::from_secs(5);

/// Pump retry and cancellation policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpConfig {
    pub retry_interval: Duration,
    /// `None` retries forever
    pub max_consecutive_failures: Option<u32>,
    pub cancel_timeout: Duration,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            retry_interval: DEFAULT_RETRY_INTERVAL,
            max_consecutive_failures: None,
            cancel_timeout: DEFAULT_CANCEL_TIMEOUT,
        }
    }
}

impl From<&PumpSettings> for PumpConfig {
    fn from(settings: &PumpSettings) -> Self {
        Self {
            retry_interval: settings.retry_interval(),
            max_consecutive_failures: settings.max_consecutive_failures,
            cancel_timeout: settings.cancel_timeout(),
        }
    }
}

/// Why a pump stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpExit {
    Cancelled,
    /// The remote side closed the stream
    EndOfStream,
    /// The transport is permanently unusable
    Fatal(MuxError),
    /// Too many transient failures in a row
    RetriesExhausted(u32),
    /// Nobody is draining events anymore
    InboxClosed,
}

impl fmt::Display for PumpExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled"),
            Self::EndOfStream => f.write_str("end of stream"),
            Self::Fatal(err) => write!(f, "fatal: {err}"),
            Self::RetriesExhausted(count) => write!(f, "gave up after {count} failed receives"),
            Self::InboxClosed => f.write_str("event inbox closed"),
        }
    }
}

impl From<PumpExit> for TaskOutcome {
    fn from(exit: PumpExit) -> Self {
        match exit {
            PumpExit::Cancelled => Self::Cancelled,
            other => Self::Finished(other.to_string()),
        }
    }
}

/// Receive loop bound to one session
pub struct ReceivePump {
    session: SessionRef,
    source: Arc<dyn SessionTransport>,
    events: EventSender,
    config: PumpConfig,
    cancel: CancellationToken,
}

impl ReceivePump {
    pub fn new(
        session: SessionRef,
        source: Arc<dyn SessionTransport>,
        events: EventSender,
        config: PumpConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session,
            source,
            events,
            config,
            cancel,
        }
    }

    /// Run until cancelled, closed, or failed for good
    pub async fn run(self) -> PumpExit {
        let mut failures = 0u32;

        loop {
            let received = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return PumpExit::Cancelled,
                received = self.source.receive() => received,
            };

            match received {
                Ok(Some(text)) => {
                    failures = 0;
                    tracing::trace!(session_id = %self.session.id, kind = %self.session.kind, len = text.len(), "Frame received");
                    if self
                        .events
                        .send(SessionEvent::inbound(self.session, text))
                        .await
                        .is_err()
                    {
                        return PumpExit::InboxClosed;
                    }
                }
                Ok(None) => {
                    tracing::info!(session_id = %self.session.id, kind = %self.session.kind, "Stream closed by remote");
                    return PumpExit::EndOfStream;
                }
                Err(err) if err.is_fatal() => {
                    tracing::info!(session_id = %self.session.id, kind = %self.session.kind, error = %err, "Receive loop stopping");
                    self.source.mark_failed();
                    return PumpExit::Fatal(err);
                }
                Err(err) => {
                    failures += 1;
                    tracing::warn!(
                        session_id = %self.session.id, kind = %self.session.kind,
                        error = %err,
                        attempt = failures,
                        "Receive failed, retrying"
                    );

                    if self
                        .config
                        .max_consecutive_failures
                        .is_some_and(|limit| failures >= limit)
                    {
                        self.source.mark_failed();
                        return PumpExit::RetriesExhausted(failures);
                    }

                    let event = SessionEvent::new(self.session, SessionEventKind::ReceiveFailed(err));
                    if self.events.send(event).await.is_err() {
                        return PumpExit::InboxClosed;
                    }

                    tokio::select! {
                        () = self.cancel.cancelled() => return PumpExit::Cancelled,
                        () = tokio::time::sleep(self.config.retry_interval) => {}
                    }
                }
            }
        }
    }
}

/// Spawns supervised pumps that all report to the same inbox
#[derive(Clone)]
pub struct PumpLauncher {
    events: EventSender,
    config: PumpConfig,
}

impl PumpLauncher {
    pub fn new(events: EventSender, config: PumpConfig) -> Self {
        Self { events, config }
    }

    pub fn config(&self) -> &PumpConfig {
        &self.config
    }

    pub fn events(&self) -> &EventSender {
        &self.events
    }

    /// Start a pump for `source`
    pub fn launch(
        &self,
        session: SessionRef,
        source: Arc<dyn SessionTransport>,
        cancel: CancellationToken,
    ) -> TaskHandle {
        self.launch_holding(session, source, cancel, ())
    }

    /// Start a pump that keeps `guard` alive until it stops
    pub fn launch_holding<G>(
        &self,
        session: SessionRef,
        source: Arc<dyn SessionTransport>,
        cancel: CancellationToken,
        guard: G,
    ) -> TaskHandle
    where
        G: Send + 'static,
    {
        let pump = ReceivePump::new(
            session,
            source,
            self.events.clone(),
            self.config.clone(),
            cancel.clone(),
        );
        spawn_supervised(
            "receive",
            session,
            cancel,
            self.events.clone(),
            async move {
                let exit = pump.run().await;
                drop(guard);
                TaskOutcome::from(exit)
            },
        )
    }
}
