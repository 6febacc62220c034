//! Supervised background tasks
//!
//! Every long-lived task runs inside a monitor that reports how it stopped
//! (finished, cancelled, panicked, aborted) to the event inbox, so a dead
//! receive loop is never silent.

use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use wsmux_core::{SessionEvent, SessionEventKind, SessionRef, TaskOutcome};

/// Sender half of the event inbox drained by the focus router
pub type EventSender = mpsc::Sender<SessionEvent>;

/// Supervision errors
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Task '{task}' ignored cancellation for {timeout:?} and was aborted")]
    CancelTimeout { task: String, timeout: Duration },
}

/// Handle to a supervised task
pub struct TaskHandle {
    name: String,
    session: SessionRef,
    cancel: CancellationToken,
    abort: AbortHandle,
    monitor: Mutex<Option<JoinHandle<()>>>,
    finished: Arc<AtomicBool>,
}

impl TaskHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session(&self) -> SessionRef {
        self.session
    }

    /// Whether the task has stopped for any reason
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Request cooperative cancellation without waiting
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel and wait for the task, aborting it after `timeout`
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), SupervisorError> {
        self.cancel.cancel();

        let Some(monitor) = self.monitor.lock().take() else {
            return Ok(());
        };

        if tokio::time::timeout(timeout, monitor).await.is_ok() {
            Ok(())
        } else {
            tracing::warn!(
                session_id = %self.session.id, kind = %self.session.kind,
                task = %self.name,
                "Task ignored cancellation, aborting"
            );
            self.abort.abort();
            Err(SupervisorError::CancelTimeout {
                task: self.name.clone(),
                timeout,
            })
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawn `task` under a monitor that reports its outcome to `events`
///
/// `cancel` is the token the task watches; `TaskHandle::shutdown` trips it.
pub fn spawn_supervised<F>(
    name: impl Into<String>,
    session: SessionRef,
    cancel: CancellationToken,
    events: EventSender,
    task: F,
) -> TaskHandle
where
    F: Future<Output = TaskOutcome> + Send + 'static,
{
    let name = name.into();
    let inner = tokio::spawn(task);
    let abort = inner.abort_handle();
    let finished = Arc::new(AtomicBool::new(false));

    let monitor = {
        let name = name.clone();
        let finished = Arc::clone(&finished);
        tokio::spawn(async move {
            let outcome = match inner.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => TaskOutcome::Panicked(panic_message(e.into_panic())),
                Err(_) => TaskOutcome::Aborted,
            };
            finished.store(true, Ordering::Release);

            if outcome.is_abnormal() {
                tracing::warn!(session_id = %session.id, kind = %session.kind, task = %name, outcome = %outcome, "Task stopped abnormally");
            } else {
                tracing::debug!(session_id = %session.id, kind = %session.kind, task = %name, outcome = %outcome, "Task stopped");
            }

            let event = SessionEvent::new(session, SessionEventKind::TaskEnded { task: name, outcome });
            // The inbox is gone only during shutdown
            let _ = events.send(event).await;
        })
    };

    TaskHandle {
        name,
        session,
        cancel,
        abort,
        monitor: Mutex::new(Some(monitor)),
        finished,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
