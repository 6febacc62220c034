//! Console output sinks

use std::io::Write;

use parking_lot::Mutex;
use wsmux_core::SessionRef;

/// Where operator-visible text goes
pub trait ConsoleSink: Send + Sync {
    /// Inbound text from the focused session, printed verbatim
    fn message(&self, session: SessionRef, text: &str);

    /// Feedback for the operator: listings, errors, state changes
    fn notice(&self, text: &str);
}

/// Writes to the process's standard output
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl StdoutSink {
    pub fn new() -> Self {
        Self
    }

    fn write_line(text: &str) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{text}").and_then(|()| out.flush()) {
            tracing::warn!(error = %e, "Failed to write to stdout");
        }
    }
}

impl ConsoleSink for StdoutSink {
    fn message(&self, _session: SessionRef, text: &str) {
        Self::write_line(text);
    }

    fn notice(&self, text: &str) {
        Self::write_line(text);
    }
}

/// One recorded console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleLine {
    Message { session: SessionRef, text: String },
    Notice(String),
}

/// Keeps everything in memory, for embedding and tests
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<ConsoleLine>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<ConsoleLine> {
        self.lines.lock().clone()
    }

    /// Inbound texts in arrival order
    pub fn messages(&self) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter_map(|line| match line {
                ConsoleLine::Message { text, .. } => Some(text.clone()),
                ConsoleLine::Notice(_) => None,
            })
            .collect()
    }

    pub fn notices(&self) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter_map(|line| match line {
                ConsoleLine::Notice(text) => Some(text.clone()),
                ConsoleLine::Message { .. } => None,
            })
            .collect()
    }

    /// Whether any notice contains `needle`
    pub fn has_notice(&self, needle: &str) -> bool {
        self.notices().iter().any(|notice| notice.contains(needle))
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl ConsoleSink for MemorySink {
    fn message(&self, session: SessionRef, text: &str) {
        self.lines.lock().push(ConsoleLine::Message {
            session,
            text: text.to_string(),
        });
    }

    fn notice(&self, text: &str) {
        self.lines.lock().push(ConsoleLine::Notice(text.to_string()));
    }
}
