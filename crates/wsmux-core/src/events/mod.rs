//! Events reported by background session tasks

mod session_event;

pub use session_event::{SessionEvent, SessionEventKind, TaskOutcome};
