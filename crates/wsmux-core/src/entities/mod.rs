//! Session entities

mod session;

pub use session::{SessionInfo, SessionKind, SessionRef, SessionState};
