//! # wsmux-core
//!
//! Domain layer for the WebSocket session multiplexer: endpoints, session
//! identity and lifecycle states, the error taxonomy, and the transport trait
//! shared by client and server sessions. No networking lives here.

pub mod entities;
pub mod error;
pub mod events;
pub mod traits;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{SessionInfo, SessionKind, SessionRef, SessionState};
pub use error::{MuxError, MuxResult};
pub use events::{SessionEvent, SessionEventKind, TaskOutcome};
pub use traits::SessionTransport;
pub use value_objects::{is_valid_ipv4, Endpoint, SessionId, SessionIdGenerator};
