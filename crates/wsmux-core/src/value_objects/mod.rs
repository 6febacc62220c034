//! Value objects - immutable types that describe sessions

mod endpoint;
mod session_id;

pub use endpoint::{is_valid_ipv4, Endpoint};
pub use session_id::{SessionId, SessionIdGenerator};
