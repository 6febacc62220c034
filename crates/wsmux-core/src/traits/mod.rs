//! Capability traits (ports)

mod transport;

pub use transport::SessionTransport;
