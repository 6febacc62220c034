//! Endpoint - host, port, and transport-security flag
//!
//! For client sessions the endpoint is the remote server to dial; for server
//! sessions it is the local bind address.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::MuxError;

/// A network endpoint a session is created from
///
/// Immutable once a session owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    host: String,
    port: u16,
    secure: bool,
}

impl Endpoint {
    /// Create a new endpoint
    pub fn new(host: impl Into<String>, port: u16, secure: bool) -> Self {
        Self {
            host: host.into(),
            port,
            secure,
        }
    }

    /// Host part (IPv4 literal for clients, any bindable host for servers)
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port number
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Whether the transport is TLS-protected (`wss` / `https`)
    pub const fn is_secure(&self) -> bool {
        self.secure
    }

    /// Ensure the host is a well-formed IPv4 address
    pub fn validate_ipv4(&self) -> Result<(), MuxError> {
        if is_valid_ipv4(&self.host) {
            Ok(())
        } else {
            Err(MuxError::InvalidEndpoint(format!(
                "IPv4 address '{}' is invalid",
                self.host
            )))
        }
    }

    /// URI dialed by a client session
    pub fn client_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    /// Prefix a server session listens on
    pub fn listen_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}:{}/", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Check whether a string is a dotted-quad IPv4 address
///
/// Hostnames and IPv6 literals are rejected.
pub fn is_valid_ipv4(candidate: &str) -> bool {
    candidate.parse::<std::net::Ipv4Addr>().is_ok()
}
