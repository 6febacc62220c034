//! Transport capability shared by client sessions and server peers
//!
//! The receive pump only needs this trait, so it works the same for an
//! outbound dial and for an accepted inbound peer.

use async_trait::async_trait;

use crate::entities::SessionState;
use crate::error::MuxResult;

#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Send one UTF-8 text frame, flushed before returning
    async fn send(&self, text: &str) -> MuxResult<()>;

    /// Wait for the next full text frame
    ///
    /// Returns `Ok(None)` once the peer has closed the stream.
    async fn receive(&self) -> MuxResult<Option<String>>;

    /// Close with a normal-closure frame
    async fn disconnect(&self) -> MuxResult<()>;

    /// Current lifecycle state
    fn state(&self) -> SessionState;

    /// Mark the transport as permanently failed
    fn mark_failed(&self);
}
