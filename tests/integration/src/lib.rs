//! Integration test utilities for the session multiplexer
//!
//! This crate provides stand-in WebSocket peers and a multiplexer wired to
//! an in-memory console, for end-to-end tests over real sockets.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
