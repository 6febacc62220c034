//! # wsmux-console
//!
//! Interactive multiplexer for WebSocket sessions: dial remote servers, listen
//! for single inbound peers, and attach the console to one session at a time.

pub mod cli;
pub mod console;
pub mod mux;
pub mod pump;
pub mod registry;
pub mod router;
pub mod session;
pub mod supervisor;

pub use mux::{Multiplexer, MuxOptions};
pub use router::{ConsoleSink, FocusState, MemorySink, Outbound, StdoutSink};
