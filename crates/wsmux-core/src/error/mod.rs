//! Error types

mod mux_error;

pub use mux_error::{MuxError, MuxResult};
