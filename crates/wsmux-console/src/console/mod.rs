//! Operator console: command parsing and the read loop

mod command;
mod dispatcher;

pub use command::{Command, CommandError, MENU};
pub use dispatcher::{ConsoleDispatcher, Control};
