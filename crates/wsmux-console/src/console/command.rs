//! Console command parsing

use wsmux_core::{Endpoint, SessionKind};

/// A parsed operator command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List(SessionKind),
    NewClient(Endpoint),
    NewServer(Endpoint),
    Select(SessionKind, usize),
    Remove(SessionKind, usize),
    Help,
    Quit,
}

/// Why a command line was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("IP not set.")]
    MissingHost,

    #[error("Port not set.")]
    MissingPort,

    #[error("Invalid port '{0}'.")]
    InvalidPort(String),

    #[error("No index set.")]
    MissingIndex,

    #[error("Invalid index '{0}'.")]
    InvalidIndex(String),

    #[error("Unknown command '{0}'.")]
    Unknown(String),
}

impl Command {
    /// Parse one command-mode line
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(CommandError::Unknown(String::new()));
        };

        match verb {
            "lc" | "list-clients" => Ok(Self::List(SessionKind::Client)),
            "ls" | "list-servers" => Ok(Self::List(SessionKind::Server)),
            "c" | "new-client" => parse_endpoint(words).map(Self::NewClient),
            "s" | "new-server" => parse_endpoint(words).map(Self::NewServer),
            "tc" | "select-client" => parse_index(words.next()).map(|i| Self::Select(SessionKind::Client, i)),
            "ts" | "select-server" => parse_index(words.next()).map(|i| Self::Select(SessionKind::Server, i)),
            "rc" | "remove-client" => parse_index(words.next()).map(|i| Self::Remove(SessionKind::Client, i)),
            "rs" | "remove-server" => parse_index(words.next()).map(|i| Self::Remove(SessionKind::Server, i)),
            "h" | "help" => Ok(Self::Help),
            "q" | "quit" => Ok(Self::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

fn parse_endpoint<'a>(mut words: impl Iterator<Item = &'a str>) -> Result<Endpoint, CommandError> {
    let host = words.next().ok_or(CommandError::MissingHost)?;
    let port = words.next().ok_or(CommandError::MissingPort)?;
    let port = port
        .parse::<u16>()
        .map_err(|_| CommandError::InvalidPort(port.to_string()))?;
    Ok(Endpoint::new(host, port, parse_secure(words.next())))
}

fn parse_index(word: Option<&str>) -> Result<usize, CommandError> {
    let word = word.ok_or(CommandError::MissingIndex)?;
    word.parse()
        .map_err(|_| CommandError::InvalidIndex(word.to_string()))
}

/// TLS is on unless explicitly turned off
fn parse_secure(word: Option<&str>) -> bool {
    match word {
        None => true,
        Some(word) => !matches!(
            word.to_ascii_lowercase().as_str(),
            "no" | "false" | "off" | "0"
        ),
    }
}

/// Command-mode help text
pub const MENU: &str = "\
Commands:
  lc, list-clients             List client sessions
  ls, list-servers             List server sessions
  c,  new-client <ip> <port> [ssl]
                               Connect to a WebSocket server (ssl: yes|no, default yes)
  s,  new-server <host> <port> [ssl]
                               Listen for one WebSocket peer (ssl: yes|no, default yes)
  tc, select-client <index>    Attach the console to a client session
  ts, select-server <index>    Attach the console to a server session
  rc, remove-client <index>    Close and remove a client session
  rs, remove-server <index>    Close and remove a server session
  h,  help                     Show this menu
  q,  quit                     Close every session and exit";
