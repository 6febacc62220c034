use std::path::PathBuf;

use clap::Parser;
use wsmux_common::ListenOverrides;

/// Interactive WebSocket session multiplexer.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short = 'z', long = "cfg", default_value = "./conf.json")]
    pub cfg: PathBuf,

    /// Print the loaded configuration and exit.
    #[arg(short, long)]
    pub list: bool,

    /// Listen on this host at startup (implies listening).
    #[arg(long)]
    pub host: Option<String>,

    /// Listen on this port at startup (implies listening).
    #[arg(long)]
    pub port: Option<u16>,

    /// Use TLS for the startup listener (implies listening).
    #[arg(long)]
    pub secure: bool,

    /// Never listen at startup; wins over every other listen option.
    #[arg(long)]
    pub no_listen: bool,
}

impl Cli {
    pub fn listen_overrides(&self) -> ListenOverrides {
        ListenOverrides {
            host: self.host.clone(),
            port: self.port,
            secure: self.secure,
            no_listen: self.no_listen,
        }
    }
}
