//! Application configuration structs
//!
//! Loads configuration from a JSON file, then applies environment and
//! command-line overrides.

use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use wsmux_core::Endpoint;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Whether to open a listening server session at startup
    #[serde(default)]
    pub listen: bool,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default)]
    pub listen_secure: bool,
    /// Remote servers to dial at startup
    #[serde(default)]
    pub servers: Vec<RemoteServer>,
    /// Console line that leaves the focused session
    #[serde(default = "default_quit_sentinel")]
    pub quit_sentinel: String,
    #[serde(default)]
    pub pump: PumpSettings,
    /// PEM material for secure server sessions
    #[serde(default)]
    pub tls: Option<TlsSettings>,
    #[serde(default)]
    pub log: LogSettings,
}

/// A remote server dialed at startup
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteServer {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub secure: bool,
}

impl RemoteServer {
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port, self.secure)
    }
}

/// Receive pump retry policy
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PumpSettings {
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// `None` retries forever
    #[serde(default)]
    pub max_consecutive_failures: Option<u32>,
    #[serde(default = "default_cancel_timeout_ms")]
    pub cancel_timeout_ms: u64,
}

impl PumpSettings {
    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    #[must_use]
    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_timeout_ms)
    }
}

impl Default for PumpSettings {
    fn default() -> Self {
        Self {
            retry_interval_ms: default_retry_interval_ms(),
            max_consecutive_failures: None,
            cancel_timeout_ms: default_cancel_timeout_ms(),
        }
    }
}

/// Certificate chain and private key for `https` listeners
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsSettings {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Command-line overrides for the listen defaults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub secure: bool,
    pub no_listen: bool,
}

// Default value functions
fn default_listen_addr() -> String {
    "localhost".to_string()
}

fn default_listen_port() -> u16 {
    7654
}

fn default_quit_sentinel() -> String {
    "\\q".to_string()
}

fn default_retry_interval_ms() -> u64 {
    1000
}

fn default_cancel_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen: false,
            listen_addr: default_listen_addr(),
            listen_port: default_listen_port(),
            listen_secure: false,
            servers: Vec::new(),
            quit_sentinel: default_quit_sentinel(),
            pump: PumpSettings::default(),
            tls: None,
            log: LogSettings::default(),
        }
    }
}

impl AppConfig {
    /// Default config file location
    pub const DEFAULT_PATH: &'static str = "./conf.json";

    /// Load configuration from a JSON file, then apply environment overrides
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or if an
    /// override variable holds an invalid value
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut config = Self::from_json(&text)?;
        config.apply_env()?;
        Ok(config)
    }

    /// Parse configuration from a JSON document
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply `WSMUX_*` environment overrides
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = env::var("WSMUX_LISTEN") {
            self.listen = parse_bool(&value)
                .ok_or_else(|| ConfigError::InvalidValue("WSMUX_LISTEN", value.clone()))?;
        }
        if let Ok(value) = env::var("WSMUX_LISTEN_ADDR") {
            self.listen_addr = value;
        }
        if let Ok(value) = env::var("WSMUX_LISTEN_PORT") {
            self.listen_port = value
                .parse()
                .map_err(|_| ConfigError::InvalidValue("WSMUX_LISTEN_PORT", value.clone()))?;
        }
        if let Ok(value) = env::var("WSMUX_QUIT_SENTINEL") {
            self.quit_sentinel = value;
        }
        if let Ok(value) = env::var("WSMUX_LOG_LEVEL") {
            self.log.level = value;
        }
        Ok(())
    }

    /// Apply command-line overrides
    ///
    /// Any explicit host, port, or secure flag turns listening on;
    /// `no_listen` wins over everything.
    pub fn apply_overrides(&mut self, overrides: &ListenOverrides) {
        if let Some(host) = &overrides.host {
            self.listen_addr.clone_from(host);
            self.listen = true;
        }
        if let Some(port) = overrides.port {
            self.listen_port = port;
            self.listen = true;
        }
        if overrides.secure {
            self.listen_secure = true;
            self.listen = true;
        }
        if overrides.no_listen {
            self.listen = false;
        }
    }

    /// Listen endpoint, if listening is enabled
    #[must_use]
    pub fn listen_endpoint(&self) -> Option<Endpoint> {
        self.listen.then(|| {
            Endpoint::new(self.listen_addr.clone(), self.listen_port, self.listen_secure)
        })
    }

    /// Endpoints dialed at startup
    #[must_use]
    pub fn startup_endpoints(&self) -> Vec<Endpoint> {
        self.servers.iter().map(RemoteServer::endpoint).collect()
    }

    /// Human-readable dump used by `--list`
    #[must_use]
    pub fn summary(&self) -> ConfigSummary<'_> {
        ConfigSummary(self)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Display adapter printing the configuration
pub struct ConfigSummary<'a>(&'a AppConfig);

impl fmt::Display for ConfigSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = self.0;
        writeln!(f, "Listen Enabled => {}", config.listen)?;
        writeln!(f, "Listen Address => '{}'", config.listen_addr)?;
        writeln!(f, "Listen Port => {}", config.listen_port)?;
        writeln!(f, "Listen Secure => {}", config.listen_secure)?;

        if !config.servers.is_empty() {
            writeln!(f, "Servers")?;
            for (i, server) in config.servers.iter().enumerate() {
                writeln!(f, "\tServer #{}", i + 1)?;
                writeln!(f, "\t\tHost => {}", server.host)?;
                writeln!(f, "\t\tPort => {}", server.port)?;
                writeln!(f, "\t\tSecure => {}", server.secure)?;
            }
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse config file: {0}")]
    Parse(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
