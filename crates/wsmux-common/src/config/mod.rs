//! Configuration structs

mod app_config;

pub use app_config::{
    AppConfig, ConfigError, ConfigSummary, ListenOverrides, LogSettings, PumpSettings,
    RemoteServer, TlsSettings,
};
