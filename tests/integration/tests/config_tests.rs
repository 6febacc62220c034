//! Startup-from-configuration tests
//!
//! Run with: cargo test -p integration-tests --test config_tests

use std::io::Write;

use integration_tests::{test_options, RemotePeer, TestMux};
use serde_json::json;
use wsmux_common::{AppConfig, ListenOverrides};
use wsmux_console::MuxOptions;
use wsmux_core::{SessionKind, SessionState};

fn write_config(value: &serde_json::Value) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{value}").unwrap();
    file
}

#[tokio::test]
async fn test_startup_sessions_from_config() {
    let remote = RemotePeer::start().await.unwrap();
    let file = write_config(&json!({
        "listen": true,
        "listenAddr": "127.0.0.1",
        "listenPort": 0,
        "servers": [
            { "host": "127.0.0.1", "port": remote.port() },
            { "host": "not-an-ip", "port": 9000 }
        ],
        "quitSentinel": ":leave",
        "pump": { "retryIntervalMs": 50 }
    }));

    let config = AppConfig::load(file.path()).unwrap();
    let options = MuxOptions::from_config(&config).unwrap();
    assert_eq!(options.quit_sentinel, ":leave");
    assert!(options.tls.is_none());

    let test = TestMux::with_options(options);
    let results: Vec<_> = {
        let mut results = Vec::new();
        for endpoint in config.startup_endpoints() {
            results.push(test.mux.add_client(endpoint).await);
        }
        results
    };
    assert!(results[0].is_ok());
    assert!(results[1].is_err());

    let listen = config.listen_endpoint().unwrap();
    test.mux.add_server(listen).await.unwrap();

    assert_eq!(test.mux.list(SessionKind::Client).len(), 1);
    let servers = test.mux.list(SessionKind::Server);
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].state, SessionState::Open);
    assert!(servers[0].local_addr.is_some());

    // The configured sentinel replaces the default one
    test.mux.select(SessionKind::Client, 0).unwrap();
    test.mux.send("\\q").await.unwrap();
    assert!(remote.wait_for_text("\\q").await);
    test.mux.send(":leave").await.unwrap();
    assert!(!test.mux.router().is_focused());

    test.shutdown().await;
}

#[tokio::test]
async fn test_no_listen_override() {
    let file = write_config(&json!({ "listen": true }));

    let mut config = AppConfig::load(file.path()).unwrap();
    assert!(config.listen_endpoint().is_some());

    config.apply_overrides(&ListenOverrides {
        port: Some(0),
        no_listen: true,
        ..ListenOverrides::default()
    });
    assert!(config.listen_endpoint().is_none());
}

#[tokio::test]
async fn test_missing_tls_files_fail_options() {
    let file = write_config(&json!({
        "tls": { "certPath": "/nonexistent/cert.pem", "keyPath": "/nonexistent/key.pem" }
    }));

    let config = AppConfig::load(file.path()).unwrap();
    assert!(MuxOptions::from_config(&config).is_err());

    // Without TLS the defaults still work
    let test = TestMux::with_options(test_options());
    assert!(test.mux.list(SessionKind::Server).is_empty());
    test.shutdown().await;
}
