//! wsmux entry point
//!
//! Run with:
//! ```bash
//! cargo run -p wsmux-console -- --cfg ./conf.json
//! ```

use std::sync::Arc;

use clap::Parser;
use tokio::io::BufReader;
use tracing::{error, info};
use wsmux_common::{try_init_tracing_with_config, AppConfig, AppError, AppResult, TracingConfig};
use wsmux_console::cli::Cli;
use wsmux_console::console::ConsoleDispatcher;
use wsmux_console::{ConsoleSink, Multiplexer, MuxOptions, StdoutSink};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!(error = %e, code = e.error_code(), "wsmux stopped");
        eprintln!("{e}");
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> AppResult<()> {
    let mut config = AppConfig::load(&cli.cfg)?;
    config.apply_overrides(&cli.listen_overrides());

    if cli.list {
        print!("{}", config.summary());
        return Ok(());
    }

    let tracing_config = TracingConfig::from_settings(&config.log)?;
    if let Err(e) = try_init_tracing_with_config(tracing_config) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    info!(
        servers = config.servers.len(),
        listen = config.listen,
        "Configuration loaded"
    );

    let options = MuxOptions::from_config(&config).map_err(|e| AppError::Tls(e.to_string()))?;
    let sink: Arc<dyn ConsoleSink> = Arc::new(StdoutSink::new());
    let mux = Multiplexer::new(options, Arc::clone(&sink));

    for endpoint in config.startup_endpoints() {
        sink.notice(&format!("Connecting to {}...", endpoint.client_url()));
        match mux.add_client(endpoint).await {
            Ok(index) => sink.notice(&format!("Client {index} connected.")),
            Err(e) => sink.notice(&format!("Error: {e}")),
        }
    }

    if let Some(endpoint) = config.listen_endpoint() {
        match mux.add_server(endpoint).await {
            Ok(index) => sink.notice(&format!("Server {index} listening.")),
            Err(e) => sink.notice(&format!("Error: {e}")),
        }
    }

    let result = ConsoleDispatcher::new(&mux, Arc::clone(&sink))
        .run(BufReader::new(tokio::io::stdin()))
        .await;

    mux.shutdown().await;
    result
}
