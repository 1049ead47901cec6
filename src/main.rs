//! dx-server binary: serves a static directory behind the default chain.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use dx_server::config::{load_config, ServerConfig};
use dx_server::http::descriptor;
use dx_server::lifecycle::{wait_for_signal, Shutdown};
use dx_server::middleware::{access_log, error_boundary, not_found};
use dx_server::observability::{logging, metrics};
use dx_server::routing::{RouteMatch, Router};
use dx_server::{static_files, Chain, HttpServer};

#[derive(Debug, Parser)]
#[command(name = "dx-server", version, about = "Minimal HTTP server")]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address, overrides the configuration.
    #[arg(short, long)]
    bind: Option<String>,

    /// Directory to serve, overrides the configuration.
    #[arg(short, long)]
    root: Option<PathBuf>,
}

fn build_chain(config: &ServerConfig) -> Chain {
    let health = Router::get().route("/health", |_route: RouteMatch| async {
        descriptor::set_json(&serde_json::json!({ "status": "ok" }))
    });

    let mut chain = Chain::new()
        .with(access_log())
        .with(error_boundary())
        .with(health);
    if let Some(options) = config.static_files.options() {
        chain = chain.with(static_files::serve(options));
    }
    chain.with(not_found())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(root) = cli.root {
        config.static_files.root = Some(root);
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "dx-server starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        static_root = ?config.static_files.root,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                metrics::init_metrics(addr);
            }
            Err(err) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %err,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let drain = Duration::from_secs(config.timeouts.shutdown_secs);

    let shutdown = Shutdown::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let chain = build_chain(&config);
    let server = HttpServer::new(config, chain);
    let mut serving = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        result = &mut serving => {
            result??;
        }
        _ = shutdown.subscribe().recv() => {
            match tokio::time::timeout(drain, &mut serving).await {
                Ok(result) => result??,
                Err(_) => tracing::warn!(drain_secs = drain.as_secs(), "Shutdown deadline passed, exiting"),
            }
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
