//! context-proxy
//!
//! Standalone binary serving the proxy mounts of a TOML configuration file.
//!
//! ```text
//!     Client Request
//!     ──────────────▶ listener ─▶ upgrade events ─▶ mount 1 ─▶ mount 2 ─▶ … ─▶ 404
//!                                                      │           │
//!                                                      ▼           ▼
//!                                                  transport   transport ─────▶ upstream
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use context_proxy::config::{load_config, ProxyConfig};
use context_proxy::http::server::shutdown_signal;
use context_proxy::observability::{logging, metrics, LogLevel};
use context_proxy::{Dispatcher, HttpServer, HttpTransport, Transport};

#[derive(Parser, Debug)]
#[command(name = "context-proxy", version, about = "Context-based reverse proxy")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log level (silent, error, warn, info, debug).
    #[arg(long)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init_logging(&config.observability, cli.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?cli.config,
        "context-proxy starting"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr);
    }

    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::from_config(&config.timeouts));
    let dispatchers = config
        .mounts
        .iter()
        .map(|mount| {
            let (context, options) = mount.compile()?;
            Dispatcher::new(context, options, transport.clone())
        })
        .collect::<Result<Vec<_>, _>>()?;

    if dispatchers.is_empty() {
        tracing::warn!("No mounts configured, every request will get 404");
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config, dispatchers);
    server.run(listener, shutdown_signal()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
