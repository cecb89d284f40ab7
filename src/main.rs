use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use subgate::config::SubgateConfig;
use subgate::gate::{self, Gate, GateServer};
use subgate::proxy::UpstreamProxy;
use subgate::ratelimit::TokenLimiter;

/// Per-token update quota gate for a subscription backend.
#[derive(Parser, Debug)]
#[command(name = "subgate", version, about)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing, RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    info!("Starting Subgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let settings = SubgateConfig::from_file(&args.config)?.resolve()?;
    info!(
        listen = %settings.listen,
        upstream = %settings.upstream,
        prefix = %settings.prefix,
        max = settings.max,
        window = ?settings.window,
        "Configuration loaded"
    );

    let limiter = Arc::new(TokenLimiter::new(settings.max, settings.window));
    let proxy = UpstreamProxy::new(settings.upstream.clone())?;
    let gate = Arc::new(Gate::new(settings.prefix.clone(), limiter, proxy));

    GateServer::new(settings.listen.clone(), gate::router(gate))
        .serve_with_shutdown(shutdown_signal())
        .await?;

    info!("Subgate stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
