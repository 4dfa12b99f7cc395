use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser};
use intake_core::Config;
use intake_runtime::{Dispatcher, WorkflowContext};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod error;
mod routes;

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn try_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .common
        .config
        .unwrap_or_else(Config::default_config_path);
    let config = Config::ensure_at(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let ctx = WorkflowContext::from_config(&config)
        .await
        .context("opening workflow")?;

    let dispatcher = Arc::new(Dispatcher::new(ctx.clone()));
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let background = tokio::spawn(dispatcher.run(ctx.bus.subscribe(), async {
        let _ = stop_rx.await;
    }));

    let app = routes::router(routes::AppState { ctx });

    let host = cli.common.host.unwrap_or(config.api.host);
    let port = cli.common.port.unwrap_or(config.api.port);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;
    info!("Starting API server on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Waiting for background jobs");
    let _ = stop_tx.send(());
    background.await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[derive(Debug, Parser)]
#[command(author, version, about = "HTTP API server for intake")]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", env = "INTAKE_CONFIG")]
    config: Option<PathBuf>,

    /// Interface to bind (defaults to api.host)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (defaults to api.port)
    #[arg(short, long)]
    port: Option<u16>,
}
