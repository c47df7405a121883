//! Stowage — self-hostable S3-compatible object storage server.
//!
//! Binds an HTTP listener over a filesystem-backed storage engine.  All
//! state lives on disk; restarting the process is always safe.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use stowage::config::Config;
use stowage::gate::AdmissionGate;
use stowage::signer::Signer;
use stowage::storage::FsStore;
use stowage::AppState;

/// Command-line arguments for the Stowage server.
#[derive(Parser, Debug)]
#[command(
    name = "stowage",
    version,
    about = "S3-compatible object storage backed by the local filesystem"
)]
struct Cli {
    /// Override the storage root directory (env: STORAGE_PATH).
    #[arg(short, long)]
    root: Option<String>,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing / logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Configuration is read once; the credential pair is immutable for the
    // life of the process and never logged.
    let config = Config::from_env()?;

    let storage_root = cli
        .root
        .unwrap_or_else(|| config.storage.root.clone());
    let bind_addr = cli.bind.unwrap_or_else(|| config.bind_addr());

    let store = FsStore::new(&storage_root)?;
    info!("storage engine initialized at {storage_root}");

    let state = Arc::new(AppState {
        signer: Signer::new(config.auth.secret_access_key.as_bytes().to_vec()),
        store: Arc::new(store),
        gate: AdmissionGate::default(),
        config,
    });

    let app = stowage::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("stowage listening on {bind_addr}");

    // Graceful shutdown: on SIGTERM/SIGINT, stop accepting new connections
    // and wait for in-flight requests to complete.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("stowage shut down");

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        },
    }
}
