//! Intake Server
//!
//! Accepts file uploads over HTTP, validates them while streaming and stores
//! them under their content fingerprint.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use intake_server::config::Config;
use intake_server::state::AppState;
use intake_server::upload::{
    spawn_ingest_worker, ChannelIngestSink, ContentStore, ingest::DEFAULT_INGEST_QUEUE_DEPTH,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "intake_server=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    // Refuse to start on a malformed variable; defaults would drop API_TOKEN
    let config = Config::from_env().context("loading configuration from environment")?;

    tracing::info!("Starting Intake Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Upload directory: {}", config.upload.upload_dir.display());
    tracing::info!(
        max_file_size = config.upload.max_file_size,
        allowed = ?config.upload.allowed_mime_types,
        hash = %config.upload.hash_algorithm,
        "Upload policy"
    );
    if config.auth.api_token.is_none() {
        tracing::warn!("API_TOKEN not set, upload routes are unauthenticated");
    }

    // Prepare storage
    tokio::fs::create_dir_all(&config.upload.upload_dir)
        .await
        .with_context(|| format!("creating {}", config.upload.upload_dir.display()))?;
    let store = ContentStore::new(config.upload.upload_dir.clone());
    if let Err(e) = store.sweep_stale_parts().await {
        tracing::warn!("Failed to sweep partial uploads: {}", e);
    }

    // Ingest hand-off
    let (sink, ingest_rx) = ChannelIngestSink::new(DEFAULT_INGEST_QUEUE_DEPTH);
    let ingest_worker = spawn_ingest_worker(ingest_rx);

    // Create application state
    let app_state = AppState::new(config.clone(), Some(Arc::new(sink)));

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = intake_server::app(app_state).layer(cors);

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid SERVER_HOST/SERVER_PORT")?;
    tracing::info!("Intake Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // State (and the sink inside it) is gone once serve returns
    match ingest_worker.await {
        Ok(count) => tracing::info!("Ingest worker drained {} jobs", count),
        Err(e) => tracing::warn!("Ingest worker failed: {}", e),
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
