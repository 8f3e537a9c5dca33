use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use ch_transfer::api::handlers::connection::AppState;
use ch_transfer::api::routes::create_router_with_state;
use ch_transfer::config::Config;
use ch_transfer::services::database::ClickHouseConnector;
use ch_transfer::services::{ImportService, QueryPlanner};
use ch_transfer::storage::FileStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("Starting server on {}", config.server_address());

    // Prepare the upload and export directory
    let files = FileStore::new(&config.storage.upload_dir);
    files.ensure_dir().await.map_err(|e| {
        error!("Failed to prepare upload directory {}: {}", config.storage.upload_dir, e);
        e
    })?;

    let shutdown = CancellationToken::new();
    let state = AppState {
        connector: Arc::new(ClickHouseConnector::new(config.store_settings())),
        files,
        planner: QueryPlanner::new(config.transfer.preview_limit),
        importer: Arc::new(ImportService::new(config.import_options())),
        upload_limit: config.storage.max_upload_bytes,
        shutdown: shutdown.clone(),
    };

    // Create router with state
    let app = create_router_with_state(state);

    // Start server
    let addr: SocketAddr = config.server_address().parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}

/// Wait for ctrl-c, then cancel running imports.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown requested, cancelling running imports");
    shutdown.cancel();
}
