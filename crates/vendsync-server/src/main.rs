use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use vendsync_client::{ClientConfig, load_registry};
use vendsync_core::{CrawlConfig, HarvestConfig, SourceRegistry};
use vendsync_db::{Database, DatabaseConfig};
use vendsync_server::routes;
use vendsync_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vendsync=info".parse()?))
        .with_target(false)
        .init();

    let port = std::env::var("VENDSYNC_SERVER_PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{port}");

    let client = ClientConfig::from_env()?;
    let sources = match &client.sources_file {
        Some(path) => load_registry(path)?,
        None => {
            tracing::warn!("VENDSYNC_SOURCES_FILE not set, no crawl sources registered");
            SourceRegistry::new()
        }
    };
    tracing::info!(sources = ?sources.names(), "Crawl sources loaded");

    let db = Database::connect(&DatabaseConfig::from_env()?).await?;
    db.migrate().await?;

    let state = Arc::new(AppState::new(
        db,
        sources,
        &client,
        CrawlConfig::from_env()?,
        HarvestConfig::from_env()?,
    )?);
    let shutdown = state.shutdown.clone();

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("Starting server on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install CTRL+C handler: {e}");
    }
    tracing::info!("Shutdown signal received, cancelling running harvests");
    shutdown.cancel();
}
