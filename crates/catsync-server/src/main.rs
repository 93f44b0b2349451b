//! Catalog Sync Server - Main entry point

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use catsync_common::logging::{init_logging, LogConfig};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tracing::info;

use catsync_server::{
    config::Config,
    db, features, middleware,
    sync::{
        HttpErpSource, PgCatalogStore, PgSyncLogStore, SyncLogStore, SyncOrchestrator, SyncQueue,
        SyncWorker,
    },
};

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    db: sqlx::PgPool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Environment variables take precedence over these defaults
    let log_config = LogConfig::builder()
        .log_file_prefix("catsync-server")
        .filter_directives("catsync_server=debug,tower_http=debug,sqlx=info")
        .build()
        .with_env()?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_logging(&log_config)?;

    info!("Starting Catalog Sync Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let db_pool = db::create_pool(&config.database).await?;
    info!("Database connection pool established");

    db::run_migrations(&db_pool).await?;

    let runs: Arc<dyn SyncLogStore> = Arc::new(PgSyncLogStore::new(db_pool.clone()));

    // Start the sync worker if enabled
    let (queue, worker) = if config.sync.enabled {
        let erp = Arc::new(HttpErpSource::new(&config.sync.erp)?);
        let catalog = Arc::new(PgCatalogStore::new(db_pool.clone()));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::clone(&runs),
            erp,
            catalog,
            config.sync.page_size,
        ));

        let worker = SyncWorker::new(orchestrator, Duration::from_secs(config.sync.job_timeout_secs));
        worker.recover().await?;

        let (queue, rx) = SyncQueue::channel(config.sync.queue_capacity);
        let handle = worker.start(rx);
        info!(
            page_size = config.sync.page_size,
            erp = %config.sync.erp.base_url,
            "Sync worker started successfully"
        );
        (Some(queue), Some(handle))
    } else {
        info!("Sync is disabled (SYNC_ENABLED=false)");
        (None, None)
    };

    let state = AppState { db: db_pool };

    let app = create_router(state, features::FeatureState { runs, queue });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Serving consumes the router, so the queue senders are gone once it returns
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(worker) = worker {
        let timeout = Duration::from_secs(config.server.shutdown_timeout_secs);
        if tokio::time::timeout(timeout, worker.shutdown()).await.is_err() {
            tracing::error!("Sync worker did not stop within {}s", timeout.as_secs());
        }
    }

    info!("Server shut down gracefully");

    Ok(())
}

/// Create the application router with all routes and middleware
fn create_router(state: AppState, feature_state: features::FeatureState) -> Router {
    let feature_routes = features::router(feature_state);

    Router::new()
        .route("/health", get(health_check))
        .with_state(state)
        .nest("/api/v1", feature_routes)
        // Apply layers from innermost to outermost
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
}

/// Health check handler
async fn health_check(State(state): State<AppState>) -> Result<Response, StatusCode> {
    match db::health_check(&state.db).await {
        Ok(()) => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected"
            })),
        )
            .into_response()),
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        },
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let source = tokio::select! {
        _ = ctrl_c => "ctrl_c",
        _ = terminate => "sigterm",
    };
    info!(signal = source, "Shutdown requested, draining connections and stopping sync worker");
}
