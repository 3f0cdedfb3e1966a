use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{decompression::RequestDecompressionLayer, trace::TraceLayer};
use tracing::info;

use super::{auth::require_token, services, state::AppState};
use crate::config::Config;
use crate::observability::Metrics;
use crate::queue::{QueuePolicy, WorkQueue, spawn_sweeper};
use crate::store::WorkStore;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Build the application router.
///
/// Static segments are registered before `/{item_id}` so they win the match.
pub fn router(state: AppState) -> Router {
    let max_body_bytes = state.config.server.max_body_bytes;
    let max_concurrent = state.config.server.max_concurrent_requests;

    let queue_routes = Router::new()
        .route("/", get(services::list))
        .route("/claim", post(services::claim))
        .route("/report", post(services::report))
        .route("/release", post(services::release))
        .route("/renew", post(services::renew))
        .route("/stats", get(services::stats))
        .route("/diagnostics", get(services::diagnostics))
        .route("/reset-stale", post(services::reset_stale))
        .route("/reset-failed", post(services::reset_failed))
        .route("/retry-ready", post(services::retry_ready))
        .route("/full-scan-reset", post(services::full_scan_reset))
        .route("/ingest", post(services::ingest))
        .route("/{item_id}", get(services::get_item))
        .route("/{item_id}/validity", post(services::set_validity))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .nest("/parser/urls", queue_routes)
        .route("/health", get(services::health))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        // Transparently decompress gzip request bodies
        .layer(RequestDecompressionLayer::new())
        .layer(ConcurrencyLimitLayer::new(max_concurrent))
        .layer(TraceLayer::new_for_http())
}

/// Open the store, start the sweeper and serve until a shutdown signal arrives
pub async fn run(config: Config, address: Option<SocketAddr>) -> Result<(), AnyError> {
    let address = address.unwrap_or(config.server.bind_addr);

    info!(path = %config.server.data_path.display(), "Opening work store");
    let store = WorkStore::open(&config.server.data_path)
        .map_err(|e| format!("Failed to open work store: {}", e))?;

    let metrics = Arc::new(Metrics::new());
    let queue = WorkQueue::new(store, QueuePolicy::from(&config.queue), metrics.clone());

    if config.server.api_token.is_none() {
        tracing::warn!("URLQUEUE_API_TOKEN is not set; queue endpoints are unauthenticated");
    }

    let sweeper = spawn_sweeper(queue.clone(), config.queue.sweep_interval.as_std());

    let state = AppState::new(config, queue.clone(), metrics);
    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "urlqueue API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some((stop, handle)) = sweeper {
        let _ = stop.send(());
        let _ = handle.await;
    }

    tokio::task::spawn_blocking(move || queue.store().persist()).await??;
    info!("Work store flushed");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
