//! Axum server setup

use crate::{api, error::WebError, state::AppState, ServerConfig};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the API router over the given state
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.limits.max_body_bytes;

    Router::new()
        // Public ingest: snippets post cross-origin from monitored sites
        .route(
            "/api/ingest",
            post(api::ingest_heartbeat).layer(CorsLayer::permissive()),
        )
        // Site endpoints (organization from x-org-id)
        .route("/api/sites", get(api::list_sites).post(api::create_site))
        .route(
            "/api/sites/:id",
            get(api::get_site)
                .put(api::update_site)
                .delete(api::delete_site),
        )
        .route("/api/sites/:id/status", get(api::get_site_status))
        .route("/api/sites/:id/heartbeats", get(api::get_site_heartbeats))
        // Health check
        .route("/api/health", get(api::health))
        .fallback(|uri: axum::http::Uri| async move {
            WebError::Rejected(
                axum::http::StatusCode::NOT_FOUND,
                format!("No route for {}", uri.path()),
            )
        })
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the store, bind, and serve until Ctrl-C
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error + Send>> {
    tracing::info!(database = %config.database, "Starting Pixelwatch API server");

    let state = AppState::new(&config).await?;
    tracing::info!("Application state initialized");

    let app = build_router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send>)?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send>)?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
