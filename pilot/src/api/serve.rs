//! Control API server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::handlers::{
    clean_handler, deploy_handler, events_handler, health_handler, port_handler, reload_handler,
    start_handler, status_handler, stop_handler, version_handler,
};
use crate::app::options::ApiOptions;
use crate::app::state::AppState;
use crate::errors::PilotError;

/// Build the API router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Server
        .route("/status", get(status_handler))
        .route("/start", post(start_handler))
        .route("/stop", post(stop_handler))
        .route("/reload", post(reload_handler))
        .route("/clean", post(clean_handler))
        .route("/port", post(port_handler))
        // Project
        .route("/deploy", post(deploy_handler))
        // Event feed
        .route("/events", get(events_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the API server
pub async fn serve(
    options: &ApiOptions,
    state: Arc<AppState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), PilotError>>, PilotError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting control API on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| PilotError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| PilotError::ServerError(e.to_string()))
    });

    Ok(handle)
}
