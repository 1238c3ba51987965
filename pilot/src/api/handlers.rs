//! Control API handlers

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures::stream::{self, Stream};
use pilot_api::{
    ActionResponse, DeployRequest, HealthResponse, PortRequest, StatusResponse, VersionResponse,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::app::action::{perform_response, Action};
use crate::app::state::AppState;
use crate::deploy::strategy::StrategyChoice;
use crate::utils::version_info;

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "catpilot".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Server status handler
pub async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let server_state = state.tomcat.status().await;
    Json(StatusResponse {
        state: server_state.as_str().to_string(),
        port: state.tomcat.port().await,
        app_name: Some(state.app_name().to_string()),
        deploy_in_flight: state.deployer.in_flight(),
    })
}

/// Deploy handler, `prompt` when no strategy is given
pub async fn deploy_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeployRequest>,
) -> Result<Json<ActionResponse>, (StatusCode, Json<ActionResponse>)> {
    let strategy = request.strategy.unwrap_or_else(|| "prompt".to_string());
    let choice = strategy.parse::<StrategyChoice>().map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ActionResponse::failed("deploy", e)),
        )
    })?;
    Ok(Json(perform_response(&state, Action::Deploy(choice)).await))
}

pub async fn start_handler(State(state): State<Arc<AppState>>) -> Json<ActionResponse> {
    Json(perform_response(&state, Action::Start).await)
}

pub async fn stop_handler(State(state): State<Arc<AppState>>) -> Json<ActionResponse> {
    Json(perform_response(&state, Action::Stop).await)
}

pub async fn reload_handler(State(state): State<Arc<AppState>>) -> Json<ActionResponse> {
    Json(perform_response(&state, Action::Reload).await)
}

pub async fn clean_handler(State(state): State<Arc<AppState>>) -> Json<ActionResponse> {
    Json(perform_response(&state, Action::Clean).await)
}

pub async fn port_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PortRequest>,
) -> Json<ActionResponse> {
    Json(perform_response(&state, Action::Port(request.port)).await)
}

/// Server-sent event stream of log events
pub async fn events_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.sink.subscribe();

    let events = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let sse = Event::default()
                        .event(event.level.as_str())
                        .json_data(&event)
                        .unwrap_or_else(|_| Event::default().data(event.message.clone()));
                    return Some((Ok(sse), receiver));
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
