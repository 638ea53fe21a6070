//! REST + WebSocket host surface for wizard sessions and the conversation
//! replay.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::controller::{WizardController, WizardEvent};
use super::registry::SessionRegistry;
use crate::error::WizardError;
use crate::replay::{self, ReplayEvent};

/// Shared state for wizard routes.
#[derive(Clone)]
pub struct WizardRouteState {
    pub registry: Arc<SessionRegistry>,
}

/// Build the wizard and replay routes.
pub fn wizard_routes(registry: Arc<SessionRegistry>) -> Router {
    let state = WizardRouteState { registry };

    Router::new()
        .route("/health", get(health))
        .route("/api/steps", get(list_steps))
        .route("/api/applications", post(open_application))
        .route(
            "/api/applications/{id}",
            get(get_application).delete(close_application),
        )
        .route("/api/applications/{id}/fields/{field}", put(set_field))
        .route(
            "/api/applications/{id}/fields/{field}/toggle",
            post(toggle_field),
        )
        .route("/api/applications/{id}/advance", post(advance))
        .route("/api/applications/{id}/retreat", post(retreat))
        .route("/api/applications/{id}/submit", post(submit))
        .route("/api/applications/{id}/retry", post(retry))
        .route("/api/applications/{id}/ws", get(events_ws))
        .route("/ws/replay", get(replay_ws))
        .with_state(state)
}

// ── Errors ──────────────────────────────────────────────────────────────

impl IntoResponse for WizardError {
    fn into_response(self) -> Response {
        let status = match self {
            WizardError::SessionNotFound(_) | WizardError::SessionClosed(_) => {
                StatusCode::NOT_FOUND
            }
            WizardError::UnknownField(_) | WizardError::FieldKindMismatch { .. } => {
                StatusCode::BAD_REQUEST
            }
            WizardError::NavigationUnavailable { .. }
            | WizardError::NotOnFinalStep { .. }
            | WizardError::SubmissionInFlight
            | WizardError::SessionLocked { .. }
            | WizardError::IncompleteApplication { .. }
            | WizardError::NothingToRetry(_) => StatusCode::CONFLICT,
        };
        (status, Json(serde_json::json!({"error": self.to_string()}))).into_response()
    }
}

fn parse_id(id: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(id).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Invalid application ID"})),
        )
            .into_response()
    })
}

async fn lookup(state: &WizardRouteState, id: &str) -> Result<Arc<WizardController>, Response> {
    let id = parse_id(id)?;
    state
        .registry
        .get(id)
        .await
        .map_err(IntoResponse::into_response)
}

/// Respond with the session view after a successful operation.
async fn view_response(controller: &WizardController, status: StatusCode) -> Response {
    (status, Json(controller.view().await)).into_response()
}

// ── Health / catalog ────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "concierge-apply"
    }))
}

async fn list_steps(State(state): State<WizardRouteState>) -> impl IntoResponse {
    Json(serde_json::json!(state.registry.catalog()))
}

// ── Session lifecycle ───────────────────────────────────────────────────

async fn open_application(State(state): State<WizardRouteState>) -> Response {
    let controller = state.registry.open().await;
    view_response(&controller, StatusCode::CREATED).await
}

async fn get_application(
    State(state): State<WizardRouteState>,
    Path(id): Path<String>,
) -> Response {
    match lookup(&state, &id).await {
        Ok(controller) => view_response(&controller, StatusCode::OK).await,
        Err(resp) => resp,
    }
}

async fn close_application(
    State(state): State<WizardRouteState>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.registry.close(id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "closed"})),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

// ── Fields ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct FieldRequest {
    value: String,
}

async fn set_field(
    State(state): State<WizardRouteState>,
    Path((id, field)): Path<(String, String)>,
    Json(body): Json<FieldRequest>,
) -> Response {
    let controller = match lookup(&state, &id).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match controller.set_scalar(&field, body.value).await {
        Ok(()) => view_response(&controller, StatusCode::OK).await,
        Err(e) => e.into_response(),
    }
}

async fn toggle_field(
    State(state): State<WizardRouteState>,
    Path((id, field)): Path<(String, String)>,
    Json(body): Json<FieldRequest>,
) -> Response {
    let controller = match lookup(&state, &id).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match controller.toggle_in_set(&field, &body.value).await {
        Ok(_) => view_response(&controller, StatusCode::OK).await,
        Err(e) => e.into_response(),
    }
}

// ── Navigation / submission ─────────────────────────────────────────────

async fn advance(State(state): State<WizardRouteState>, Path(id): Path<String>) -> Response {
    let controller = match lookup(&state, &id).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match controller.advance().await {
        Ok(_) => view_response(&controller, StatusCode::OK).await,
        Err(e) => e.into_response(),
    }
}

async fn retreat(State(state): State<WizardRouteState>, Path(id): Path<String>) -> Response {
    let controller = match lookup(&state, &id).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match controller.retreat().await {
        Ok(_) => view_response(&controller, StatusCode::OK).await,
        Err(e) => e.into_response(),
    }
}

/// Accepts the submission and answers 202 while the gateway works. The
/// outcome arrives on the event stream and in later views.
async fn submit(State(state): State<WizardRouteState>, Path(id): Path<String>) -> Response {
    let controller = match lookup(&state, &id).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match controller.start_submit().await {
        Ok(_pending) => view_response(&controller, StatusCode::ACCEPTED).await,
        Err(e) => e.into_response(),
    }
}

async fn retry(State(state): State<WizardRouteState>, Path(id): Path<String>) -> Response {
    let controller = match lookup(&state, &id).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match controller.start_retry().await {
        Ok(_pending) => view_response(&controller, StatusCode::ACCEPTED).await,
        Err(e) => e.into_response(),
    }
}

// ── WebSocket: session events ───────────────────────────────────────────

async fn events_ws(
    ws: WebSocketUpgrade,
    State(state): State<WizardRouteState>,
    Path(id): Path<String>,
) -> Response {
    let controller = match lookup(&state, &id).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    ws.on_upgrade(move |socket| stream_events(socket, controller))
}

async fn stream_events(mut socket: WebSocket, controller: Arc<WizardController>) {
    let session_id = controller.id();
    info!(session_id = %session_id, "Event stream connected");

    let mut rx = controller.subscribe();

    // Current view first so the client can render immediately.
    let view = controller.view().await;
    if let Ok(json) = serde_json::to_string(&serde_json::json!({"type": "sync", "view": view})) {
        if socket.send(Message::Text(json.into())).await.is_err() {
            return;
        }
    }
    drop(controller);

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        let last = matches!(event, WizardEvent::Closed { .. });
                        if let Ok(json) = serde_json::to_string(&event) {
                            if socket.send(Message::Text(json.into())).await.is_err() {
                                debug!(session_id = %session_id, "Client disconnected during send");
                                break;
                            }
                        }
                        if last {
                            let _ = socket.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(session_id = %session_id, missed = n, "Event stream lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(session_id = %session_id, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!(session_id = %session_id, "Event stream closed");
}

// ── WebSocket: conversation replay ──────────────────────────────────────

async fn replay_ws(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(stream_replay)
}

async fn stream_replay(mut socket: WebSocket) {
    // Dropping the handle on any exit path cancels the remaining cues.
    let (_handle, mut rx) = replay::play(replay::concierge_script());

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                let finished = event == ReplayEvent::Finished;
                if let Ok(json) = serde_json::to_string(&event) {
                    if socket.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                if finished {
                    break;
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                        debug!("Replay client left early");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}
