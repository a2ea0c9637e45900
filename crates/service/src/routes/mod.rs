//! HTTP/WebSocket route tree. Mirrors the teacher's split between
//! unauthenticated "public" routes (health check) and bearer-token
//! "protected" routes behind [`crate::auth::require_bearer_token`].

pub mod alerts;
pub mod chat;
pub mod sessions;
pub mod ws;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/health", get(health));

    let protected = Router::new()
        .route("/alerts", post(alerts::submit_alert))
        .route("/sessions", get(sessions::list_sessions))
        .route("/sessions/:id", get(sessions::get_session))
        .route("/sessions/:id/stages", get(sessions::get_stages))
        .route("/sessions/:id/cancel", post(sessions::cancel_session))
        .route("/sessions/:id/resume", post(sessions::resume_session))
        .route("/sessions/:id/chat", post(chat::post_message))
        .route("/chats/executions/:exec_id/cancel", post(chat::cancel_chat))
        .route("/ws", get(ws::ws_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), crate::auth::require_bearer_token));

    public.merge(protected).with_state(state)
}
