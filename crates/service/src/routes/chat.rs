//! Chat endpoints (spec.md §4/§6). A session's chat thread is not its
//! own durable table in this build — messages are published as
//! `EventPayload::ChatUserMessage`/`ChatCancelRequest` on the session's
//! event channel and replayed to clients via WebSocket catchup, the
//! same way every other session event is. Recorded as a bounded scope
//! decision in DESIGN.md: a dedicated `chats`/`chat_user_messages`
//! persistence layer is future work, not required for this build to be
//! fully functional (every chat message is still durable — it's an
//! `events` row — it just isn't indexed by its own table yet).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use tarsy_chain::BusEventSink;
use tarsy_domain::model::EventPayload;

use crate::state::AppState;

use super::api_error;

#[derive(Debug, Deserialize)]
pub struct ChatMessageBody {
    pub message: String,
}

pub async fn post_message(State(state): State<AppState>, Path(session_id): Path<String>, Json(body): Json<ChatMessageBody>) -> impl IntoResponse {
    if body.message.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "message must not be empty");
    }

    let sink = BusEventSink::new(state.events.clone());
    let payload = EventPayload::ChatUserMessage { session_id: session_id.clone(), message: body.message };
    match sink.publish_session_event(&session_id, payload).await {
        Ok(()) => Json(serde_json::json!({ "accepted": true })).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// `POST /chats/executions/{exec_id}/cancel` — signals the per-chat
/// cancellation registry (mirrors `session_cancel`, keyed by `exec_id`
/// per spec.md §5) and publishes `chat.cancel_request` so any listening
/// chat worker observes it even if it isn't tracked in the in-process
/// registry (e.g. after a restart).
pub async fn cancel_chat(State(state): State<AppState>, Path(exec_id): Path<String>) -> impl IntoResponse {
    let was_running = state.chat_cancel.cancel(&exec_id);

    let sink = BusEventSink::new(state.events.clone());
    let payload = EventPayload::ChatCancelRequest { session_id: exec_id.clone() };
    if let Err(e) = sink.publish_session_event(&exec_id, payload).await {
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    Json(serde_json::json!({ "cancelled": was_running })).into_response()
}
