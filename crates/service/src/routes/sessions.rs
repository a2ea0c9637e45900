//! Session read/control endpoints: list, get, list stages, cancel,
//! resume (spec.md §6).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use tarsy_domain::model::SessionStatus;
use tarsy_history::SessionFilter;

use crate::state::AppState;

use super::api_error;

#[derive(Debug, Deserialize, Default)]
pub struct ListSessionsQuery {
    alert_type: Option<String>,
    status: Option<String>,
    q: Option<String>,
    #[serde(default)]
    limit: u32,
}

fn parse_status(raw: &str) -> Option<SessionStatus> {
    match raw {
        "pending" => Some(SessionStatus::Pending),
        "in_progress" => Some(SessionStatus::InProgress),
        "completed" => Some(SessionStatus::Completed),
        "failed" => Some(SessionStatus::Failed),
        "paused" => Some(SessionStatus::Paused),
        "cancelled" => Some(SessionStatus::Cancelled),
        _ => None,
    }
}

pub async fn list_sessions(State(state): State<AppState>, Query(q): Query<ListSessionsQuery>) -> impl IntoResponse {
    let filter = SessionFilter {
        alert_type: q.alert_type,
        status: q.status.as_deref().and_then(parse_status),
        text_query: q.q,
        limit: q.limit,
    };
    match state.history.list_sessions(&filter).await {
        Ok(sessions) => Json(serde_json::json!({ "sessions": sessions })).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.history.get_session(&id).await {
        Ok(Some(session)) => Json(session).into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, format!("session {id} not found")),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn get_stages(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.history.list_stage_executions(&id).await {
        Ok(stages) => Json(serde_json::json!({ "stages": stages })).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn cancel_session(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    if state.session_cancel.cancel(&id) {
        Json(serde_json::json!({ "cancelled": true })).into_response()
    } else {
        api_error(StatusCode::NOT_FOUND, format!("session {id} is not currently running"))
    }
}

/// Kicks off [`crate::alert_service::resume_session`] in a background
/// task (same fire-and-acknowledge shape as alert submission) and
/// returns immediately.
pub async fn resume_session(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.history.get_session(&id).await {
        Ok(Some(s)) if s.status == SessionStatus::Paused => {}
        Ok(Some(_)) => return api_error(StatusCode::CONFLICT, format!("session {id} is not paused")),
        Ok(None) => return api_error(StatusCode::NOT_FOUND, format!("session {id} not found")),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }

    let session_id = id.clone();
    tokio::spawn(async move {
        if let Err(e) = crate::alert_service::resume_session(state, session_id.clone()).await {
            tracing::error!(session_id = %session_id, error = %e, "resume failed");
        }
    });

    Json(serde_json::json!({ "resumed": true, "session_id": id })).into_response()
}
