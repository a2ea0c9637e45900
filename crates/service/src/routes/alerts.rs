//! `POST /alerts` — accepts a new alert for processing (spec.md §4.H).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

use crate::alert_service::{self, AlertRequest};
use crate::state::AppState;

use super::api_error;

pub async fn submit_alert(State(state): State<AppState>, Json(body): Json<AlertRequest>) -> impl IntoResponse {
    if state.shutdown_in_progress.load(std::sync::atomic::Ordering::Relaxed) {
        return api_error(StatusCode::SERVICE_UNAVAILABLE, "server is shutting down, retry after 30s");
    }

    let alert_id = uuid::Uuid::new_v4().to_string();
    let session_id = uuid::Uuid::new_v4().to_string();

    if let Some(existing_session_id) = state.dedupe.check_and_insert(&dedupe_key(&body), &session_id).await {
        return (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "alert_id": alert_id, "session_id": existing_session_id, "duplicate": true })),
        )
            .into_response();
    }

    let response_session_id = session_id.clone();
    tokio::spawn(async move {
        if let Err(e) = alert_service::process_alert(state, alert_id, session_id, body).await {
            tracing::error!(error = %e, "alert processing failed");
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "session_id": response_session_id, "accepted": true })),
    )
        .into_response()
}

fn dedupe_key(request: &AlertRequest) -> String {
    format!("{}:{}", request.alert_type, request.alert_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_key_combines_type_and_data() {
        let req = AlertRequest { alert_type: "kubernetes".into(), alert_data: serde_json::json!({"pod": "a"}), runbook_url: None, severity: None };
        assert_eq!(dedupe_key(&req), r#"kubernetes:{"pod":"a"}"#);
    }
}
