//! Alert orchestrator (spec.md §4.H): validates the payload, resolves a
//! chain, creates the session, downloads the runbook, and delegates to
//! [`tarsy_chain::ChainExecutor`]. On a terminal outcome it formats the
//! Markdown report and — for completed sessions only — a short
//! LLM-summarized `final_analysis_summary`.

use std::collections::HashMap;

use serde::Deserialize;

use tarsy_chain::{ChainContext, LlmResolver};
use tarsy_domain::error::{Error, Result};
use tarsy_domain::model::{ConversationMessage, ConversationRole, EventPayload, ResultStatus, Session, SessionStatus};

use crate::report;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AlertRequest {
    pub alert_type: String,
    #[serde(default)]
    pub alert_data: serde_json::Value,
    #[serde(default)]
    pub runbook_url: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
}

pub struct AlertAccepted {
    pub alert_id: String,
    pub session_id: String,
}

fn now_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

/// Runs the full orchestration flow to completion and returns the
/// `{alert_id, session_id}` the caller already has (the session itself
/// keeps running/updating asynchronously up to this point — this
/// function *is* that run, called from a spawned task by the route
/// handler so the HTTP response can return immediately after session
/// creation).
pub async fn process_alert(state: AppState, alert_id: String, session_id: String, request: AlertRequest) -> Result<AlertAccepted> {
    if request.alert_type.trim().is_empty() {
        return Err(Error::Configuration("alert_type is required".into()));
    }

    let chain = state
        .config
        .chains
        .resolve(&request.alert_type)
        .cloned()
        .ok_or_else(|| Error::Configuration(format!("no chain configured for alert_type '{}'", request.alert_type)))?;

    let chain_config_json = serde_json::to_value(&chain).map_err(Error::Json)?;

    let mut alert_data = request.alert_data.clone();
    if let (Some(obj), Some(severity)) = (alert_data.as_object_mut(), &request.severity) {
        obj.entry("severity").or_insert_with(|| serde_json::json!(severity));
    }

    let mut session = Session::new(&session_id, &request.alert_type, alert_data, chain_config_json);
    session.runbook_url = request.runbook_url.clone();
    session.started_at_us = Some(now_us());
    session.status = SessionStatus::Pending;

    state.history.create_session(&session).await?;
    publish_session_event(&state, EventPayload::SessionCreated { session_id: session_id.clone() }).await;

    let runbook_text = match &request.runbook_url {
        Some(url) => match download_runbook(url).await {
            Ok(text) => Some(text),
            Err(e) => {
                fail_session(&state, &mut session, "no runbook", &e.to_string()).await?;
                return Ok(AlertAccepted { alert_id, session_id });
            }
        },
        None => None,
    };

    state.history.update_session_status(&session_id, SessionStatus::InProgress, None).await?;
    publish_session_event(&state, EventPayload::SessionStarted { session_id: session_id.clone() }).await;

    let flags = state.session_cancel.register(&session_id);
    let mut chain_ctx = ChainContext::new(session.alert_data.clone(), runbook_text);

    let llm = match state.llm.get("investigation") {
        Some(r) => r,
        None => {
            fail_session(&state, &mut session, "configuration error", "llm role 'investigation' is not configured").await?;
            return Ok(AlertAccepted { alert_id, session_id });
        }
    };

    let result = state
        .executor
        .execute(
            &session_id,
            &chain,
            &state.config.agents,
            llm as &dyn LlmResolver,
            flags.paused.clone(),
            flags.cancelled.clone(),
            &mut chain_ctx,
            now_us(),
        )
        .await;
    state.session_cancel.remove(&session_id);

    match result {
        Ok(outcome) => finish_session(&state, &mut session, &chain.chain_id, chain.stages.len(), outcome).await?,
        Err(e) => fail_session(&state, &mut session, "processing error", &e.to_string()).await?,
    }

    Ok(AlertAccepted { alert_id, session_id })
}

async fn finish_session(
    state: &AppState,
    session: &mut Session,
    chain_id: &str,
    stage_count: usize,
    outcome: tarsy_chain::ChainExecutionResult,
) -> Result<()> {
    let now = now_us();
    match outcome.status {
        ResultStatus::Completed => {
            let analysis_text = outcome.final_analysis.unwrap_or_else(|| "No analysis produced.".into());
            let report = report::completed_report(session, chain_id, &analysis_text, stage_count);
            let summary = summarize(state, &analysis_text).await.ok();

            state.history.update_session_status(&session.session_id, SessionStatus::Completed, Some(now)).await?;
            state.history.set_final_analysis(&session.session_id, &report, summary.as_deref()).await?;
            publish_session_event(state, EventPayload::SessionCompleted { session_id: session.session_id.clone() }).await;
        }
        ResultStatus::Failed => {
            let message = outcome.final_analysis.unwrap_or_else(|| "stage execution failed".into());
            fail_session(state, session, "processing error", &message).await?;
        }
        ResultStatus::Cancelled => {
            state.history.update_session_status(&session.session_id, SessionStatus::Cancelled, Some(now)).await?;
            publish_session_event(state, EventPayload::SessionCancelled { session_id: session.session_id.clone() }).await;
        }
        ResultStatus::Paused => {
            state.history.update_session_status(&session.session_id, SessionStatus::Paused, None).await?;
            publish_session_event(state, EventPayload::SessionPaused { session_id: session.session_id.clone() }).await;
        }
    }
    Ok(())
}

async fn fail_session(state: &AppState, session: &mut Session, title: &str, message: &str) -> Result<()> {
    let now = now_us();
    let report = report::error_report(session, message, &report::default_troubleshooting_steps());
    state.history.update_session_status(&session.session_id, SessionStatus::Failed, Some(now)).await?;
    state.history.set_final_analysis(&session.session_id, &report, None).await?;
    publish_session_event(
        state,
        EventPayload::SessionFailed { session_id: session.session_id.clone(), error_message: format!("{title}: {message}") },
    )
    .await;
    Ok(())
}

async fn publish_session_event(state: &AppState, payload: EventPayload) {
    let session_id = payload.session_id().to_owned();
    let sink = tarsy_chain::BusEventSink::new(state.events.clone());
    if let Err(e) = sink.publish_session_event(&session_id, payload).await {
        tracing::warn!(error = %e, "failed to publish session event");
    }
}

async fn download_runbook(url: &str) -> Result<String> {
    let resp = reqwest::get(url).await.map_err(|e| Error::Other(format!("downloading runbook: {e}")))?;
    if !resp.status().is_success() {
        return Err(Error::Other(format!("runbook fetch returned status {}", resp.status())));
    }
    resp.text().await.map_err(|e| Error::Other(format!("reading runbook body: {e}")))
}

/// Short bounded-token summarization call for a completed session's
/// final analysis, via the `summarization` LLM role. Best-effort: a
/// failure here never fails the session (spec.md §4.H step 7).
async fn summarize(state: &AppState, analysis_text: &str) -> Result<String> {
    let resolver = state.llm.get("summarization").ok_or_else(|| Error::Configuration("llm role 'summarization' is not configured".into()))?;
    let (client, _kind) = resolver.resolve("summarizer");
    let conversation = vec![
        ConversationMessage {
            role: ConversationRole::System,
            content: "Summarize the following incident analysis in one or two sentences.".into(),
        },
        ConversationMessage { role: ConversationRole::User, content: analysis_text.to_owned() },
    ];
    let completion = client.complete(&conversation).await?;
    Ok(completion.content)
}

/// Agent factory per spec.md §4.H step 5: resolves which agents are
/// allowed to run a chain's stages. Instantiation itself is lazy inside
/// `ChainExecutor`/`run_agent_stage`; this just validates every stage's
/// `agent` reference resolves against the configured agent map before
/// execution starts.
pub fn validate_agent_references(
    chain: &tarsy_domain::config::ChainConfig,
    agents: &HashMap<String, tarsy_domain::config::AgentConfig>,
) -> Result<()> {
    for stage in &chain.stages {
        let names = match stage.resolve_children() {
            Some(children) => children.into_iter().map(|c| c.agent).collect::<Vec<_>>(),
            None => stage.agent.clone().into_iter().collect(),
        };
        for name in names {
            if !agents.contains_key(&name) {
                return Err(Error::Configuration(format!("stage '{}' references unknown agent '{name}'", stage.name)));
            }
        }
    }
    Ok(())
}

/// Lets the cooperative cancellation check in an active controller raise
/// `AgentCancelled` at its next check point (spec.md §5).
pub fn cancel_session(state: &AppState, session_id: &str) -> bool {
    state.session_cancel.cancel(session_id)
}

/// Reactivates a paused session via [`tarsy_chain::ResumeCoordinator`].
/// Owns `state` for its whole lifetime so it can be driven from a
/// detached `tokio::spawn` the same way [`process_alert`] is, without
/// borrowing anything tied to the route handler's stack frame.
pub async fn resume_session(state: AppState, session_id: String) -> Result<()> {
    let session = state
        .history
        .get_session(&session_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("session {session_id} not found")))?;

    let chain = state
        .config
        .chains
        .resolve(&session.alert_type)
        .cloned()
        .ok_or_else(|| Error::Configuration(format!("no chain configured for alert_type '{}'", session.alert_type)))?;
    let llm = state
        .llm
        .get("investigation")
        .ok_or_else(|| Error::Configuration("llm role 'investigation' is not configured".into()))?;

    let now_us = now_us();
    state
        .resume
        .resume_paused_session(&session_id, &chain, &state.config.agents, llm, &state.executor, now_us)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarsy_domain::config::{AgentConfig, ChainConfig, StageConfig};

    #[test]
    fn validate_agent_references_passes_for_known_agents() {
        let mut agents = HashMap::new();
        agents.insert("kubernetes-agent".to_string(), AgentConfig::default());
        let chain = ChainConfig {
            chain_id: "c1".into(),
            alert_types: vec!["kubernetes".into()],
            stages: vec![StageConfig { name: "investigate".into(), agent: Some("kubernetes-agent".into()), parallel: None }],
        };
        assert!(validate_agent_references(&chain, &agents).is_ok());
    }

    #[test]
    fn validate_agent_references_fails_for_unknown_agent() {
        let agents = HashMap::new();
        let chain = ChainConfig {
            chain_id: "c1".into(),
            alert_types: vec![],
            stages: vec![StageConfig { name: "investigate".into(), agent: Some("missing-agent".into()), parallel: None }],
        };
        assert!(validate_agent_references(&chain, &agents).is_err());
    }

    #[test]
    fn alert_request_requires_alert_type_at_process_time() {
        // Exercised indirectly via process_alert's validation branch;
        // constructing the full AppState needs a live DB/bus, covered
        // by the routes integration tests instead.
        let req = AlertRequest { alert_type: "   ".into(), alert_data: serde_json::json!({}), runbook_url: None, severity: None };
        assert!(req.alert_type.trim().is_empty());
    }
}
