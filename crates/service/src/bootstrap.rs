//! Sequential subsystem construction, mirroring the teacher's
//! `run_server()`: each step logs as it completes so a failed startup
//! shows exactly how far it got.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tarsy_chain::{BusEventSink, ChainExecutor, RepositoryHistorySink, ResumeCoordinator};
use tarsy_domain::config::Config;
use tarsy_domain::error::Result;
use tarsy_events::EventBus;
use tarsy_history::{HistoryRepository, StageExecutionManager};
use tarsy_hooks::{FailureTracker, StageExecutionHookContext};
use tarsy_mcp::McpManager;

use crate::cancel::CancellationRegistry;
use crate::dedupe::AlertDedupeCache;
use crate::llm_client::RoleResolvers;
use crate::state::AppState;

/// Env var holding the bearer token clients must present. Unset = dev
/// mode, all routes unauthenticated (mirrors the teacher's
/// `SA_API_TOKEN` / no-token-configured behavior).
pub const API_TOKEN_ENV: &str = "TARSY_API_TOKEN";

pub async fn build_app_state(config: Config) -> Result<AppState> {
    let config = Arc::new(config);

    tracing::info!("connecting history database");
    let history = Arc::new(HistoryRepository::connect(&config.database).await?);

    tracing::info!("connecting event bus");
    let event_pool = tarsy_events::connect(&config.database.url, config.database.pool_size).await?;
    let events = EventBus::new(event_pool, config.database.backend);

    tracing::info!(servers = config.mcp.servers.len(), "starting MCP servers");
    let mcp = Arc::new(if config.mcp.servers.is_empty() {
        McpManager::empty()
    } else {
        McpManager::from_config(&config.mcp).await
    });

    let stage_mgr = Arc::new(StageExecutionManager::new(history.clone()));
    let stage_hooks = Arc::new(StageExecutionHookContext::new(
        Arc::new(RepositoryHistorySink::new(history.clone())),
        Arc::new(BusEventSink::new(events.clone())),
        Arc::new(FailureTracker::new()),
    ));

    let tool_timeout = config
        .mcp
        .servers
        .iter()
        .map(|s| Duration::from_millis(s.call_timeout_ms))
        .max()
        .unwrap_or(Duration::from_millis(70_000));

    let executor = Arc::new(ChainExecutor::new(history.clone(), stage_mgr, mcp.clone(), stage_hooks, tool_timeout));
    let resume = Arc::new(ResumeCoordinator::new(history.clone(), events.clone()));

    tracing::info!(roles = config.llm.roles.len(), "resolving LLM role clients");
    let llm = Arc::new(RoleResolvers::build(&config.llm)?);

    let dedupe = Arc::new(AlertDedupeCache::new(&config.sessions.dedupe));
    let session_cancel = Arc::new(CancellationRegistry::default());
    let chat_cancel = Arc::new(CancellationRegistry::default());

    let api_token_hash = std::env::var(API_TOKEN_ENV).ok().map(|token| crate::auth::hash_token(&token));
    if api_token_hash.is_none() {
        tracing::warn!("{API_TOKEN_ENV} is not set; API authentication is disabled (dev mode)");
    }

    let state = AppState {
        config,
        history,
        events,
        mcp,
        executor,
        resume,
        llm,
        dedupe,
        session_cancel,
        chat_cancel,
        api_token_hash,
        shutdown_in_progress: Arc::new(AtomicBool::new(false)),
    };

    spawn_background_tasks(state.clone());
    Ok(state)
}

/// Periodic maintenance tasks, spawned once at startup and left running
/// for the process lifetime. Mirrors the teacher's pattern of one
/// `tokio::spawn` + `tokio::time::interval` loop per concern.
fn spawn_background_tasks(state: AppState) {
    tokio::spawn(tarsy_mcp::health::run(
        state.mcp.clone(),
        state.config.mcp.health_check_interval_ms,
        state.config.mcp.health_probe_timeout_ms,
    ));

    tokio::spawn({
        let state = state.clone();
        async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                if let Err(e) = sweep_orphaned_sessions(&state).await {
                    tracing::warn!(error = %e, "orphaned-session sweep failed");
                }
            }
        }
    });

    tokio::spawn({
        let state = state.clone();
        async move {
            let mut interval = tokio::time::interval(Duration::from_secs(3600));
            loop {
                interval.tick().await;
                let now_us = chrono::Utc::now().timestamp_micros();
                match state.history.apply_retention(now_us, state.config.sessions.retention_days).await {
                    Ok(deleted) if deleted > 0 => tracing::info!(deleted, "retention sweep removed old sessions"),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "retention sweep failed"),
                }
            }
        }
    });
}

async fn sweep_orphaned_sessions(state: &AppState) -> Result<()> {
    let now_us = chrono::Utc::now().timestamp_micros();
    let orphaned = state
        .history
        .find_orphaned_sessions(now_us, state.config.sessions.cleanup_orphaned_timeout_min)
        .await?;
    for session in orphaned {
        tracing::warn!(session_id = %session.session_id, "marking orphaned session as failed");
        state
            .history
            .update_session_status(&session.session_id, tarsy_domain::model::SessionStatus::Failed, Some(now_us))
            .await?;
        let sink = BusEventSink::new(state.events.clone());
        let _ = sink
            .publish_session_event(
                &session.session_id,
                tarsy_domain::model::EventPayload::SessionFailed {
                    session_id: session.session_id.clone(),
                    error_message: "session orphaned: exceeded cleanup_orphaned_timeout_min with no progress".into(),
                },
            )
            .await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_app_state_succeeds_with_default_config() {
        let mut config = Config::default();
        config.database.url = "sqlite::memory:".into();
        config.database.pool_size = 1;
        config.llm.providers.push(tarsy_domain::config::ProviderConfig {
            id: "openai".into(),
            kind: tarsy_domain::config::ProviderKind::OpenaiCompat,
            base_url: "https://api.openai.com/v1".into(),
            auth: tarsy_domain::config::AuthConfig {
                mode: tarsy_domain::config::AuthMode::None,
                env: None,
                key: None,
                keys: vec![],
            },
            default_model: None,
        });
        config.llm.roles.insert(
            "investigation".into(),
            tarsy_domain::config::RoleConfig { model: "openai/gpt-4o".into(), require_tools: false, require_native_thinking: false },
        );

        let state = build_app_state(config).await;
        assert!(state.is_ok());
    }
}
