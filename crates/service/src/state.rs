//! Shared application state passed to every HTTP/WebSocket handler.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tarsy_domain::config::Config;
use tarsy_events::EventBus;
use tarsy_history::HistoryRepository;
use tarsy_mcp::McpManager;

use crate::cancel::CancellationRegistry;
use crate::dedupe::AlertDedupeCache;
use crate::llm_client::RoleResolvers;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub history: Arc<HistoryRepository>,
    pub events: Arc<EventBus>,
    pub mcp: Arc<McpManager>,
    pub executor: Arc<tarsy_chain::ChainExecutor>,
    pub resume: Arc<tarsy_chain::ResumeCoordinator>,
    pub llm: Arc<RoleResolvers>,

    /// Alert-id resubmission cache (API boundary; spec.md §4.H).
    pub dedupe: Arc<AlertDedupeCache>,
    /// `session_id` -> cancellation/pause flags for running sessions.
    pub session_cancel: Arc<CancellationRegistry>,
    /// `exec_id` -> cancellation flag for running chat executions.
    pub chat_cancel: Arc<CancellationRegistry>,

    /// SHA-256 digest of the configured bearer token. `None` = dev mode.
    pub api_token_hash: Option<Vec<u8>>,
    /// Set by the shutdown signal handler; new alert/chat submissions are
    /// rejected with "retry after 30s" while this is true (spec.md §5).
    pub shutdown_in_progress: Arc<AtomicBool>,
}
