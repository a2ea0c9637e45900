//! Scoped hook contexts for interactions and stage executions.
//!
//! Async Rust has no stable async `Drop`, so these aren't literal RAII
//! guards — callers must explicitly call `complete_success`/
//! `complete_error` (interactions) or `exit` (stage executions) when
//! the scope ends. The naming mirrors the "enter/exit" shape the
//! contract describes.

use std::sync::Arc;

use tarsy_domain::error::{Error, Result};
use tarsy_domain::model::{LlmInteraction, McpInteraction, StageExecution};

use crate::sink::{EventSink, HistorySink};
use crate::tracker::{FailureTracker, HookKind};

/// Runs a hook call, counting consecutive failures and logging (never
/// propagating) errors for non-critical interaction hooks.
async fn run_hook<F>(tracker: &FailureTracker, kind: HookKind, name: &str, fut: F)
where
    F: std::future::Future<Output = Result<()>>,
{
    if tracker.is_disabled(kind) {
        return;
    }
    match fut.await {
        Ok(()) => tracker.record_success(kind),
        Err(e) => {
            tracing::warn!(hook = name, error = %e, "hook invocation failed");
            if tracker.record_failure(kind) {
                tracing::warn!(hook = name, "hook disabled after 5 consecutive failures");
            }
        }
    }
}

/// Scoped recorder for one LLM call: stamps timing, then on completion
/// (success or error) persists the interaction and publishes its event,
/// through the disableable history/event hooks.
pub struct LlmInteractionHookContext {
    interaction: LlmInteraction,
    history: Arc<dyn HistorySink>,
    events: Arc<dyn EventSink>,
    tracker: Arc<FailureTracker>,
}

impl LlmInteractionHookContext {
    pub fn enter(
        mut interaction: LlmInteraction,
        start_time_us: i64,
        history: Arc<dyn HistorySink>,
        events: Arc<dyn EventSink>,
        tracker: Arc<FailureTracker>,
    ) -> Self {
        interaction.start_time_us = start_time_us;
        Self { interaction, history, events, tracker }
    }

    pub async fn complete_success(mut self, end_time_us: i64) -> LlmInteraction {
        self.interaction.end_time_us = Some(end_time_us);
        self.interaction.duration_ms = Some((end_time_us - self.interaction.start_time_us) / 1000);
        self.interaction.timestamp_us = Some(end_time_us);
        self.interaction.success = Some(true);
        self.fire().await;
        self.interaction
    }

    pub async fn complete_error(mut self, end_time_us: i64, error_message: impl Into<String>) -> LlmInteraction {
        self.interaction.end_time_us = Some(end_time_us);
        self.interaction.duration_ms = Some((end_time_us - self.interaction.start_time_us) / 1000);
        self.interaction.timestamp_us = Some(end_time_us);
        self.interaction.success = Some(false);
        self.interaction.error_message = Some(error_message.into());
        self.fire().await;
        self.interaction
    }

    async fn fire(&self) {
        let interaction = &self.interaction;
        run_hook(&self.tracker, HookKind::History, "llm_history", self.history.save_llm_interaction(interaction)).await;
        run_hook(&self.tracker, HookKind::Event, "llm_event", self.events.publish_llm_interaction(interaction)).await;
    }
}

/// Scoped recorder for one MCP call (tool-list or tool-call).
pub struct McpInteractionHookContext {
    interaction: McpInteraction,
    history: Arc<dyn HistorySink>,
    events: Arc<dyn EventSink>,
    tracker: Arc<FailureTracker>,
}

impl McpInteractionHookContext {
    pub fn enter(
        mut interaction: McpInteraction,
        start_time_us: i64,
        history: Arc<dyn HistorySink>,
        events: Arc<dyn EventSink>,
        tracker: Arc<FailureTracker>,
    ) -> Self {
        interaction.start_time_us = start_time_us;
        Self { interaction, history, events, tracker }
    }

    pub async fn complete_success(mut self, end_time_us: i64) -> McpInteraction {
        self.interaction.end_time_us = Some(end_time_us);
        self.interaction.duration_ms = Some((end_time_us - self.interaction.start_time_us) / 1000);
        self.interaction.success = Some(true);
        self.fire().await;
        self.interaction
    }

    pub async fn complete_error(mut self, end_time_us: i64, error_message: impl Into<String>) -> McpInteraction {
        self.interaction.end_time_us = Some(end_time_us);
        self.interaction.duration_ms = Some((end_time_us - self.interaction.start_time_us) / 1000);
        self.interaction.success = Some(false);
        self.interaction.error_message = Some(error_message.into());
        self.fire().await;
        self.interaction
    }

    async fn fire(&self) {
        let interaction = &self.interaction;
        run_hook(&self.tracker, HookKind::History, "mcp_history", self.history.save_mcp_interaction(interaction)).await;
        run_hook(&self.tracker, HookKind::Event, "mcp_event", self.events.publish_mcp_interaction(interaction)).await;
    }
}

/// Scoped recorder for a stage execution's status transitions. In
/// `critical` mode (the default for stage operations) hook errors
/// propagate; otherwise they're logged and swallowed like interaction
/// hooks.
pub struct StageExecutionHookContext {
    history: Arc<dyn HistorySink>,
    events: Arc<dyn EventSink>,
    tracker: Arc<FailureTracker>,
    critical: bool,
}

impl StageExecutionHookContext {
    pub fn new(history: Arc<dyn HistorySink>, events: Arc<dyn EventSink>, tracker: Arc<FailureTracker>) -> Self {
        Self { history, events, tracker, critical: true }
    }

    pub fn non_critical(mut self) -> Self {
        self.critical = false;
        self
    }

    pub async fn exit(&self, stage: &StageExecution) -> Result<()> {
        if self.critical {
            self.history
                .save_stage_execution(stage)
                .await
                .map_err(|e| Error::Other(format!("stage history hook failed: {e}")))?;
            self.events
                .publish_stage_execution(stage)
                .await
                .map_err(|e| Error::Other(format!("stage event hook failed: {e}")))?;
            Ok(())
        } else {
            run_hook(&self.tracker, HookKind::History, "stage_history", self.history.save_stage_execution(stage)).await;
            run_hook(&self.tracker, HookKind::Event, "stage_event", self.events.publish_stage_execution(stage)).await;
            Ok(())
        }
    }
}
