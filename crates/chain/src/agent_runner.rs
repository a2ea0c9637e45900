//! Builds a [`StageContext`] for one agent invocation and dispatches to
//! the controller selected by its `iteration_strategy`.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tarsy_agents::{
    LlmClient, NativeThinkingController, ReactController, ReactFinalAnalysisController, ReactStageController,
    StageContext,
};
use tarsy_domain::config::{AgentConfig, IterationStrategy, ProviderKind};
use tarsy_domain::error::Result;
use tarsy_domain::model::ConversationMessage;
use tarsy_mcp::McpManager;

/// Outcome of one agent run: the controller's `Result<String>` plus the
/// conversation as it stood when the controller returned, needed by the
/// caller to build `PausedConversationState` on a `SessionPaused` error.
pub struct AgentRunOutcome {
    pub result: Result<String>,
    pub conversation: Vec<ConversationMessage>,
}

#[allow(clippy::too_many_arguments)]
pub async fn run_agent_stage(
    session_id: impl Into<String>,
    stage_execution_id: impl Into<String>,
    agent_config: &AgentConfig,
    provider_kind: ProviderKind,
    conversation: Vec<ConversationMessage>,
    mcp: Arc<McpManager>,
    llm: Arc<dyn LlmClient>,
    tool_timeout: Duration,
    paused: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
) -> AgentRunOutcome {
    let mut ctx = StageContext {
        session_id: session_id.into(),
        stage_execution_id: stage_execution_id.into(),
        conversation,
        agent_config: agent_config.clone(),
        mcp,
        llm,
        tool_timeout,
        paused,
        cancelled,
    };

    let result = match agent_config.iteration_strategy {
        IterationStrategy::React => ReactController.execute_analysis_loop(&mut ctx).await,
        IterationStrategy::ReactStage => ReactStageController.execute_analysis_loop(&mut ctx).await,
        IterationStrategy::ReactFinalAnalysis => ReactFinalAnalysisController.execute_analysis_loop(&mut ctx).await,
        IterationStrategy::NativeThinking => match NativeThinkingController::new(provider_kind) {
            Ok(controller) => controller.execute_analysis_loop(&mut ctx, &serde_json::json!({})).await,
            Err(e) => Err(e),
        },
    };

    AgentRunOutcome { result, conversation: ctx.conversation }
}
