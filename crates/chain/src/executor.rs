//! Runs a resolved chain's stages against a session, sequentially
//! except for `parallel` blocks, which fan out their children
//! concurrently and aggregate per the stage's `failure_policy`.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tarsy_domain::config::{AgentConfig, ChainConfig, ParallelChild, ProviderKind};
use tarsy_domain::error::{Error, Result};
use tarsy_domain::model::{
    AgentExecutionResult, ConversationMessage, ConversationRole, FailurePolicy, ParallelStageResult, ParallelType,
    PausedConversationState, ResultStatus, SessionStatus, StageExecution,
};
use tarsy_hooks::StageExecutionHookContext;
use tarsy_history::{HistoryRepository, StageExecutionManager};

use crate::agent_runner::run_agent_stage;
use crate::context::ChainContext;
use crate::result::ChainExecutionResult;

/// Resolves an agent name to the client it should use and that
/// provider's kind (needed only by the native-thinking controller).
/// Supplied by the caller (`tarsy-service`) since constructing a real
/// LLM client is out of scope here.
pub trait LlmResolver: Send + Sync {
    fn resolve(&self, agent_name: &str) -> (Arc<dyn tarsy_agents::LlmClient>, ProviderKind);
}

/// A previously paused single (non-parallel) stage to resume in place,
/// preserving its `started_at_us` and prior conversation instead of
/// starting the stage fresh. Parallel-stage resumption is not modeled:
/// a paused parallel group is resumed by re-running all of its children
/// from scratch, which is a known simplification (see DESIGN.md).
pub struct ResumeCheckpoint {
    pub stage_index: usize,
    pub execution: StageExecution,
    pub conversation: Vec<ConversationMessage>,
}

pub struct ChainExecutor {
    history: Arc<HistoryRepository>,
    stage_mgr: Arc<StageExecutionManager>,
    mcp: Arc<tarsy_mcp::McpManager>,
    stage_hooks: Arc<StageExecutionHookContext>,
    tool_timeout: std::time::Duration,
}

impl ChainExecutor {
    pub fn new(
        history: Arc<HistoryRepository>,
        stage_mgr: Arc<StageExecutionManager>,
        mcp: Arc<tarsy_mcp::McpManager>,
        stage_hooks: Arc<StageExecutionHookContext>,
        tool_timeout: std::time::Duration,
    ) -> Self {
        Self { history, stage_mgr, mcp, stage_hooks, tool_timeout }
    }

    pub async fn execute(
        &self,
        session_id: &str,
        chain: &ChainConfig,
        agents: &std::collections::HashMap<String, AgentConfig>,
        llm: &dyn LlmResolver,
        paused: Arc<AtomicBool>,
        cancelled: Arc<AtomicBool>,
        chain_ctx: &mut ChainContext,
        now_us: i64,
    ) -> Result<ChainExecutionResult> {
        self.execute_from(session_id, chain, agents, llm, paused, cancelled, chain_ctx, now_us, None).await
    }

    /// Like [`Self::execute`], but when `resume` names a stage, that stage
    /// is reactivated in place (preserving `started_at_us` and its prior
    /// conversation) instead of started fresh, and every earlier stage is
    /// skipped. Used by the resumption path after a paused session is
    /// reactivated.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute_from(
        &self,
        session_id: &str,
        chain: &ChainConfig,
        agents: &std::collections::HashMap<String, AgentConfig>,
        llm: &dyn LlmResolver,
        paused: Arc<AtomicBool>,
        cancelled: Arc<AtomicBool>,
        chain_ctx: &mut ChainContext,
        now_us: i64,
        resume: Option<ResumeCheckpoint>,
    ) -> Result<ChainExecutionResult> {
        let mut last_summary: Option<String> = None;
        let mut resume = resume;

        for (stage_index, stage) in chain.stages.iter().enumerate() {
            if let Some(r) = &resume {
                if stage_index < r.stage_index {
                    continue;
                }
            }
            let checkpoint = match &resume {
                Some(r) if r.stage_index == stage_index => resume.take(),
                _ => None,
            };

            if let Some(children) = stage.resolve_children() {
                let parallel = stage.parallel.as_ref().expect("resolve_children implies parallel is set");
                match self
                    .run_parallel_stage(session_id, stage_index as u32, &stage.name, &children, parallel.failure_policy, agents, llm, paused.clone(), cancelled.clone(), chain_ctx, now_us)
                    .await?
                {
                    StageOutcome::Paused => {
                        return Ok(ChainExecutionResult { status: ResultStatus::Paused, final_analysis: None, timestamp_us: now_us })
                    }
                    StageOutcome::Cancelled => {
                        return Ok(ChainExecutionResult { status: ResultStatus::Cancelled, final_analysis: None, timestamp_us: now_us })
                    }
                    StageOutcome::Failed => {
                        return Ok(ChainExecutionResult { status: ResultStatus::Failed, final_analysis: last_summary, timestamp_us: now_us })
                    }
                    StageOutcome::Completed(summary) => last_summary = summary,
                }
            } else {
                let agent_name = stage.agent.clone().unwrap_or_default();
                match self
                    .run_single_stage(session_id, stage_index as u32, &stage.name, &agent_name, agents, llm, paused.clone(), cancelled.clone(), chain_ctx, now_us, checkpoint)
                    .await?
                {
                    StageOutcome::Paused => {
                        return Ok(ChainExecutionResult { status: ResultStatus::Paused, final_analysis: None, timestamp_us: now_us })
                    }
                    StageOutcome::Cancelled => {
                        return Ok(ChainExecutionResult { status: ResultStatus::Cancelled, final_analysis: None, timestamp_us: now_us })
                    }
                    StageOutcome::Failed => {
                        return Ok(ChainExecutionResult { status: ResultStatus::Failed, final_analysis: last_summary, timestamp_us: now_us })
                    }
                    StageOutcome::Completed(summary) => last_summary = summary,
                }
            }
        }

        Ok(ChainExecutionResult { status: ResultStatus::Completed, final_analysis: last_summary, timestamp_us: now_us })
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_single_stage(
        &self,
        session_id: &str,
        stage_index: u32,
        stage_name: &str,
        agent_name: &str,
        agents: &std::collections::HashMap<String, AgentConfig>,
        llm: &dyn LlmResolver,
        paused: Arc<AtomicBool>,
        cancelled: Arc<AtomicBool>,
        chain_ctx: &mut ChainContext,
        now_us: i64,
        checkpoint: Option<ResumeCheckpoint>,
    ) -> Result<StageOutcome> {
        let agent_config = agents.get(agent_name).cloned().unwrap_or_default();

        let (mut se, execution_id, conversation) = if let Some(checkpoint) = checkpoint {
            let mut se = checkpoint.execution;
            let execution_id = se.execution_id.clone();
            self.stage_mgr.resume_stage(&mut se).await?;
            (se, execution_id, checkpoint.conversation)
        } else {
            let execution_id = uuid::Uuid::new_v4().to_string();
            let se = self
                .stage_mgr
                .start_stage(
                    execution_id.clone(),
                    session_id,
                    stage_index,
                    stage_name,
                    stage_name,
                    agent_name,
                    None,
                    0,
                    ParallelType::Single,
                    None,
                    now_us,
                )
                .await?;
            (se, execution_id, initial_conversation(&agent_config, chain_ctx))
        };
        self.history.advance_current_stage(session_id, stage_index, &execution_id).await?;
        self.stage_hooks.exit(&se).await?;

        let (client, provider_kind) = llm.resolve(agent_name);
        let outcome = run_agent_stage(
            session_id,
            execution_id.clone(),
            &agent_config,
            provider_kind,
            conversation,
            self.mcp.clone(),
            client,
            self.tool_timeout,
            paused,
            cancelled,
        )
        .await;

        self.finish_stage(&mut se, &execution_id, outcome, chain_ctx, now_us).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_parallel_stage(
        &self,
        session_id: &str,
        stage_index: u32,
        stage_name: &str,
        children: &[ParallelChild],
        failure_policy: FailurePolicy,
        agents: &std::collections::HashMap<String, AgentConfig>,
        llm: &dyn LlmResolver,
        paused: Arc<AtomicBool>,
        cancelled: Arc<AtomicBool>,
        chain_ctx: &mut ChainContext,
        now_us: i64,
    ) -> Result<StageOutcome> {
        let parent_execution_id = uuid::Uuid::new_v4().to_string();
        let parent = self
            .stage_mgr
            .start_stage(
                parent_execution_id.clone(),
                session_id,
                stage_index,
                stage_name,
                stage_name,
                "",
                None,
                0,
                if children.iter().map(|c| &c.agent).collect::<std::collections::HashSet<_>>().len() > 1 {
                    ParallelType::MultiAgent
                } else {
                    ParallelType::Replica
                },
                Some(children.len() as u32),
                now_us,
            )
            .await?;
        self.history.advance_current_stage(session_id, stage_index, &parent_execution_id).await?;
        self.stage_hooks.exit(&parent).await?;

        let mut handles = Vec::new();
        for (i, child) in children.iter().enumerate() {
            let agent_config = agents.get(&child.agent).cloned().unwrap_or_default();
            let (client, provider_kind) = llm.resolve(&child.agent);
            let conversation = initial_conversation(&agent_config, chain_ctx);
            let execution_id = uuid::Uuid::new_v4().to_string();
            let mcp = self.mcp.clone();
            let tool_timeout = self.tool_timeout;
            let paused = paused.clone();
            let cancelled = cancelled.clone();
            let stage_mgr = self.stage_mgr.clone();
            let child_name = child.name.clone();
            let agent_name = child.agent.clone();
            let session_id = session_id.to_string();
            let parent_id = parent_execution_id.clone();
            let parallel_index = (i + 1) as u32;

            handles.push(tokio::spawn(async move {
                let mut se = stage_mgr
                    .start_stage(
                        execution_id.clone(),
                        session_id.as_str(),
                        0,
                        child_name.as_str(),
                        child_name.as_str(),
                        agent_name.as_str(),
                        Some(parent_id),
                        parallel_index,
                        ParallelType::Single,
                        None,
                        now_us,
                    )
                    .await?;

                let outcome = run_agent_stage(
                    &session_id,
                    execution_id.clone(),
                    &agent_config,
                    provider_kind,
                    conversation,
                    mcp,
                    client,
                    tool_timeout,
                    paused,
                    cancelled,
                )
                .await;

                match outcome.result {
                    Ok(summary) => {
                        stage_mgr.complete_stage(&mut se, now_us, Some(serde_json::json!({ "summary": summary }))).await?;
                        Ok::<AgentExecutionResult, Error>(AgentExecutionResult {
                            status: ResultStatus::Completed,
                            agent_or_stage_name: child_name,
                            timestamp_us: now_us,
                            token_usage: None,
                            result_summary: Some(summary),
                            paused_conversation_state: None,
                        })
                    }
                    Err(Error::SessionPaused { iteration }) => {
                        stage_mgr
                            .pause_stage(&mut se, iteration, Some(serde_json::to_value(&outcome.conversation).unwrap_or_default()))
                            .await?;
                        Ok(AgentExecutionResult {
                            status: ResultStatus::Paused,
                            agent_or_stage_name: child_name,
                            timestamp_us: now_us,
                            token_usage: None,
                            result_summary: None,
                            paused_conversation_state: Some(PausedConversationState { iteration, conversation: outcome.conversation }),
                        })
                    }
                    Err(e) => {
                        stage_mgr.fail_stage(&mut se, now_us, e.to_string()).await?;
                        Ok(AgentExecutionResult {
                            status: ResultStatus::Failed,
                            agent_or_stage_name: child_name,
                            timestamp_us: now_us,
                            token_usage: None,
                            result_summary: None,
                            paused_conversation_state: None,
                        })
                    }
                }
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(Ok(r)) => results.push(r),
                Ok(Err(e)) => return Err(e),
                Err(join_err) => return Err(Error::Other(format!("parallel child task panicked: {join_err}"))),
            }
        }

        if results.iter().any(|r| r.status == ResultStatus::Paused) {
            let mut parent = parent;
            let paused_child = results.iter().find(|r| r.status == ResultStatus::Paused).unwrap();
            let iteration = paused_child.paused_conversation_state.as_ref().map(|s| s.iteration).unwrap_or(0);
            self.stage_mgr.pause_stage(&mut parent, iteration, None).await?;
            let _ = self.stage_hooks.exit(&parent).await;
            return Ok(StageOutcome::Paused);
        }

        let aggregated = ParallelStageResult::aggregate(results, failure_policy);
        let mut parent = parent;
        let stage_output = serde_json::to_value(&aggregated).ok();
        let final_status = aggregated.status;
        match final_status {
            ResultStatus::Completed => {
                self.stage_mgr.complete_stage(&mut parent, now_us, stage_output).await?;
            }
            _ => {
                self.stage_mgr.fail_stage(&mut parent, now_us, "one or more parallel children failed").await?;
            }
        }
        self.stage_hooks.exit(&parent).await?;

        let summary = aggregated
            .results
            .iter()
            .filter_map(|r| r.result_summary.clone())
            .collect::<Vec<_>>()
            .join("\n\n");
        chain_ctx.record(
            parent_execution_id,
            AgentExecutionResult {
                status: final_status,
                agent_or_stage_name: stage_name.to_string(),
                timestamp_us: now_us,
                token_usage: None,
                result_summary: Some(summary.clone()),
                paused_conversation_state: None,
            },
        );

        if final_status == ResultStatus::Completed {
            Ok(StageOutcome::Completed(Some(summary)))
        } else {
            Ok(StageOutcome::Failed)
        }
    }

    async fn finish_stage(
        &self,
        se: &mut StageExecution,
        execution_id: &str,
        outcome: crate::agent_runner::AgentRunOutcome,
        chain_ctx: &mut ChainContext,
        now_us: i64,
    ) -> Result<StageOutcome> {
        match outcome.result {
            Ok(summary) => {
                self.stage_mgr.complete_stage(se, now_us, Some(serde_json::json!({ "summary": summary }))).await?;
                self.stage_hooks.exit(se).await?;
                chain_ctx.record(
                    execution_id,
                    AgentExecutionResult {
                        status: ResultStatus::Completed,
                        agent_or_stage_name: se.stage_name.clone(),
                        timestamp_us: now_us,
                        token_usage: None,
                        result_summary: Some(summary.clone()),
                        paused_conversation_state: None,
                    },
                );
                Ok(StageOutcome::Completed(Some(summary)))
            }
            Err(Error::SessionPaused { iteration }) => {
                let partial = serde_json::to_value(&outcome.conversation).ok();
                self.stage_mgr.pause_stage(se, iteration, partial).await?;
                chain_ctx.record(
                    execution_id,
                    AgentExecutionResult {
                        status: ResultStatus::Paused,
                        agent_or_stage_name: se.stage_name.clone(),
                        timestamp_us: now_us,
                        token_usage: None,
                        result_summary: None,
                        paused_conversation_state: Some(PausedConversationState { iteration, conversation: outcome.conversation }),
                    },
                );
                Ok(StageOutcome::Paused)
            }
            Err(Error::AgentCancelled) => {
                self.stage_mgr.fail_stage(se, now_us, "Cancelled by user").await?;
                self.stage_hooks.exit(se).await?;
                Ok(StageOutcome::Cancelled)
            }
            Err(e) => {
                self.stage_mgr.fail_stage(se, now_us, e.to_string()).await?;
                self.stage_hooks.exit(se).await?;
                Ok(StageOutcome::Failed)
            }
        }
    }
}

enum StageOutcome {
    Completed(Option<String>),
    Paused,
    Cancelled,
    Failed,
}

fn initial_conversation(agent_config: &AgentConfig, chain_ctx: &ChainContext) -> Vec<ConversationMessage> {
    let mut system = String::from(
        "You are investigating an alert using the ReAct format: Thought, Action, Action Input, and Final Answer.",
    );
    if let Some(instructions) = &agent_config.custom_instructions {
        system.push('\n');
        system.push_str(instructions);
    }
    let mut messages = vec![ConversationMessage { role: ConversationRole::System, content: system }];

    let mut user_content = format!("Alert data:\n{}", chain_ctx.alert_data);
    if let Some(runbook) = &chain_ctx.runbook_text {
        user_content.push_str("\n\nRunbook:\n");
        user_content.push_str(runbook);
    }
    let prior: Vec<&str> = chain_ctx.stage_outputs.values().filter_map(|r| r.result_summary.as_deref()).collect();
    if !prior.is_empty() {
        user_content.push_str("\n\nPrior stage findings:\n");
        user_content.push_str(&prior.join("\n---\n"));
    }
    messages.push(ConversationMessage { role: ConversationRole::User, content: user_content });
    messages
}

/// `true` when a session transitioned to a terminal status and should
/// also have `completed_at_us` set alongside it.
pub fn is_terminal_session_status(status: SessionStatus) -> bool {
    status.is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    use tarsy_agents::{LlmClient, LlmCompletion};
    use tarsy_domain::config::{DatabaseConfig, StageConfig};
    use tarsy_domain::error::Result as DomainResult;
    use tarsy_hooks::FailureTracker;

    use crate::sinks::{BusEventSink, RepositoryHistorySink};

    struct ScriptedLlm {
        reply: String,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _conversation: &[ConversationMessage]) -> DomainResult<LlmCompletion> {
            Ok(LlmCompletion { content: self.reply.clone(), tool_calls: vec![], is_final: true, thought_signature: None })
        }
    }

    struct AlwaysFail;

    #[async_trait]
    impl LlmClient for AlwaysFail {
        async fn complete(&self, _conversation: &[ConversationMessage]) -> DomainResult<LlmCompletion> {
            Err(Error::Other("provider unavailable".into()))
        }
    }

    struct FixedResolver(Arc<dyn LlmClient>);

    impl LlmResolver for FixedResolver {
        fn resolve(&self, _agent_name: &str) -> (Arc<dyn LlmClient>, ProviderKind) {
            (self.0.clone(), ProviderKind::OpenaiCompat)
        }
    }

    async fn test_executor() -> (ChainExecutor, Arc<HistoryRepository>) {
        let config = DatabaseConfig { url: "sqlite::memory:".into(), pool_size: 1, ..DatabaseConfig::default() };
        let history = Arc::new(HistoryRepository::connect(&config).await.unwrap());
        let stage_mgr = Arc::new(StageExecutionManager::new(history.clone()));
        let mcp = Arc::new(tarsy_mcp::McpManager::empty());
        let events = tarsy_events::connect("sqlite::memory:", 1)
            .await
            .map(|pool| tarsy_events::EventBus::new(pool, tarsy_domain::config::DbBackend::Sqlite))
            .unwrap();
        let hooks = Arc::new(StageExecutionHookContext::new(
            Arc::new(RepositoryHistorySink::new(history.clone())),
            Arc::new(BusEventSink::new(events)),
            Arc::new(FailureTracker::new()),
        ));
        let executor = ChainExecutor::new(history.clone(), stage_mgr, mcp, hooks, std::time::Duration::from_secs(5));
        (executor, history)
    }

    fn sample_agents() -> HashMap<String, AgentConfig> {
        let mut agents = HashMap::new();
        agents.insert("kubernetes-agent".to_string(), AgentConfig::default());
        agents.insert("logs-agent".to_string(), AgentConfig::default());
        agents.insert("metrics-agent".to_string(), AgentConfig::default());
        agents
    }

    fn single_stage_chain() -> ChainConfig {
        ChainConfig {
            chain_id: "test-chain".into(),
            alert_types: vec![],
            stages: vec![StageConfig { name: "investigate".into(), agent: Some("kubernetes-agent".into()), parallel: None }],
        }
    }

    #[tokio::test]
    async fn sequential_stage_completes_and_records_summary() {
        let (executor, _history) = test_executor().await;
        let chain = single_stage_chain();
        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlm { reply: "Thought: ok\nFinal Answer: all good".into() });
        let resolver = FixedResolver(llm);
        let mut ctx = ChainContext::new(serde_json::json!({"alert": "x"}), None);
        let result = executor
            .execute(
                "s1",
                &chain,
                &sample_agents(),
                &resolver,
                Arc::new(AtomicBool::new(false)),
                Arc::new(AtomicBool::new(false)),
                &mut ctx,
                1_000,
            )
            .await
            .unwrap();
        assert_eq!(result.status, ResultStatus::Completed);
        assert_eq!(result.final_analysis.as_deref(), Some("all good"));
    }

    #[tokio::test]
    async fn sequential_stage_failure_short_circuits_with_failed_status() {
        let (executor, _history) = test_executor().await;
        let chain = single_stage_chain();
        let llm: Arc<dyn LlmClient> = Arc::new(AlwaysFail);
        let resolver = FixedResolver(llm);
        let mut ctx = ChainContext::new(serde_json::json!({"alert": "x"}), None);
        let result = executor
            .execute(
                "s1",
                &chain,
                &sample_agents(),
                &resolver,
                Arc::new(AtomicBool::new(false)),
                Arc::new(AtomicBool::new(false)),
                &mut ctx,
                1_000,
            )
            .await
            .unwrap();
        assert_eq!(result.status, ResultStatus::Failed);
    }

    #[tokio::test]
    async fn parallel_stage_all_policy_fails_when_one_child_errors() {
        let (executor, _history) = test_executor().await;
        let chain = ChainConfig {
            chain_id: "parallel-chain".into(),
            alert_types: vec![],
            stages: vec![StageConfig {
                name: "gather".into(),
                agent: None,
                parallel: Some(tarsy_domain::config::ParallelConfig {
                    parallel_type: ParallelType::MultiAgent,
                    failure_policy: FailurePolicy::All,
                    children: vec![
                        ParallelChild { name: "logs".into(), agent: "logs-agent".into() },
                        ParallelChild { name: "metrics".into(), agent: "metrics-agent".into() },
                    ],
                    count: None,
                }),
            }],
        };

        struct PerAgentResolver;
        impl LlmResolver for PerAgentResolver {
            fn resolve(&self, agent_name: &str) -> (Arc<dyn LlmClient>, ProviderKind) {
                let llm: Arc<dyn LlmClient> = if agent_name == "logs-agent" {
                    Arc::new(ScriptedLlm { reply: "Thought: ok\nFinal Answer: logs clean".into() })
                } else {
                    Arc::new(AlwaysFail)
                };
                (llm, ProviderKind::OpenaiCompat)
            }
        }

        let mut ctx = ChainContext::new(serde_json::json!({"alert": "x"}), None);
        let result = executor
            .execute(
                "s2",
                &chain,
                &sample_agents(),
                &PerAgentResolver,
                Arc::new(AtomicBool::new(false)),
                Arc::new(AtomicBool::new(false)),
                &mut ctx,
                2_000,
            )
            .await
            .unwrap();
        assert_eq!(result.status, ResultStatus::Failed);
    }

    #[tokio::test]
    async fn parallel_stage_any_policy_completes_when_one_child_succeeds() {
        let (executor, _history) = test_executor().await;
        let chain = ChainConfig {
            chain_id: "parallel-chain".into(),
            alert_types: vec![],
            stages: vec![StageConfig {
                name: "gather".into(),
                agent: None,
                parallel: Some(tarsy_domain::config::ParallelConfig {
                    parallel_type: ParallelType::MultiAgent,
                    failure_policy: FailurePolicy::Any,
                    children: vec![
                        ParallelChild { name: "logs".into(), agent: "logs-agent".into() },
                        ParallelChild { name: "metrics".into(), agent: "metrics-agent".into() },
                    ],
                    count: None,
                }),
            }],
        };

        struct PerAgentResolver;
        impl LlmResolver for PerAgentResolver {
            fn resolve(&self, agent_name: &str) -> (Arc<dyn LlmClient>, ProviderKind) {
                let llm: Arc<dyn LlmClient> = if agent_name == "logs-agent" {
                    Arc::new(ScriptedLlm { reply: "Thought: ok\nFinal Answer: logs clean".into() })
                } else {
                    Arc::new(AlwaysFail)
                };
                (llm, ProviderKind::OpenaiCompat)
            }
        }

        let mut ctx = ChainContext::new(serde_json::json!({"alert": "x"}), None);
        let result = executor
            .execute(
                "s3",
                &chain,
                &sample_agents(),
                &PerAgentResolver,
                Arc::new(AtomicBool::new(false)),
                Arc::new(AtomicBool::new(false)),
                &mut ctx,
                3_000,
            )
            .await
            .unwrap();
        assert_eq!(result.status, ResultStatus::Completed);
    }
}
