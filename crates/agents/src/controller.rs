//! The four iteration controllers that drive a stage's LLM↔MCP loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tarsy_domain::config::{AgentConfig, ProviderKind};
use tarsy_domain::error::{Error, Result};
use tarsy_domain::model::{ConversationMessage, ConversationRole};
use tarsy_mcp::McpManager;

use crate::action;
use crate::llm::LlmClient;
use crate::parser;

/// Everything a controller needs for one stage's loop: the live
/// conversation, the agent's config, and handles to call out to MCP
/// and the LLM. Pause/cancel are polled between iterations.
pub struct StageContext {
    pub session_id: String,
    pub stage_execution_id: String,
    pub conversation: Vec<ConversationMessage>,
    pub agent_config: AgentConfig,
    pub mcp: Arc<McpManager>,
    pub llm: Arc<dyn LlmClient>,
    pub tool_timeout: Duration,
    pub paused: Arc<AtomicBool>,
    pub cancelled: Arc<AtomicBool>,
}

fn check_pause_cancel(ctx: &StageContext, iteration: u32) -> Result<()> {
    if ctx.cancelled.load(Ordering::Acquire) {
        return Err(Error::AgentCancelled);
    }
    if ctx.paused.load(Ordering::Acquire) {
        return Err(Error::SessionPaused { iteration });
    }
    Ok(())
}

fn continuation_prompt() -> String {
    "Please continue using the Thought/Action/Action Input format, or provide a Final Answer if you have enough information.".into()
}

/// Shared ReAct loop body: used by both [`ReactController`] (produces
/// the user-facing final analysis) and [`ReactStageController`]
/// (produces a result summary consumed by later stages) — the two
/// differ only in what the caller does with the returned text, not in
/// how it's derived.
async fn run_react_loop(ctx: &mut StageContext, context_label: &str) -> Result<String> {
    let max_iterations = ctx.agent_config.max_iterations;

    if max_iterations == 0 {
        return Err(Error::MaxIterationsFailure {
            max_iterations,
            context: context_label.to_string(),
            last_error_message: None,
        });
    }

    let mut last_error: Option<String> = None;

    for iteration in 0..max_iterations {
        check_pause_cancel(ctx, iteration)?;

        let completion = match ctx.llm.complete(&ctx.conversation).await {
            Ok(c) => {
                last_error = None;
                c
            }
            Err(e) => {
                last_error = Some(e.to_string());
                continue;
            }
        };

        ctx.conversation.push(ConversationMessage {
            role: ConversationRole::Assistant,
            content: completion.content.clone(),
        });

        let parsed = parser::parse(Some(&completion.content));
        if let Some(final_answer) = parsed.final_answer {
            return Ok(final_answer);
        }

        if let Some(action_str) = parsed.action {
            let observation = match action::convert_action_to_tool_call(&action_str, parsed.action_input.as_deref().unwrap_or("")) {
                Ok(req) => match ctx.mcp.call_tool(&req.server, &req.tool, serde_json::Value::Object(req.parameters)).await {
                    Ok(result) => format!(
                        "Tool Result: {}",
                        serde_json::to_string(&result).unwrap_or_else(|_| "<unserializable tool result>".into())
                    ),
                    Err(e) => format!("Tool Result: error calling {action_str}: {e}"),
                },
                Err(e) => format!("Tool Result: error: {e}"),
            };
            ctx.conversation.push(ConversationMessage { role: ConversationRole::ToolResult, content: observation });
        } else {
            ctx.conversation.push(ConversationMessage { role: ConversationRole::User, content: continuation_prompt() });
        }
    }

    if let Some(last_error_message) = last_error {
        return Err(Error::MaxIterationsFailure {
            max_iterations,
            context: context_label.to_string(),
            last_error_message: Some(last_error_message),
        });
    }

    if ctx.agent_config.force_conclusion_at_max_iterations {
        ctx.conversation.push(ConversationMessage {
            role: ConversationRole::User,
            content: "Please provide your best conclusion now based on the information gathered so far.".into(),
        });
        let completion = ctx.llm.complete(&ctx.conversation).await.map_err(|e| Error::MaxIterationsFailure {
            max_iterations,
            context: context_label.to_string(),
            last_error_message: Some(e.to_string()),
        })?;
        return Ok(completion.content);
    }

    Err(Error::SessionPaused { iteration: max_iterations })
}

/// Text-parsed ReAct loop producing the session's final analysis.
pub struct ReactController;

impl ReactController {
    pub async fn execute_analysis_loop(&self, ctx: &mut StageContext) -> Result<String> {
        run_react_loop(ctx, "investigation").await
    }
}

/// Same loop, but the returned text is a result summary handed to
/// subsequent stages rather than the user-facing final analysis.
pub struct ReactStageController;

impl ReactStageController {
    pub async fn execute_analysis_loop(&self, ctx: &mut StageContext) -> Result<String> {
        run_react_loop(ctx, "stage").await
    }
}

/// Single-shot call, no tool use.
pub struct ReactFinalAnalysisController;

impl ReactFinalAnalysisController {
    pub async fn execute_analysis_loop(&self, ctx: &mut StageContext) -> Result<String> {
        check_pause_cancel(ctx, 0)?;
        let completion = ctx.llm.complete(&ctx.conversation).await.map_err(|e| Error::MaxIterationsFailure {
            max_iterations: 1,
            context: "final_analysis".to_string(),
            last_error_message: Some(e.to_string()),
        })?;
        if completion.content.trim().is_empty() {
            return Err(Error::MaxIterationsFailure {
                max_iterations: 1,
                context: "final_analysis".to_string(),
                last_error_message: Some("assistant returned an empty message".into()),
            });
        }
        Ok(completion.content)
    }
}

/// Provider-native tool-calling loop (Gemini only).
pub struct NativeThinkingController;

impl NativeThinkingController {
    /// Construction fails unless the role's provider is `Google` — the
    /// only provider kind with native tool-calling support modeled here.
    pub fn new(provider_kind: ProviderKind) -> Result<Self> {
        if provider_kind != ProviderKind::Google {
            return Err(Error::Configuration("native_thinking iteration strategy requires a Google provider".into()));
        }
        Ok(Self)
    }

    pub async fn execute_analysis_loop(&self, ctx: &mut StageContext, tool_schemas: &serde_json::Value) -> Result<String> {
        let max_iterations = ctx.agent_config.max_iterations;

        if max_iterations == 0 {
            return Err(Error::MaxIterationsFailure {
                max_iterations,
                context: "native_thinking".to_string(),
                last_error_message: None,
            });
        }

        let mut consecutive_timeouts: u32 = 0;

        for iteration in 0..max_iterations {
            check_pause_cancel(ctx, iteration)?;

            let completion = ctx.llm.complete_with_tools(&ctx.conversation, tool_schemas).await?;
            if completion.is_final {
                return Ok(completion.content);
            }

            for call in &completion.tool_calls {
                let outcome = tokio::time::timeout(
                    ctx.tool_timeout,
                    ctx.mcp.call_tool(&call.server, &call.tool, call.arguments.clone()),
                )
                .await;

                let observation = match outcome {
                    Err(_) => {
                        consecutive_timeouts += 1;
                        if consecutive_timeouts >= 2 {
                            return Err(Error::Other(format!(
                                "{consecutive_timeouts} consecutive tool timeout failures"
                            )));
                        }
                        format!("Tool Result: timeout calling {}.{}", call.server, call.tool)
                    }
                    Ok(Ok(result)) => {
                        consecutive_timeouts = 0;
                        serde_json::to_string(&result)
                            .map(|s| format!("Tool Result: {s}"))
                            .unwrap_or_else(|_| "Tool Result: <unserializable>".into())
                    }
                    Ok(Err(e)) => {
                        consecutive_timeouts = 0;
                        format!("Tool Result: error calling {}.{}: {e}", call.server, call.tool)
                    }
                };

                let mut content = observation;
                if let Some(sig) = &completion.thought_signature {
                    content.push_str(&format!("\n[thought_signature: {sig}]"));
                }
                ctx.conversation.push(ConversationMessage { role: ConversationRole::ToolResult, content });
            }
        }

        Err(Error::SessionPaused { iteration: max_iterations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    use crate::llm::LlmCompletion;
    use tarsy_mcp::McpManager;

    struct ScriptedLlm {
        replies: std::sync::Mutex<std::collections::VecDeque<Result<String>>>,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _conversation: &[ConversationMessage]) -> Result<LlmCompletion> {
            let mut replies = self.replies.lock().unwrap();
            match replies.pop_front() {
                Some(Ok(content)) => Ok(LlmCompletion { content, ..Default::default() }),
                Some(Err(e)) => Err(e),
                None => Ok(LlmCompletion { content: "Final Answer: out of script".into(), ..Default::default() }),
            }
        }
    }

    fn sample_agent_config(max_iterations: u32, force_conclusion: bool) -> AgentConfig {
        AgentConfig {
            mcp_servers: vec![],
            iteration_strategy: Default::default(),
            custom_instructions: None,
            max_iterations,
            force_conclusion_at_max_iterations: force_conclusion,
        }
    }

    fn sample_ctx(llm: Arc<dyn LlmClient>, max_iterations: u32, force_conclusion: bool) -> StageContext {
        StageContext {
            session_id: "s1".into(),
            stage_execution_id: "e1".into(),
            conversation: vec![],
            agent_config: sample_agent_config(max_iterations, force_conclusion),
            mcp: Arc::new(McpManager::empty()),
            llm,
            tool_timeout: Duration::from_secs(1),
            paused: Arc::new(AtomicBool::new(false)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    #[tokio::test]
    async fn react_returns_final_answer_immediately() {
        let llm = Arc::new(ScriptedLlm {
            replies: std::sync::Mutex::new(vec![Ok("Final Answer: all good".to_string())].into()),
        });
        let mut ctx = sample_ctx(llm, 5, false);
        let result = ReactController.execute_analysis_loop(&mut ctx).await.unwrap();
        assert_eq!(result, "all good");
    }

    #[tokio::test]
    async fn react_pauses_at_max_iterations_without_force_conclusion() {
        let llm = Arc::new(ScriptedLlm {
            replies: std::sync::Mutex::new(
                vec![
                    Ok("Thought: thinking".to_string()),
                    Ok("Thought: thinking more".to_string()),
                ]
                .into(),
            ),
        });
        let mut ctx = sample_ctx(llm, 2, false);
        let err = ReactController.execute_analysis_loop(&mut ctx).await.unwrap_err();
        assert!(matches!(err, Error::SessionPaused { iteration: 2 }));
    }

    #[tokio::test]
    async fn react_forces_conclusion_when_enabled() {
        let llm = Arc::new(ScriptedLlm {
            replies: std::sync::Mutex::new(
                vec![
                    Ok("Thought: thinking".to_string()),
                    Ok("The best conclusion I can offer.".to_string()),
                ]
                .into(),
            ),
        });
        let mut ctx = sample_ctx(llm, 1, true);
        let result = ReactController.execute_analysis_loop(&mut ctx).await.unwrap();
        assert_eq!(result, "The best conclusion I can offer.");
    }

    #[tokio::test]
    async fn react_raises_max_iterations_failure_when_last_call_failed() {
        let llm = Arc::new(ScriptedLlm {
            replies: std::sync::Mutex::new(vec![Err(Error::Other("provider down".into()))].into()),
        });
        let mut ctx = sample_ctx(llm, 1, true);
        let err = ReactController.execute_analysis_loop(&mut ctx).await.unwrap_err();
        assert!(matches!(err, Error::MaxIterationsFailure { .. }));
        assert!(err.to_string().contains("provider down"));
    }

    #[tokio::test]
    async fn react_fails_immediately_when_max_iterations_is_zero() {
        let llm = Arc::new(ScriptedLlm { replies: std::sync::Mutex::new(vec![].into()) });
        let mut ctx = sample_ctx(llm, 0, false);
        let err = ReactController.execute_analysis_loop(&mut ctx).await.unwrap_err();
        assert!(matches!(err, Error::MaxIterationsFailure { max_iterations: 0, .. }));
    }

    #[tokio::test]
    async fn react_fails_immediately_when_max_iterations_is_zero_even_with_force_conclusion() {
        let llm = Arc::new(ScriptedLlm { replies: std::sync::Mutex::new(vec![].into()) });
        let mut ctx = sample_ctx(llm, 0, true);
        let err = ReactController.execute_analysis_loop(&mut ctx).await.unwrap_err();
        assert!(matches!(err, Error::MaxIterationsFailure { max_iterations: 0, .. }));
    }

    #[tokio::test]
    async fn cancelled_flag_short_circuits_the_loop() {
        let llm = Arc::new(ScriptedLlm { replies: std::sync::Mutex::new(vec![].into()) });
        let mut ctx = sample_ctx(llm, 5, false);
        ctx.cancelled.store(true, Ordering::Release);
        let err = ReactController.execute_analysis_loop(&mut ctx).await.unwrap_err();
        assert!(matches!(err, Error::AgentCancelled));
    }

    #[tokio::test]
    async fn final_analysis_rejects_empty_assistant_message() {
        let llm = Arc::new(ScriptedLlm { replies: std::sync::Mutex::new(vec![Ok(String::new())].into()) });
        let mut ctx = sample_ctx(llm, 1, false);
        let err = ReactFinalAnalysisController.execute_analysis_loop(&mut ctx).await.unwrap_err();
        assert!(matches!(err, Error::MaxIterationsFailure { max_iterations: 1, .. }));
    }

    #[tokio::test]
    async fn native_thinking_fails_immediately_when_max_iterations_is_zero() {
        let llm = Arc::new(ScriptedLlm { replies: std::sync::Mutex::new(vec![].into()) });
        let mut ctx = sample_ctx(llm, 0, false);
        let controller = NativeThinkingController::new(ProviderKind::Google).unwrap();
        let err = controller.execute_analysis_loop(&mut ctx, &serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, Error::MaxIterationsFailure { max_iterations: 0, .. }));
    }

    #[test]
    fn native_thinking_requires_google_provider() {
        assert!(NativeThinkingController::new(ProviderKind::OpenaiCompat).is_err());
        assert!(NativeThinkingController::new(ProviderKind::Google).is_ok());
    }

    #[tokio::test]
    async fn native_thinking_fails_after_two_consecutive_timeouts() {
        struct TimeoutLlm(AtomicU32);
        #[async_trait]
        impl LlmClient for TimeoutLlm {
            async fn complete(&self, _c: &[ConversationMessage]) -> Result<LlmCompletion> {
                unreachable!()
            }
            async fn complete_with_tools(&self, _c: &[ConversationMessage], _schemas: &serde_json::Value) -> Result<LlmCompletion> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(LlmCompletion {
                    content: String::new(),
                    tool_calls: vec![crate::llm::NativeToolCall {
                        server: "kubectl".into(),
                        tool: "slow_tool".into(),
                        arguments: serde_json::json!({}),
                    }],
                    is_final: false,
                    thought_signature: None,
                })
            }
        }
        let llm = Arc::new(TimeoutLlm(AtomicU32::new(0)));
        let mut ctx = sample_ctx(llm, 10, false);
        ctx.tool_timeout = Duration::from_millis(1);
        let controller = NativeThinkingController::new(ProviderKind::Google).unwrap();
        let err = controller.execute_analysis_loop(&mut ctx, &serde_json::json!({})).await.unwrap_err();
        assert!(err.to_string().contains("consecutive tool timeout"));
    }
}
