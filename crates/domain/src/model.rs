//! Core persisted domain objects: sessions, stage executions, interactions,
//! events, and the value objects iteration controllers return.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    InProgress,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub alert_type: String,
    pub alert_data: serde_json::Value,
    pub runbook_url: Option<String>,
    /// Resolved chain definition, snapshotted at session creation.
    pub chain_config: serde_json::Value,
    pub status: SessionStatus,
    pub started_at_us: Option<i64>,
    pub completed_at_us: Option<i64>,
    pub final_analysis: Option<String>,
    pub final_analysis_summary: Option<String>,
    pub current_stage_index: Option<u32>,
    pub current_stage_execution_id: Option<String>,
    pub author: Option<String>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, alert_type: impl Into<String>, alert_data: serde_json::Value, chain_config: serde_json::Value) -> Self {
        Self {
            session_id: session_id.into(),
            alert_type: alert_type.into(),
            alert_data,
            runbook_url: None,
            chain_config,
            status: SessionStatus::Pending,
            started_at_us: None,
            completed_at_us: None,
            final_analysis: None,
            final_analysis_summary: None,
            current_stage_index: None,
            current_stage_execution_id: None,
            author: None,
        }
    }

    /// `true` when the invariant "terminal ⟹ completed_at_us set" holds.
    pub fn terminal_invariant_holds(&self) -> bool {
        !self.status.is_terminal() || self.completed_at_us.is_some()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// StageExecution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Active,
    Paused,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelType {
    Single,
    MultiAgent,
    Replica,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    All,
    Any,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageExecution {
    pub execution_id: String,
    pub session_id: String,
    pub stage_index: u32,
    pub stage_id: String,
    pub stage_name: String,
    pub agent: String,
    pub status: StageStatus,
    pub started_at_us: Option<i64>,
    pub completed_at_us: Option<i64>,
    pub duration_ms: Option<i64>,
    pub current_iteration: Option<u32>,
    pub stage_output: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub parent_stage_execution_id: Option<String>,
    pub parallel_index: u32,
    pub parallel_type: ParallelType,
    pub expected_parallel_count: Option<u32>,
}

impl StageExecution {
    pub fn new(
        execution_id: impl Into<String>,
        session_id: impl Into<String>,
        stage_index: u32,
        stage_id: impl Into<String>,
        stage_name: impl Into<String>,
        agent: impl Into<String>,
        parent_stage_execution_id: Option<String>,
        parallel_index: u32,
        parallel_type: ParallelType,
        expected_parallel_count: Option<u32>,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            session_id: session_id.into(),
            stage_index,
            stage_id: stage_id.into(),
            stage_name: stage_name.into(),
            agent: agent.into(),
            status: StageStatus::Pending,
            started_at_us: None,
            completed_at_us: None,
            duration_ms: None,
            current_iteration: None,
            stage_output: None,
            error_message: None,
            parent_stage_execution_id,
            parallel_index,
            parallel_type,
            expected_parallel_count,
        }
    }

    /// `started_at_us ≤ completed_at_us` and `duration_ms` matches, for any
    /// stage execution that has reached a terminal status.
    pub fn terminal_invariant_holds(&self) -> bool {
        if !matches!(self.status, StageStatus::Completed | StageStatus::Failed) {
            return true;
        }
        match (self.started_at_us, self.completed_at_us, self.duration_ms) {
            (Some(s), Some(c), Some(d)) => s <= c && d == (c - s) / 1000,
            _ => false,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLMInteraction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationRole {
    System,
    User,
    Assistant,
    ToolResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: ConversationRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    Investigation,
    Summarization,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmInteraction {
    pub interaction_id: String,
    pub session_id: String,
    pub stage_execution_id: String,
    pub provider: String,
    pub model_name: String,
    pub temperature: f32,
    pub interaction_type: InteractionType,
    pub conversation: Vec<ConversationMessage>,
    pub native_tools_config: Option<serde_json::Value>,
    pub start_time_us: i64,
    pub end_time_us: Option<i64>,
    pub duration_ms: Option<i64>,
    pub timestamp_us: Option<i64>,
    pub success: Option<bool>,
    pub error_message: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MCPInteraction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationType {
    ToolList,
    ToolCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpInteraction {
    pub request_id: String,
    pub session_id: String,
    pub stage_execution_id: String,
    pub server_name: String,
    pub communication_type: CommunicationType,
    pub tool_name: Option<String>,
    pub tool_arguments: Option<serde_json::Value>,
    pub tool_result: Option<serde_json::Value>,
    pub available_tools: Option<serde_json::Value>,
    pub start_time_us: i64,
    pub end_time_us: Option<i64>,
    pub duration_ms: Option<i64>,
    pub success: Option<bool>,
    pub error_message: Option<String>,
    pub step_description: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    #[serde(rename = "session.created")]
    SessionCreated { session_id: String },
    #[serde(rename = "session.started")]
    SessionStarted { session_id: String },
    #[serde(rename = "session.completed")]
    SessionCompleted { session_id: String },
    #[serde(rename = "session.failed")]
    SessionFailed { session_id: String, error_message: String },
    #[serde(rename = "session.paused")]
    SessionPaused { session_id: String },
    #[serde(rename = "session.resumed")]
    SessionResumed { session_id: String },
    #[serde(rename = "session.cancelled")]
    SessionCancelled { session_id: String },
    #[serde(rename = "stage.started")]
    StageStarted { session_id: String, stage_id: String },
    #[serde(rename = "stage.completed")]
    StageCompleted { session_id: String, stage_id: String },
    #[serde(rename = "stage.failed")]
    StageFailed { session_id: String, stage_id: String, error_message: String },
    #[serde(rename = "llm.interaction")]
    LlmInteractionEvent { session_id: String, stage_id: String, interaction_id: String },
    #[serde(rename = "llm.stream_chunk")]
    LlmStreamChunk { session_id: String, interaction_id: String, index: u32, text: String },
    #[serde(rename = "mcp.tool_call")]
    McpToolCall { session_id: String, stage_id: String, interaction_id: String },
    #[serde(rename = "mcp.tool_list")]
    McpToolList { session_id: String, stage_id: String, interaction_id: String },
    #[serde(rename = "chat.user_message")]
    ChatUserMessage { session_id: String, message: String },
    #[serde(rename = "chat.cancel_request")]
    ChatCancelRequest { session_id: String },
}

impl EventPayload {
    pub fn session_id(&self) -> &str {
        match self {
            EventPayload::SessionCreated { session_id }
            | EventPayload::SessionStarted { session_id }
            | EventPayload::SessionCompleted { session_id }
            | EventPayload::SessionFailed { session_id, .. }
            | EventPayload::SessionPaused { session_id }
            | EventPayload::SessionResumed { session_id }
            | EventPayload::SessionCancelled { session_id }
            | EventPayload::StageStarted { session_id, .. }
            | EventPayload::StageCompleted { session_id, .. }
            | EventPayload::StageFailed { session_id, .. }
            | EventPayload::LlmInteractionEvent { session_id, .. }
            | EventPayload::LlmStreamChunk { session_id, .. }
            | EventPayload::McpToolCall { session_id, .. }
            | EventPayload::McpToolList { session_id, .. }
            | EventPayload::ChatUserMessage { session_id, .. }
            | EventPayload::ChatCancelRequest { session_id } => session_id,
        }
    }
}

/// An immutable, append-only record. `id` is assigned by the store on
/// insert and is strictly increasing within a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub channel: String,
    pub payload: EventPayload,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Channel for all-session events.
pub const SESSIONS_CHANNEL: &str = "sessions";

/// Channel for one session's events.
pub fn session_channel(session_id: &str) -> String {
    format!("session:{session_id}")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Result value objects
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Completed,
    Failed,
    Paused,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PausedConversationState {
    pub iteration: u32,
    pub conversation: Vec<ConversationMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecutionResult {
    pub status: ResultStatus,
    pub agent_or_stage_name: String,
    pub timestamp_us: i64,
    pub token_usage: Option<TokenUsage>,
    pub result_summary: Option<String>,
    pub paused_conversation_state: Option<PausedConversationState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelStageMetadata {
    pub successful_count: u32,
    pub failed_count: u32,
    pub total_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelStageResult {
    pub status: ResultStatus,
    pub results: Vec<AgentExecutionResult>,
    pub metadata: ParallelStageMetadata,
}

impl ParallelStageResult {
    pub fn aggregate(results: Vec<AgentExecutionResult>, failure_policy: FailurePolicy) -> Self {
        let total_count = results.len() as u32;
        let successful_count = results
            .iter()
            .filter(|r| r.status == ResultStatus::Completed)
            .count() as u32;
        let failed_count = total_count - successful_count;
        let status = match failure_policy {
            FailurePolicy::All => {
                if successful_count == total_count {
                    ResultStatus::Completed
                } else {
                    ResultStatus::Failed
                }
            }
            FailurePolicy::Any => {
                if successful_count >= 1 {
                    ResultStatus::Completed
                } else {
                    ResultStatus::Failed
                }
            }
        };
        Self {
            status,
            results,
            metadata: ParallelStageMetadata {
                successful_count,
                failed_count,
                total_count,
            },
        }
    }
}

/// Surface-level fields extracted from a raw alert at ingress; `alert_data`
/// itself remains a schemaless `JsonValue` map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingAlert {
    pub alert_type: String,
    pub severity: Option<String>,
    pub environment: Option<String>,
    pub runbook_url: Option<String>,
    pub data: HashMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_terminal_invariant() {
        let mut s = Session::new("s1", "kubernetes", serde_json::json!({}), serde_json::json!({}));
        assert!(s.terminal_invariant_holds());
        s.status = SessionStatus::Completed;
        assert!(!s.terminal_invariant_holds());
        s.completed_at_us = Some(1);
        assert!(s.terminal_invariant_holds());
    }

    #[test]
    fn stage_execution_terminal_invariant() {
        let mut se = StageExecution::new(
            "e1", "s1", 0, "stage-0", "investigate", "kubernetes-agent", None, 0,
            ParallelType::Single, None,
        );
        assert!(se.terminal_invariant_holds());
        se.status = StageStatus::Completed;
        assert!(!se.terminal_invariant_holds());
        se.started_at_us = Some(1_000_000);
        se.completed_at_us = Some(3_500_000);
        se.duration_ms = Some(2_500);
        assert!(se.terminal_invariant_holds());
    }

    #[test]
    fn parallel_aggregate_any_policy() {
        let results = vec![
            AgentExecutionResult {
                status: ResultStatus::Completed,
                agent_or_stage_name: "a".into(),
                timestamp_us: 0,
                token_usage: None,
                result_summary: None,
                paused_conversation_state: None,
            },
            AgentExecutionResult {
                status: ResultStatus::Completed,
                agent_or_stage_name: "b".into(),
                timestamp_us: 0,
                token_usage: None,
                result_summary: None,
                paused_conversation_state: None,
            },
            AgentExecutionResult {
                status: ResultStatus::Failed,
                agent_or_stage_name: "c".into(),
                timestamp_us: 0,
                token_usage: None,
                result_summary: None,
                paused_conversation_state: None,
            },
        ];
        let agg = ParallelStageResult::aggregate(results, FailurePolicy::Any);
        assert_eq!(agg.status, ResultStatus::Completed);
        assert_eq!(agg.metadata.successful_count, 2);
        assert_eq!(agg.metadata.failed_count, 1);
        assert_eq!(agg.metadata.total_count, 3);
    }

    #[test]
    fn parallel_aggregate_all_policy_fails_on_one_failure() {
        let results = vec![
            AgentExecutionResult {
                status: ResultStatus::Completed,
                agent_or_stage_name: "a".into(),
                timestamp_us: 0,
                token_usage: None,
                result_summary: None,
                paused_conversation_state: None,
            },
            AgentExecutionResult {
                status: ResultStatus::Failed,
                agent_or_stage_name: "b".into(),
                timestamp_us: 0,
                token_usage: None,
                result_summary: None,
                paused_conversation_state: None,
            },
        ];
        let agg = ParallelStageResult::aggregate(results, FailurePolicy::All);
        assert_eq!(agg.status, ResultStatus::Failed);
    }

    #[test]
    fn event_payload_session_id_accessor() {
        let p = EventPayload::StageStarted {
            session_id: "s1".into(),
            stage_id: "stage-0".into(),
        };
        assert_eq!(p.session_id(), "s1");
    }
}
