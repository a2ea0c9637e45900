//! Boundary trait for the actual LLM provider call — the SDK wrapper
//! itself is out of scope, but iteration controllers need something to
//! call and to mock in tests.

use async_trait::async_trait;

use tarsy_domain::error::Result;
use tarsy_domain::model::ConversationMessage;

/// One non-streaming LLM completion, plus the fields native-thinking
/// needs back from a tool-calling-capable provider.
#[derive(Debug, Clone, Default)]
pub struct LlmCompletion {
    pub content: String,
    pub tool_calls: Vec<NativeToolCall>,
    pub is_final: bool,
    pub thought_signature: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NativeToolCall {
    pub server: String,
    pub tool: String,
    pub arguments: serde_json::Value,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, conversation: &[ConversationMessage]) -> Result<LlmCompletion>;

    /// Native-tool-calling variant: the provider is given the MCP tool
    /// schemas and may reply with one or more tool calls instead of text.
    async fn complete_with_tools(
        &self,
        conversation: &[ConversationMessage],
        tool_schemas: &serde_json::Value,
    ) -> Result<LlmCompletion> {
        // Providers that don't support native tool-calling can just fall
        // back to a plain completion; `NativeThinkingController` requires
        // a real implementation of this, but no other controller does.
        self.complete(conversation).await
    }
}
