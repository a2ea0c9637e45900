//! The two hook classes: one persists records via the history
//! repository, the other publishes the matching event. Kept as traits
//! so `tarsy-service` can wire concrete `tarsy-history`/`tarsy-events`
//! implementations without this crate depending on either.

use async_trait::async_trait;

use tarsy_domain::error::Result;
use tarsy_domain::model::{LlmInteraction, McpInteraction, StageExecution};

#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn save_llm_interaction(&self, interaction: &LlmInteraction) -> Result<()>;
    async fn save_mcp_interaction(&self, interaction: &McpInteraction) -> Result<()>;
    async fn save_stage_execution(&self, stage: &StageExecution) -> Result<()>;
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish_llm_interaction(&self, interaction: &LlmInteraction) -> Result<()>;
    async fn publish_mcp_interaction(&self, interaction: &McpInteraction) -> Result<()>;
    async fn publish_stage_execution(&self, stage: &StageExecution) -> Result<()>;
}
