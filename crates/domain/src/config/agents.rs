use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent definitions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// An agent is a configured combination of allowed MCP servers, custom
// instructions, and an iteration strategy. It holds no behavior itself —
// the dispatch table in `tarsy-agents` selects the controller for its
// `iteration_strategy`.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IterationStrategy {
    #[default]
    React,
    ReactStage,
    ReactFinalAnalysis,
    NativeThinking,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// MCP server ids this agent may call. Empty = all configured servers.
    #[serde(default)]
    pub mcp_servers: Vec<String>,
    #[serde(default)]
    pub iteration_strategy: IterationStrategy,
    /// Appended to the agent's general instructions.
    #[serde(default)]
    pub custom_instructions: Option<String>,
    #[serde(default = "d_max_iterations")]
    pub max_iterations: u32,
    /// When true, a forced final LLM call is made at `max_iterations` to
    /// produce a best-effort conclusion instead of pausing the session.
    #[serde(default)]
    pub force_conclusion_at_max_iterations: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mcp_servers: Vec::new(),
            iteration_strategy: IterationStrategy::default(),
            custom_instructions: None,
            max_iterations: d_max_iterations(),
            force_conclusion_at_max_iterations: false,
        }
    }
}

fn d_max_iterations() -> u32 {
    30
}
