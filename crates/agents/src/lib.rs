//! `tarsy-agents` — ReAct text parsing, action-to-tool-call conversion,
//! and the iteration controllers that drive a stage's LLM/MCP loop.

pub mod action;
pub mod controller;
pub mod llm;
pub mod parser;

pub use action::{convert_action_to_tool_call, ToolCallRequest};
pub use controller::{
    NativeThinkingController, ReactController, ReactFinalAnalysisController, ReactStageController, StageContext,
};
pub use llm::{LlmClient, LlmCompletion, NativeToolCall};
pub use parser::{parse, ReActParseResult};
