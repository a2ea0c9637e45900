//! Scoped recording of every LLM/MCP interaction and stage-execution
//! transition into durable history plus the event bus, with a
//! disable-after-5-consecutive-failures safety valve per hook type.

pub mod context;
pub mod sink;
pub mod tracker;

pub use context::{LlmInteractionHookContext, McpInteractionHookContext, StageExecutionHookContext};
pub use sink::{EventSink, HistorySink};
pub use tracker::{FailureTracker, HookKind};
