//! `tarsy-chain` — runs a resolved alert-response chain's stages
//! (sequential and parallel) against a session, and supports resuming a
//! paused session from its last checkpoint.

pub mod agent_runner;
pub mod context;
pub mod executor;
pub mod result;
pub mod resume;
pub mod sinks;

pub use context::ChainContext;
pub use executor::{ChainExecutor, LlmResolver, ResumeCheckpoint};
pub use result::ChainExecutionResult;
pub use resume::ResumeCoordinator;
pub use sinks::{BusEventSink, RepositoryHistorySink};
