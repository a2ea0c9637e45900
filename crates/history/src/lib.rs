//! The history repository: durable storage for sessions, stage
//! executions, and LLM/MCP interactions, plus the stage-execution
//! manager that enforces the timing invariants on top of it.
//!
//! Backed by [`sqlx::AnyPool`] so the same queries run against either
//! SQLite (default, zero-ops) or PostgreSQL (when `database.backend =
//! "postgres"` — needed for multi-replica deployments, since only
//! PostgreSQL supports `LISTEN`/`NOTIFY` for the event bus in
//! `tarsy-events`).

pub mod repository;
pub mod stage_manager;

pub use repository::{HistoryRepository, SessionFilter};
pub use stage_manager::StageExecutionManager;
