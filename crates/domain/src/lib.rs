//! Shared types for the tarsy workspace: configuration, the core data
//! model (sessions, stage executions, interactions, events), the
//! provider-agnostic tool/message format, the streaming event type, and
//! the crate-wide `Error`.
//!
//! Every other `tarsy-*` crate depends on this one for its vocabulary;
//! it has no dependency on any sibling crate.

pub mod config;
pub mod error;
pub mod model;
pub mod stream;
pub mod tool;

pub use error::{Error, Result};
