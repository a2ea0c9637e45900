//! MCP (Model Context Protocol) configuration types for the domain layer.
//!
//! These are lightweight config structs deserialized from the service's
//! `[mcp]` config section. The actual MCP client/transport logic lives in
//! the `tarsy-mcp` crate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::masking::MaskingConfig;

/// Top-level MCP configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,
    /// Health monitor poll interval. Spec default: 30s.
    #[serde(default = "d_health_interval_ms")]
    pub health_check_interval_ms: u64,
    /// Probe timeout used by the health monitor's `list_tools` call.
    #[serde(default = "d_health_probe_timeout_ms")]
    pub health_probe_timeout_ms: u64,
}

/// Configuration for a single MCP server connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Unique identifier for this server (used in tool naming: `{id}.{tool}`).
    pub id: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub transport: McpTransportKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Per-call timeout. Spec default: 70s.
    #[serde(default = "d_call_timeout_ms")]
    pub call_timeout_ms: u64,
    #[serde(default)]
    pub masking: MaskingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum McpTransportKind {
    #[default]
    Stdio,
    Sse,
}

fn d_health_interval_ms() -> u64 {
    30_000
}
fn d_health_probe_timeout_ms() -> u64 {
    5_000
}
fn d_call_timeout_ms() -> u64 {
    70_000
}
