//! `tarsy-mcp` — MCP (Model Context Protocol) client for tarsy agents.
//!
//! This crate provides:
//! - JSON-RPC 2.0 protocol types for communicating with MCP servers.
//! - A stdio transport that spawns child processes and communicates over stdin/stdout.
//! - An `McpManager` that manages connections to multiple MCP servers,
//!   orchestrates tool discovery/dispatch, and masks tool results per
//!   server before returning them.
//! - A background health monitor ([`health::run`]) that periodically
//!   probes every configured server.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tarsy_mcp::{McpConfig, McpManager};
//!
//! let config: McpConfig = /* from TOML */;
//! let manager = McpManager::from_config(&config).await;
//!
//! // List all discovered tools.
//! for (server_id, tool) in manager.list_tools() {
//!     println!("mcp:{server_id}:{}", tool.name);
//! }
//!
//! // Call a tool (result is masked according to that server's MaskingConfig).
//! let result = manager.call_tool("kubernetes", "get_pods", json!({"namespace": "default"})).await?;
//! ```

pub mod config;
pub mod health;
pub mod manager;
pub mod protocol;
pub mod transport;

// Re-exports for convenience.
pub use config::{McpConfig, McpServerConfig, McpTransportKind};
pub use manager::{McpError, McpManager};
pub use protocol::McpToolDef;
