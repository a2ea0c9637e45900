//! Background health monitor for MCP server connections.
//!
//! Every `health_check_interval_ms`, probes each server with a
//! `tools/list` call bounded by `health_probe_timeout_ms`. A failing
//! probe logs a warning, but only once per `(category, server_id)` pair
//! until the server recovers — a flapping stdio server would otherwise
//! flood the log at the configured poll interval.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::manager::McpManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthCategory {
    Timeout,
    ProtocolError,
    ServerDown,
}

impl std::fmt::Display for HealthCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthCategory::Timeout => "timeout",
            HealthCategory::ProtocolError => "protocol_error",
            HealthCategory::ServerDown => "server_down",
        };
        write!(f, "{s}")
    }
}

/// Tracks which `(category, server_id)` warnings have already been
/// emitted, so the monitor logs a transition rather than every poll.
struct WarningDedup {
    active: HashSet<(HealthCategory, String)>,
}

impl WarningDedup {
    fn new() -> Self {
        Self { active: HashSet::new() }
    }

    /// Returns `true` the first time this combination is seen (i.e. the
    /// caller should log); subsequent calls for the same still-failing
    /// combination return `false`.
    fn should_log(&mut self, category: HealthCategory, server_id: &str) -> bool {
        self.active.insert((category, server_id.to_string()))
    }

    fn clear(&mut self, server_id: &str) {
        self.active.retain(|(_, id)| id != server_id);
    }
}

/// Runs the health-check loop until the returned `tokio::task::JoinHandle`
/// is aborted or the process exits. Intended to be spawned once at
/// startup alongside the `McpManager`.
pub async fn run(manager: Arc<McpManager>, interval_ms: u64, probe_timeout_ms: u64) {
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    let dedup = Mutex::new(WarningDedup::new());

    loop {
        ticker.tick().await;

        for server_id in manager.server_ids() {
            let probe = tokio::time::timeout(
                Duration::from_millis(probe_timeout_ms),
                manager.probe_tools_list(&server_id),
            )
            .await;

            let mut dedup = dedup.lock().await;
            match probe {
                Err(_) => {
                    if dedup.should_log(HealthCategory::Timeout, &server_id) {
                        tracing::warn!(server_id = %server_id, "MCP health probe timed out");
                    }
                }
                Ok(Err(e)) => {
                    let category = if e.to_string().contains("down") {
                        HealthCategory::ServerDown
                    } else {
                        HealthCategory::ProtocolError
                    };
                    if dedup.should_log(category, &server_id) {
                        tracing::warn!(server_id = %server_id, error = %e, category = %category, "MCP health probe failed");
                    }
                }
                Ok(Ok(())) => {
                    dedup.clear(&server_id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_occurrence_logs_subsequent_does_not() {
        let mut dedup = WarningDedup::new();
        assert!(dedup.should_log(HealthCategory::Timeout, "kubernetes"));
        assert!(!dedup.should_log(HealthCategory::Timeout, "kubernetes"));
    }

    #[test]
    fn distinct_categories_both_log() {
        let mut dedup = WarningDedup::new();
        assert!(dedup.should_log(HealthCategory::Timeout, "kubernetes"));
        assert!(dedup.should_log(HealthCategory::ProtocolError, "kubernetes"));
    }

    #[test]
    fn clearing_allows_relog_after_recovery() {
        let mut dedup = WarningDedup::new();
        assert!(dedup.should_log(HealthCategory::Timeout, "kubernetes"));
        dedup.clear("kubernetes");
        assert!(dedup.should_log(HealthCategory::Timeout, "kubernetes"));
    }
}
