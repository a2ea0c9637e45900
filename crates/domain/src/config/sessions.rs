use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session / chain-execution runtime settings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Sessions still `in_progress` older than this are transitioned to
    /// `failed` by the orphan-cleanup sweep.
    #[serde(default = "d_cleanup_timeout_min")]
    pub cleanup_orphaned_timeout_min: u64,
    /// Rows older than this are eligible for retention deletion.
    #[serde(default = "d_retention_days")]
    pub retention_days: u64,
    /// Graceful-shutdown grace period before tracked session tasks are
    /// cancelled outright.
    #[serde(default = "d_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    /// Alert-id dedup cache (API boundary, not part of the core state
    /// machine). TTL 4h / 10k entries per spec.
    #[serde(default)]
    pub dedupe: DedupeConfig,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            cleanup_orphaned_timeout_min: d_cleanup_timeout_min(),
            retention_days: d_retention_days(),
            shutdown_grace_secs: d_shutdown_grace_secs(),
            dedupe: DedupeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupeConfig {
    #[serde(default = "d_dedupe_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "d_dedupe_max_entries")]
    pub max_entries: u64,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            ttl_secs: d_dedupe_ttl_secs(),
            max_entries: d_dedupe_max_entries(),
        }
    }
}

fn d_cleanup_timeout_min() -> u64 {
    60
}
fn d_retention_days() -> u64 {
    90
}
fn d_shutdown_grace_secs() -> u64 {
    30
}
fn d_dedupe_ttl_secs() -> u64 {
    4 * 3600
}
fn d_dedupe_max_entries() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_defaults_match_spec() {
        let d = DedupeConfig::default();
        assert_eq!(d.ttl_secs, 14_400);
        assert_eq!(d.max_entries, 10_000);
    }
}
