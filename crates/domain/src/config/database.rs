use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Database backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// The history repository and event bus are DB-backed: PostgreSQL gets
// native LISTEN/NOTIFY pub-sub, SQLite falls back to polling the `events`
// table. Both backends share the same schema and queries.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DbBackend {
    #[default]
    Sqlite,
    Postgres,
}

impl DbBackend {
    /// Only PostgreSQL supports DB-native NOTIFY; SQLite listeners poll.
    pub fn supports_notify(self) -> bool {
        matches!(self, DbBackend::Postgres)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: DbBackend,
    #[serde(default = "d_url")]
    pub url: String,
    #[serde(default = "d_pool_size")]
    pub pool_size: u32,
    /// Event-bus poll interval for the SQLite fallback listener.
    #[serde(default = "d_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DbBackend::default(),
            url: d_url(),
            pool_size: d_pool_size(),
            poll_interval_ms: d_poll_interval_ms(),
        }
    }
}

fn d_url() -> String {
    "sqlite://tarsy.db".into()
}
fn d_pool_size() -> u32 {
    10
}
fn d_poll_interval_ms() -> u64 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_postgres_supports_notify() {
        assert!(DbBackend::Postgres.supports_notify());
        assert!(!DbBackend::Sqlite.supports_notify());
    }

    #[test]
    fn default_backend_is_sqlite() {
        assert_eq!(DatabaseConfig::default().backend, DbBackend::Sqlite);
    }
}
