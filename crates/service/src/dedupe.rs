//! Alert-id dedup cache: detects resubmitted alerts at the API boundary.
//! TTL/size come from [`tarsy_domain::config::DedupeConfig`]; not part of
//! the core session state machine (spec.md §4.H).

use std::time::Duration;

use moka::future::Cache;

use tarsy_domain::config::DedupeConfig;

/// Maps an idempotency key (caller-supplied, or derived from
/// `alert_type`+`alert_data` when absent) to the `session_id` it was
/// first associated with.
pub struct AlertDedupeCache {
    cache: Cache<String, String>,
}

impl AlertDedupeCache {
    pub fn new(config: &DedupeConfig) -> Self {
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(config.ttl_secs))
            .max_capacity(config.max_entries)
            .build();
        Self { cache }
    }

    /// Returns the existing `session_id` for `key` if one was already
    /// recorded, otherwise associates `key` with `session_id` and
    /// returns `None` (first submission).
    pub async fn check_and_insert(&self, key: &str, session_id: &str) -> Option<String> {
        if let Some(existing) = self.cache.get(key).await {
            return Some(existing);
        }
        self.cache.insert(key.to_owned(), session_id.to_owned()).await;
        None
    }

    pub async fn len(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DedupeConfig {
        DedupeConfig { ttl_secs: 3600, max_entries: 100 }
    }

    #[tokio::test]
    async fn first_submission_returns_none() {
        let cache = AlertDedupeCache::new(&config());
        assert_eq!(cache.check_and_insert("alert-1", "session-1").await, None);
    }

    #[tokio::test]
    async fn resubmission_returns_prior_session_id() {
        let cache = AlertDedupeCache::new(&config());
        cache.check_and_insert("alert-1", "session-1").await;
        let existing = cache.check_and_insert("alert-1", "session-2").await;
        assert_eq!(existing.as_deref(), Some("session-1"));
    }

    #[tokio::test]
    async fn distinct_keys_are_independent() {
        let cache = AlertDedupeCache::new(&config());
        cache.check_and_insert("alert-1", "session-1").await;
        assert_eq!(cache.check_and_insert("alert-2", "session-2").await, None);
    }
}
