//! In-process pub/sub registry plus the background listener loop that
//! feeds it — LISTEN-triggered on PostgreSQL in a full deployment,
//! polling everywhere else.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sqlx::AnyPool;

use tarsy_domain::config::DbBackend;
use tarsy_domain::error::Result;
use tarsy_domain::model::Event;

use crate::store;

pub type Callback = Arc<dyn Fn(Event) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Registry {
    channels: Mutex<HashMap<String, Vec<(u64, Callback)>>>,
    next_id: AtomicU64,
}

impl Registry {
    fn subscribe(&self, channel: &str, callback: Callback) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.channels
            .lock()
            .entry(channel.to_owned())
            .or_default()
            .push((id, callback));
        SubscriptionId(id)
    }

    fn unsubscribe(&self, channel: &str, id: SubscriptionId) {
        let mut channels = self.channels.lock();
        if let Some(subs) = channels.get_mut(channel) {
            subs.retain(|(sub_id, _)| *sub_id != id.0);
            if subs.is_empty() {
                channels.remove(channel);
            }
        }
    }

    fn dispatch(&self, event: &Event) {
        let channels = self.channels.lock();
        if let Some(subs) = channels.get(&event.channel) {
            for (_, callback) in subs {
                callback(event.clone());
            }
        }
    }

    fn active_channels(&self) -> Vec<String> {
        self.channels.lock().keys().cloned().collect()
    }
}

/// The append-only event log plus its in-process fan-out registry.
pub struct EventBus {
    pool: AnyPool,
    backend: DbBackend,
    registry: Registry,
}

impl EventBus {
    pub fn new(pool: AnyPool, backend: DbBackend) -> Arc<Self> {
        Arc::new(Self { pool, backend, registry: Registry::default() })
    }

    /// Inserts the event row on `tx` (the caller's transaction — commit
    /// is the caller's responsibility) and NOTIFYs on PostgreSQL.
    /// Callbacks are dispatched only by the listener loop, once the
    /// event is durably committed, never synchronously here.
    pub async fn publish(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Any>,
        channel: &str,
        payload: &tarsy_domain::model::EventPayload,
    ) -> Result<i64> {
        store::insert_event(tx, self.backend, channel, payload).await
    }

    /// Exposes the pool so a caller can open its own transaction, publish
    /// on it alongside its own row writes, and commit atomically.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn subscribe(&self, channel: &str, callback: Callback) -> SubscriptionId {
        self.registry.subscribe(channel, callback)
    }

    pub fn unsubscribe(&self, channel: &str, id: SubscriptionId) {
        self.registry.unsubscribe(channel, id);
    }

    /// Events on `channel` after `last_event_id`, for a client's
    /// subscribe-with-catchup request.
    pub async fn catchup(&self, channel: &str, last_event_id: i64) -> Result<Vec<Event>> {
        store::events_after(&self.pool, channel, last_event_id).await
    }

    /// Runs the background listener until cancelled. Restarts its poll
    /// loop on a capped exponential backoff (250ms, 500ms, 1s, 2s, 4s,
    /// 5s…) whenever a query fails, so a transient DB blip doesn't kill
    /// event delivery for the rest of the process's life.
    ///
    /// TODO: when `backend` is PostgreSQL, layer a `sqlx::postgres::PgListener`
    /// on top of this loop for push-based wakeups instead of pure polling —
    /// needs its own native postgres pool since `sqlx::Any` doesn't expose
    /// `LISTEN` notifications.
    pub async fn run(self: Arc<Self>, poll_interval: Duration) {
        let mut last_seen: HashMap<String, i64> = HashMap::new();
        let mut backoff_ms: u64 = 250;
        loop {
            tokio::time::sleep(poll_interval).await;
            let channels = self.registry.active_channels();
            let mut had_error = false;
            for channel in channels {
                let since = *last_seen.get(&channel).unwrap_or(&0);
                match store::events_after(&self.pool, &channel, since).await {
                    Ok(events) => {
                        for event in &events {
                            last_seen.insert(channel.clone(), event.id);
                            self.registry.dispatch(event);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(channel = %channel, error = %e, "event listener poll failed");
                        had_error = true;
                    }
                }
            }
            if had_error {
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(5_000);
            } else {
                backoff_ms = 250;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn sample_event(id: i64, channel: &str) -> Event {
        Event {
            id,
            channel: channel.to_owned(),
            payload: tarsy_domain::model::EventPayload::SessionCreated { session_id: "s1".into() },
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn dispatch_calls_only_matching_channel_subscribers() {
        let registry = Registry::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        registry.subscribe("sessions", Arc::new(move |_| { hits2.fetch_add(1, Ordering::SeqCst); }));
        registry.dispatch(&sample_event(1, "sessions"));
        registry.dispatch(&sample_event(2, "session:other"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_future_dispatch() {
        let registry = Registry::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        let id = registry.subscribe("sessions", Arc::new(move |_| { hits2.fetch_add(1, Ordering::SeqCst); }));
        registry.dispatch(&sample_event(1, "sessions"));
        registry.unsubscribe("sessions", id);
        registry.dispatch(&sample_event(2, "sessions"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn active_channels_reflects_current_subscriptions() {
        let registry = Registry::default();
        assert!(registry.active_channels().is_empty());
        let id = registry.subscribe("sessions", Arc::new(|_| {}));
        assert_eq!(registry.active_channels(), vec!["sessions".to_string()]);
        registry.unsubscribe("sessions", id);
        assert!(registry.active_channels().is_empty());
    }

    #[test]
    fn multiple_subscribers_on_same_channel_all_fire() {
        let registry = Registry::default();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let hits = hits.clone();
            registry.subscribe("sessions", Arc::new(move |_| { hits.fetch_add(1, Ordering::SeqCst); }));
        }
        registry.dispatch(&sample_event(1, "sessions"));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}
