//! Per-session cancellation and pause flags (spec.md §5: "a per-session
//! cancellation registry maps `session_id` → cancellation flag + task
//! handle"). A second instance of this map is used for chat-execution
//! cancellation, keyed by `exec_id` instead of `session_id`.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Clone)]
pub struct SessionFlags {
    pub cancelled: Arc<AtomicBool>,
    pub paused: Arc<AtomicBool>,
}

impl SessionFlags {
    fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)), paused: Arc::new(AtomicBool::new(false)) }
    }
}

/// Tracks the live cancellation/pause flags for every in-flight session
/// task, so an HTTP handler can signal a running `ChainExecutor` without
/// holding a reference to its task.
pub struct CancellationRegistry {
    flags: Mutex<HashMap<String, SessionFlags>>,
}

impl Default for CancellationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self { flags: Mutex::new(HashMap::new()) }
    }

    pub fn register(&self, key: &str) -> SessionFlags {
        let flags = SessionFlags::new();
        self.flags.lock().insert(key.to_owned(), flags.clone());
        flags
    }

    pub fn cancel(&self, key: &str) -> bool {
        match self.flags.lock().get(key) {
            Some(f) => {
                f.cancelled.store(true, std::sync::atomic::Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, key: &str) {
        self.flags.lock().remove(key);
    }

    pub fn is_running(&self, key: &str) -> bool {
        self.flags.lock().contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn register_then_cancel_flips_flag() {
        let registry = CancellationRegistry::new();
        let flags = registry.register("s1");
        assert!(!flags.cancelled.load(Ordering::Acquire));
        assert!(registry.cancel("s1"));
        assert!(flags.cancelled.load(Ordering::Acquire));
    }

    #[test]
    fn cancel_unknown_session_returns_false() {
        let registry = CancellationRegistry::new();
        assert!(!registry.cancel("ghost"));
    }

    #[test]
    fn remove_stops_tracking_session() {
        let registry = CancellationRegistry::new();
        registry.register("s1");
        registry.remove("s1");
        assert!(!registry.is_running("s1"));
    }
}
