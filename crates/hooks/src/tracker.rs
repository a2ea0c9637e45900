//! Per-hook-type consecutive-failure counting.
//!
//! A hook (history or event) that fails 5 times in a row disables
//! itself — it stops being invoked and logs a one-time warning. Any
//! success resets its counter to zero.

use std::collections::HashMap;

use parking_lot::Mutex;

const DISABLE_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    History,
    Event,
}

#[derive(Default)]
pub struct FailureTracker {
    consecutive_failures: Mutex<HashMap<HookKind, u32>>,
    disabled: Mutex<HashMap<HookKind, bool>>,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_disabled(&self, kind: HookKind) -> bool {
        *self.disabled.lock().get(&kind).unwrap_or(&false)
    }

    pub fn record_success(&self, kind: HookKind) {
        self.consecutive_failures.lock().insert(kind, 0);
    }

    /// Records a failure; returns `true` exactly on the transition into
    /// the disabled state (so the caller logs the warning once).
    pub fn record_failure(&self, kind: HookKind) -> bool {
        let count = {
            let mut failures = self.consecutive_failures.lock();
            let entry = failures.entry(kind).or_insert(0);
            *entry += 1;
            *entry
        };
        if count >= DISABLE_THRESHOLD {
            let mut disabled = self.disabled.lock();
            let was_disabled = *disabled.get(&kind).unwrap_or(&false);
            disabled.insert(kind, true);
            !was_disabled
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disables_at_exactly_five_consecutive_failures() {
        let tracker = FailureTracker::new();
        for _ in 0..4 {
            assert!(!tracker.record_failure(HookKind::History));
            assert!(!tracker.is_disabled(HookKind::History));
        }
        assert!(tracker.record_failure(HookKind::History));
        assert!(tracker.is_disabled(HookKind::History));
    }

    #[test]
    fn success_resets_the_counter() {
        let tracker = FailureTracker::new();
        for _ in 0..4 {
            tracker.record_failure(HookKind::History);
        }
        tracker.record_success(HookKind::History);
        for _ in 0..4 {
            assert!(!tracker.record_failure(HookKind::History));
        }
        assert!(!tracker.is_disabled(HookKind::History));
    }

    #[test]
    fn hook_kinds_tracked_independently() {
        let tracker = FailureTracker::new();
        for _ in 0..5 {
            tracker.record_failure(HookKind::History);
        }
        assert!(tracker.is_disabled(HookKind::History));
        assert!(!tracker.is_disabled(HookKind::Event));
    }

    #[test]
    fn disabled_transition_reported_only_once() {
        let tracker = FailureTracker::new();
        for _ in 0..4 {
            tracker.record_failure(HookKind::History);
        }
        assert!(tracker.record_failure(HookKind::History));
        // Already disabled — further failures don't re-report the transition.
        assert!(!tracker.record_failure(HookKind::History));
    }
}
