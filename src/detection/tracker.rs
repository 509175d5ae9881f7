//! Per-actor sliding-window activity tracking
//!
//! Feeds the rate-abuse and account-churn detectors. Each tracking key holds
//! an ordered list of timestamped actions, pruned against a fixed retention
//! horizon on every write.

use std::collections::HashMap;

use crate::models::ActionKind;

#[derive(Debug, Clone, Copy)]
struct TrackedEvent {
    action: ActionKind,
    timestamp: i64,
}

/// Sliding window entry for one tracking key
#[derive(Debug, Clone, Default)]
struct WindowEntry {
    events: Vec<TrackedEvent>,
}

impl WindowEntry {
    /// Add an event and prune entries outside the retention horizon
    fn add_and_prune(&mut self, action: ActionKind, timestamp: i64, retention_secs: i64) {
        let cutoff = timestamp - retention_secs;
        self.events.retain(|e| e.timestamp > cutoff);
        self.events.push(TrackedEvent { action, timestamp });
    }
}

/// Maintains per-key sliding windows of recent actions.
///
/// Absent keys behave as empty; no operation here can fail. Keys whose
/// windows have fully drained are removed by `prune_idle`, which the owning
/// engine runs on a periodic sweep.
pub struct ActivityTracker {
    windows: HashMap<String, WindowEntry>,
    /// Retention horizon in seconds; windowed counts never look further back
    retention_secs: i64,
}

impl ActivityTracker {
    pub fn new(retention_secs: i64) -> Self {
        ActivityTracker {
            windows: HashMap::new(),
            retention_secs,
        }
    }

    /// Record an action for a key, evicting anything older than the horizon.
    pub fn record(&mut self, key: &str, action: ActionKind, now: i64) {
        self.windows
            .entry(key.to_string())
            .or_default()
            .add_and_prune(action, now, self.retention_secs);
    }

    /// Count events for a key within the most recent `window_secs`. An event
    /// sitting exactly on the window boundary is still inside it.
    pub fn window_count(&self, key: &str, window_secs: i64, now: i64) -> usize {
        let cutoff = now - window_secs;
        self.windows
            .get(key)
            .map(|e| e.events.iter().filter(|ev| ev.timestamp >= cutoff).count())
            .unwrap_or(0)
    }

    /// Count events of the given kinds for a key within `window_secs`.
    ///
    /// The churn window (1 h) is longer than the retention horizon (5 min),
    /// so counts are bounded by the horizon; this mirrors the source system,
    /// which filtered the same retained list against the longer window.
    pub fn window_count_of(
        &self,
        key: &str,
        kinds: &[ActionKind],
        window_secs: i64,
        now: i64,
    ) -> usize {
        let cutoff = now - window_secs;
        self.windows
            .get(key)
            .map(|e| {
                e.events
                    .iter()
                    .filter(|ev| ev.timestamp >= cutoff && kinds.contains(&ev.action))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Drop keys whose windows have fully drained.
    pub fn prune_idle(&mut self, now: i64) {
        let cutoff = now - self.retention_secs;
        self.windows.retain(|_, entry| {
            entry.events.retain(|e| e.timestamp > cutoff);
            !entry.events.is_empty()
        });
    }

    /// Number of keys currently tracked
    pub fn key_count(&self) -> usize {
        self.windows.len()
    }
}
