//! Per-Service sync bookkeeping.
//!
//! One `SyncTracker` lives for the lifetime of a controller run. It records
//! which Services have completed a successful pass and carries the backoff
//! state of the ones that are failing. The tracker is cloned into the
//! reconcile context and cleared when the controller shuts down.

use crate::backoff::FibonacciBackoff;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct SyncState {
    synced: bool,
    error_count: u32,
    backoff: FibonacciBackoff,
}

/// Shared sync state keyed by `namespace/name`
#[derive(Debug, Clone, Default)]
pub struct SyncTracker {
    states: Arc<Mutex<HashMap<String, SyncState>>>,
}

impl SyncTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SyncState>> {
        // A poisoned map only holds retry bookkeeping; keep using it
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a successful pass and reset the Service's backoff
    pub fn mark_synced(&self, key: &str) {
        let mut states = self.lock();
        let state = states.entry(key.to_string()).or_default();
        state.synced = true;
        state.error_count = 0;
        state.backoff.reset();
    }

    /// True once the Service has had at least one successful pass
    pub fn is_synced(&self, key: &str) -> bool {
        self.lock().get(key).is_some_and(|s| s.synced)
    }

    /// Record a failed pass and return the delay before the next attempt
    pub fn record_failure(&self, key: &str) -> Duration {
        let mut states = self.lock();
        let state = states.entry(key.to_string()).or_default();
        state.error_count += 1;
        state.backoff.next_backoff()
    }

    /// Consecutive failures since the last success
    pub fn error_count(&self, key: &str) -> u32 {
        self.lock().get(key).map_or(0, |s| s.error_count)
    }

    /// Drop all state for a Service (after teardown)
    pub fn forget(&self, key: &str) {
        self.lock().remove(key);
    }

    /// Drop all state (controller shutdown)
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of Services with state
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }
}
