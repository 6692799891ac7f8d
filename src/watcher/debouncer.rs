//! Keyed debouncing of change events.
//!
//! Each key has at most one pending deadline. Recording a key again pushes
//! its deadline back; a key is ready once it has been quiet for the whole
//! duration. The debouncer owns no timers: callers sleep until
//! [`Debouncer::next_deadline`] and then call [`Debouncer::take_ready`].

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Debounces events by key.
///
/// Records change timestamps and returns keys that have been stable
/// for the configured duration.
#[derive(Debug)]
pub struct Debouncer<K> {
    /// Pending keys: key -> last event timestamp.
    pending: HashMap<K, Instant>,
    /// How long a key must be quiet before it is ready.
    duration: Duration,
}

impl<K: Eq + Hash + Clone> Debouncer<K> {
    /// Create a new debouncer with the given duration in milliseconds.
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            pending: HashMap::new(),
            duration: Duration::from_millis(debounce_ms),
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Record an event, restarting the quiet period for this key.
    pub fn record(&mut self, key: K) {
        self.record_at(key, Instant::now());
    }

    pub fn record_at(&mut self, key: K, at: Instant) {
        self.pending.insert(key, at);
    }

    /// Drop a pending key. Returns whether it was pending.
    ///
    /// A cancelled key is never returned by a later `take_ready`.
    pub fn cancel(&mut self, key: &K) -> bool {
        self.pending.remove(key).is_some()
    }

    /// Drop every pending key.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Take all keys that have been quiet for the debounce duration.
    pub fn take_ready(&mut self) -> Vec<K> {
        self.take_ready_at(Instant::now())
    }

    pub fn take_ready_at(&mut self, now: Instant) -> Vec<K> {
        let mut ready = Vec::new();

        self.pending.retain(|key, last_event| {
            if now.saturating_duration_since(*last_event) >= self.duration {
                ready.push(key.clone());
                false
            } else {
                true
            }
        });

        ready
    }

    /// Earliest instant at which some key becomes ready.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().map(|last| *last + self.duration)
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    /// Check if there are any pending keys.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
