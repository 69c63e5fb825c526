//! Diagnostic emission gates.
//!
//! Degraded states recur every poll cycle; these gates keep the log useful
//! by letting one line through at the boundary and spacing the rest. All
//! state is per instance, so independent engines never share gates and
//! tests never bleed into each other.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Lets each key through exactly once.
#[derive(Debug)]
pub struct Once<K> {
    seen: HashSet<K>,
}

impl<K: Eq + Hash> Once<K> {
    pub fn new() -> Self {
        Self {
            seen: HashSet::new(),
        }
    }

    /// True the first time a key is offered, false forever after.
    pub fn first(&mut self, key: K) -> bool {
        self.seen.insert(key)
    }
}

impl<K: Eq + Hash> Default for Once<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Lets each key through at most once per interval.
#[derive(Debug)]
pub struct Throttle<K> {
    last: HashMap<K, Instant>,
}

impl<K: Eq + Hash> Throttle<K> {
    pub fn new() -> Self {
        Self {
            last: HashMap::new(),
        }
    }

    /// True when at least `min_interval` has passed since the gate last
    /// opened for this key; opening records `now`. The clock is an argument
    /// so tests can drive a synthetic one.
    pub fn ready(&mut self, key: K, min_interval: Duration, now: Instant) -> bool {
        match self.last.get(&key) {
            Some(prev) if now.duration_since(*prev) < min_interval => false,
            _ => {
                self.last.insert(key, now);
                true
            }
        }
    }

    /// Record an emission that bypassed `ready`, closing the gate behind it.
    pub fn mark(&mut self, key: K, now: Instant) {
        self.last.insert(key, now);
    }
}

impl<K: Eq + Hash> Default for Throttle<K> {
    fn default() -> Self {
        Self::new()
    }
}
