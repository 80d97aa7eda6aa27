//! Process-scoped key/value cache with per-entry expiry
//!
//! Expired entries are evicted lazily when read and in bulk by [`TtlCache::sweep`],
//! which the sweep task calls on a timer.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use crate::clock::Clock;

struct Entry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

/// Outcome of a one-shot [`TtlCache::take`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<V> {
    Fresh(V),
    Expired,
    Missing,
}

pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert or refresh an entry; returns its expiry.
    pub fn insert(&self, key: K, value: V) -> DateTime<Utc> {
        let expires_at = self.clock.now() + self.ttl;
        self.entries.lock().insert(key, Entry { value, expires_at });
        expires_at
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Remove the entry and report whether it was still live.
    pub fn take(&self, key: &K) -> Lookup<V> {
        let now = self.clock.now();
        match self.entries.lock().remove(key) {
            Some(entry) if entry.expires_at > now => Lookup::Fresh(entry.value),
            Some(_) => Lookup::Expired,
            None => Lookup::Missing,
        }
    }

    pub fn remove(&self, key: &K) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Live keys matching `pred`; expired entries met along the way are dropped.
    pub fn live_keys<F>(&self, mut pred: F) -> Vec<K>
    where
        F: FnMut(&K) -> bool,
    {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| entry.expires_at > now);
        entries.keys().filter(|k| pred(k)).cloned().collect()
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
