//! Cache Store Module
//!
//! The two eviction strategies behind [`DataCache`]:
//! - [`SweepStore`]: capacity bound by creation time plus a periodic age sweep
//! - [`LruStore`]: access-ordered, capacity bound only
//!
//! Neither store checks expiry on `get`; stale entries in a [`SweepStore`]
//! stay readable until the next sweep removes them.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use crate::cache::{CacheEntry, CacheStats, DataCache, LruTracker};

// == Sweep Store ==
/// Capacity- and age-bounded store.
///
/// Overflowing `add` synchronously drops the oldest entries by creation time;
/// [`SweepStore::sweep_expired`] drops entries older than `max_hold_time`.
/// An entry can therefore outlive its hold time by up to one sweep interval.
#[derive(Debug)]
pub struct SweepStore<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    stats: CacheStats,
    max_records: usize,
    max_hold_time: Duration,
}

impl<K: Eq + Hash + Clone, V: Clone> SweepStore<K, V> {
    // == Constructor ==
    /// # Arguments
    /// * `max_records` - Entries kept after any `add` returns
    /// * `max_hold_time` - Age past which the sweep removes an entry
    pub fn new(max_records: usize, max_hold_time: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            stats: CacheStats::new(),
            max_records,
            max_hold_time,
        }
    }

    pub fn max_hold_time(&self) -> Duration {
        self.max_hold_time
    }

    // == Cleanup Expired ==
    /// Removes every entry older than the hold time; returns how many.
    pub fn sweep_expired(&mut self) -> usize {
        let before = self.entries.len();
        let max_hold_time = self.max_hold_time;
        self.entries
            .retain(|_, entry| !entry.is_older_than(max_hold_time));

        let removed = before - self.entries.len();
        self.stats.record_expirations(removed);
        self.stats.set_total_entries(self.entries.len());
        removed
    }

    fn evict_exceeding(&mut self) {
        let to_delete = self.entries.len().saturating_sub(self.max_records);
        if to_delete == 0 {
            return;
        }

        // Capacity is small, a full sort is fine.
        let mut by_age: Vec<(&K, _)> = self
            .entries
            .iter()
            .map(|(key, entry)| (key, entry.created_at))
            .collect();
        by_age.sort_by_key(|(_, created_at)| *created_at);

        let oldest: Vec<K> = by_age
            .into_iter()
            .take(to_delete)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &oldest {
            self.entries.remove(key);
        }
        self.stats.record_evictions(oldest.len());
    }
}

impl<K: Eq + Hash + Clone, V: Clone> DataCache for SweepStore<K, V> {
    type Key = K;
    type Value = V;

    fn add(&mut self, key: K, value: V) {
        self.entries.insert(key, CacheEntry::new(value));
        if self.entries.len() > self.max_records {
            self.evict_exceeding();
        }
        self.stats.set_total_entries(self.entries.len());
    }

    fn get(&mut self, key: &K) -> Option<V> {
        match self.entries.get(key) {
            Some(entry) => {
                self.stats.record_hit();
                Some(entry.value.clone())
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    fn delete(&mut self, key: &K) -> bool {
        let removed = self.entries.remove(key).is_some();
        self.stats.set_total_entries(self.entries.len());
        removed
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }
}

// == LRU Store ==
/// Access-ordered store holding at most `max_records` entries.
///
/// `get` and `add` promote a key to most recently used; an insert past
/// capacity evicts the single least recently used entry.
#[derive(Debug)]
pub struct LruStore<K, V> {
    entries: HashMap<K, V>,
    lru: LruTracker<K>,
    stats: CacheStats,
    max_records: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> LruStore<K, V> {
    pub fn new(max_records: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            max_records,
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> DataCache for LruStore<K, V> {
    type Key = K;
    type Value = V;

    fn add(&mut self, key: K, value: V) {
        self.lru.touch(&key);
        self.entries.insert(key, value);

        if self.entries.len() > self.max_records {
            if let Some(evicted) = self.lru.evict_oldest() {
                self.entries.remove(&evicted);
                self.stats.record_evictions(1);
            }
        }
        self.stats.set_total_entries(self.entries.len());
    }

    fn get(&mut self, key: &K) -> Option<V> {
        match self.entries.get(key) {
            Some(value) => {
                let value = value.clone();
                self.lru.touch(key);
                self.stats.record_hit();
                Some(value)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    fn delete(&mut self, key: &K) -> bool {
        self.lru.remove(key);
        let removed = self.entries.remove(key).is_some();
        self.stats.set_total_entries(self.entries.len());
        removed
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }
}
