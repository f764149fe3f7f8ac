//! Cache Module
//!
//! Bounded key/value caches used to memoize upstream responses.
//!
//! Two strategies share the [`DataCache`] contract:
//! - [`SweepStore`]: capacity bound by age of creation plus a periodic TTL sweep
//! - [`LruStore`]: access-ordered eviction, no time-based expiry
//!
//! Callers use them through the lock-guarded [`TimedCache`] handle.

mod entry;
mod lru;
mod shared;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

pub use entry::CacheEntry;
pub use lru::LruTracker;
pub use shared::{LruCache, SweepCache, TimedCache};
pub use stats::CacheStats;
pub use store::{LruStore, SweepStore};

// == Data Cache ==
/// Synchronous store contract shared by both eviction strategies.
///
/// `get` never evaluates expiry and a miss is `None`, never an error.
pub trait DataCache {
    type Key;
    type Value;

    /// Upserts the value; never fails.
    fn add(&mut self, key: Self::Key, value: Self::Value);

    fn get(&mut self, key: &Self::Key) -> Option<Self::Value>;

    /// Presence check that does not count as an access.
    fn contains(&self, key: &Self::Key) -> bool;

    /// Removes the entry if present; returns whether anything was removed.
    fn delete(&mut self, key: &Self::Key) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stats(&self) -> CacheStats;
}
