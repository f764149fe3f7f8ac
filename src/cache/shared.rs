//! Shared Cache Handle
//!
//! [`TimedCache`] puts a store behind one lock so any number of tasks can use
//! it concurrently. Clones share the same store.

use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::cache::{CacheStats, DataCache, LruStore, SweepStore};
use crate::config::CacheConfig;
use crate::tasks::PeriodicTask;

/// Capacity- and age-bounded cache swept by a periodic task.
pub type SweepCache<K, V> = TimedCache<SweepStore<K, V>>;

/// Access-ordered cache without time-based expiry.
pub type LruCache<K, V> = TimedCache<LruStore<K, V>>;

// == Timed Cache ==
/// Lock-guarded, cloneable handle to a [`DataCache`] store.
///
/// Every operation takes the lock for its whole duration, so operations on
/// one cache are totally ordered. A `get` racing an eviction simply observes
/// the absent value.
#[derive(Debug)]
pub struct TimedCache<S> {
    store: Arc<Mutex<S>>,
}

impl<S> Clone for TimedCache<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: DataCache> TimedCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    /// Upserts `value` stamped with the current time.
    pub async fn add(&self, key: S::Key, value: S::Value) {
        self.store.lock().await.add(key, value);
    }

    /// Returns the stored value, or `None` if absent.
    pub async fn get(&self, key: &S::Key) -> Option<S::Value> {
        self.store.lock().await.get(key)
    }

    pub async fn contains(&self, key: &S::Key) -> bool {
        self.store.lock().await.contains(key)
    }

    /// Removes the entry if present; returns whether anything was removed.
    pub async fn delete(&self, key: &S::Key) -> bool {
        self.store.lock().await.delete(key)
    }

    pub async fn len(&self) -> usize {
        self.store.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.lock().await.is_empty()
    }

    pub async fn stats(&self) -> CacheStats {
        self.store.lock().await.stats()
    }
}

impl<K, V> TimedCache<SweepStore<K, V>>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Builds a sweeping cache from configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(SweepStore::new(config.max_records, config.max_hold_time))
    }

    /// Runs one age sweep immediately.
    pub async fn sweep_expired(&self) -> usize {
        self.store.lock().await.sweep_expired()
    }

    /// The periodic job that keeps this cache's entries within their hold time.
    pub fn sweep_task(&self) -> Arc<dyn PeriodicTask> {
        Arc::new(CacheSweepTask {
            cache: self.clone(),
        })
    }
}

impl<K, V> TimedCache<LruStore<K, V>>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn with_capacity(max_records: usize) -> Self {
        Self::new(LruStore::new(max_records))
    }
}

struct CacheSweepTask<K, V> {
    cache: SweepCache<K, V>,
}

#[async_trait]
impl<K, V> PeriodicTask for CacheSweepTask<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    async fn run(&self) -> usize {
        let removed = self.cache.sweep_expired().await;
        debug!(removed, "Cache age sweep finished");
        removed
    }
}
