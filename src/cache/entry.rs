//! Cache Entry Module
//!
//! A stored value stamped with its creation time.

use std::time::Duration;

use tokio::time::Instant;

// == Cache Entry ==
/// A single cache entry with value and creation timestamp.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// When the entry was last written
    pub created_at: Instant,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates an entry stamped with the current time.
    pub fn new(value: V) -> Self {
        Self {
            value,
            created_at: Instant::now(),
        }
    }

    // == Age ==
    /// Time elapsed since the entry was written.
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.created_at)
    }

    // == Is Older Than ==
    /// Checks whether the entry outlived `max_hold_time`.
    ///
    /// Boundary condition: an entry whose age equals `max_hold_time` exactly is
    /// still fresh; it becomes stale strictly after that.
    pub fn is_older_than(&self, max_hold_time: Duration) -> bool {
        self.age() > max_hold_time
    }
}
