//! Checked-out connection handle.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// A connection on loan from a [`super::ConnectionPool`].
///
/// Hand it back with [`super::ConnectionPool::release_connection`]. Dropping it
/// instead leaks the checkout until the pool's reclamation closes it.
pub struct PooledConnection<C> {
    pub(crate) id: u64,
    pub(crate) conn: Arc<C>,
    pub(crate) checked_out_at: Instant,
}

impl<C> PooledConnection<C> {
    /// Pool-unique identifier of the underlying connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// How long this handle has been checked out.
    pub fn checkout_age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.checked_out_at)
    }
}

impl<C> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.conn
    }
}

impl<C> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("checked_out_at", &self.checked_out_at)
            .finish_non_exhaustive()
    }
}
