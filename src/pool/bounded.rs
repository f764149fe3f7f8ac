//! Bounded connection pool.
//!
//! Every connection the pool knows about is either idle in the `available`
//! queue or recorded in the `checked_out` map, never both. A connection being
//! validated or opened holds a [`Reservation`] counted in `pending`, so that
//! concurrent callers can never open more than `max_connections` between them.
//! Dropping a reservation, including by cancelling `get_connection`, gives
//! the slot back.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::pool::{ConnectionManager, PooledConnection};
use crate::tasks::PeriodicTask;

struct Idle<C> {
    id: u64,
    conn: Arc<C>,
}

struct Checkout<C> {
    conn: Arc<C>,
    since: Instant,
}

struct PoolState<C> {
    available: VecDeque<Idle<C>>,
    checked_out: HashMap<u64, Checkout<C>>,
    reclaimed_total: u64,
}

/// Occupancy counters, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub available: usize,
    pub checked_out: usize,
    pub max_connections: usize,
    pub reclaimed_total: u64,
}

struct PoolInner<M: ConnectionManager> {
    manager: M,
    config: PoolConfig,
    state: Mutex<PoolState<M::Connection>>,
    /// Reserved slots. Only incremented under `state`; may be decremented
    /// without it, which can only overstate the live count.
    pending: AtomicUsize,
    next_id: AtomicU64,
    /// Signalled whenever a connection or a slot frees up.
    freed: Notify,
}

// == Reservation ==
/// A slot held while a connection is validated or opened.
///
/// Releases the slot on drop unless consumed by a checkout. A connection
/// still held at that point is closed in the background.
struct Reservation<M: ConnectionManager> {
    inner: Arc<PoolInner<M>>,
    conn: Option<Idle<M::Connection>>,
    active: bool,
}

impl<M: ConnectionManager> Reservation<M> {
    /// Hands the slot over to a checkout.
    fn complete(mut self) {
        self.conn = None;
        self.active = false;
        self.inner.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<M: ConnectionManager> Drop for Reservation<M> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Some(idle) = self.conn.take() {
            debug!(conn_id = idle.id, "Checkout abandoned, closing its connection");
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let inner = Arc::clone(&self.inner);
                handle.spawn(async move {
                    inner.manager.close(&idle.conn).await;
                });
            }
        }
        self.inner.pending.fetch_sub(1, Ordering::SeqCst);
        self.inner.freed.notify_one();
    }
}

// == Connection Pool ==
/// Cheap to clone; all clones share one pool.
pub struct ConnectionPool<M: ConnectionManager> {
    inner: Arc<PoolInner<M>>,
}

impl<M: ConnectionManager> Clone for ConnectionPool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: ConnectionManager> ConnectionPool<M> {
    pub fn new(manager: M, config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                manager,
                state: Mutex::new(PoolState {
                    available: VecDeque::with_capacity(config.max_connections),
                    checked_out: HashMap::new(),
                    reclaimed_total: 0,
                }),
                config,
                pending: AtomicUsize::new(0),
                next_id: AtomicU64::new(1),
                freed: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    // == Get Connection ==
    /// Checks out a validated connection.
    ///
    /// Reuses an idle connection when one passes its liveness check, opens a
    /// new one while under `max_connections`, and otherwise waits up to
    /// `get_timeout` for one to be returned. An idle connection that fails
    /// its check is closed and replaced by a fresh one in the same call.
    pub async fn get_connection(&self) -> Result<PooledConnection<M::Connection>, PoolError> {
        let deadline = Instant::now() + self.inner.config.get_timeout;

        loop {
            let freed = self.inner.freed.notified();
            tokio::pin!(freed);
            // Registered before inspecting, so a release in between wakes us.
            freed.as_mut().enable();

            let Some(mut reservation) = self.try_acquire().await else {
                if tokio::time::timeout_at(deadline, freed).await.is_err() {
                    warn!(
                        waited_ms = self.inner.config.get_timeout.as_millis() as u64,
                        "Connection pool exhausted"
                    );
                    return Err(PoolError::Exhausted {
                        waited: self.inner.config.get_timeout,
                    });
                }
                continue;
            };

            if let Some(idle) = reservation.conn.as_ref() {
                if self.validate(idle).await {
                    let (id, conn) = (idle.id, Arc::clone(&idle.conn));
                    return Ok(self.check_out(reservation, id, conn).await);
                }
                if let Some(idle) = reservation.conn.take() {
                    debug!(conn_id = idle.id, "Discarding invalid pooled connection");
                    self.inner.manager.close(&idle.conn).await;
                }
            }
            // The reserved slot carries over to the replacement.
            return self.open_reserved(reservation).await;
        }
    }

    // == Release Connection ==
    /// Returns a connection to the pool.
    ///
    /// A connection the pool no longer tracks (it was reclaimed as leaked) is
    /// closed instead.
    pub async fn release_connection(&self, conn: PooledConnection<M::Connection>) {
        let tracked = {
            let mut state = self.inner.state.lock().await;
            match state.checked_out.remove(&conn.id) {
                Some(_) => {
                    state.available.push_back(Idle {
                        id: conn.id,
                        conn: Arc::clone(&conn.conn),
                    });
                    debug!(
                        conn_id = conn.id,
                        available = state.available.len(),
                        "Connection returned"
                    );
                    true
                }
                None => false,
            }
        };

        if tracked {
            self.inner.freed.notify_one();
        } else {
            debug!(conn_id = conn.id, "Released connection was reclaimed earlier, closing it");
            self.inner.manager.close(&conn.conn).await;
        }
    }

    // == Reclaim Leaked ==
    /// Closes every connection checked out longer than `max_release_wait`.
    ///
    /// Reclaimed connections are dropped from the pool, not made available
    /// again; their slots become free for new connections.
    pub async fn reclaim_leaked(&self) -> usize {
        let max_release_wait = self.inner.config.max_release_wait;
        let leaked: Vec<(u64, Checkout<M::Connection>)> = {
            let mut state = self.inner.state.lock().await;
            let now = Instant::now();
            let ids: Vec<u64> = state
                .checked_out
                .iter()
                .filter(|(_, c)| now.saturating_duration_since(c.since) > max_release_wait)
                .map(|(id, _)| *id)
                .collect();

            let leaked: Vec<_> = ids
                .into_iter()
                .filter_map(|id| state.checked_out.remove(&id).map(|c| (id, c)))
                .collect();
            state.reclaimed_total += leaked.len() as u64;
            leaked
        };

        for (id, checkout) in &leaked {
            warn!(
                conn_id = id,
                elapsed_ms = checkout.since.elapsed().as_millis() as u64,
                "Reclaiming unreleased connection"
            );
            self.inner.manager.close(&checkout.conn).await;
            self.inner.freed.notify_one();
        }

        leaked.len()
    }

    /// The periodic job that reclaims leaked checkouts.
    pub fn reclaim_task(&self) -> Arc<dyn PeriodicTask> {
        Arc::new(PoolReclaimTask { pool: self.clone() })
    }

    // == Close Idle ==
    /// Closes all idle connections, e.g. on shutdown.
    pub async fn close_idle(&self) -> usize {
        let idle: Vec<Idle<M::Connection>> = {
            let mut state = self.inner.state.lock().await;
            state.available.drain(..).collect()
        };
        for conn in &idle {
            self.inner.manager.close(&conn.conn).await;
        }
        if !idle.is_empty() {
            info!(closed = idle.len(), "Closed idle connections");
            self.inner.freed.notify_one();
        }
        idle.len()
    }

    pub async fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock().await;
        PoolStatus {
            available: state.available.len(),
            checked_out: state.checked_out.len(),
            max_connections: self.inner.config.max_connections,
            reclaimed_total: state.reclaimed_total,
        }
    }

    /// Takes an idle connection or reserves a slot to open one.
    async fn try_acquire(&self) -> Option<Reservation<M>> {
        let mut state = self.inner.state.lock().await;
        let idle = state.available.pop_front();
        let live = state.available.len()
            + state.checked_out.len()
            + self.inner.pending.load(Ordering::SeqCst);

        if idle.is_none() && live >= self.inner.config.max_connections {
            return None;
        }
        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        Some(Reservation {
            inner: Arc::clone(&self.inner),
            conn: idle,
            active: true,
        })
    }

    async fn validate(&self, idle: &Idle<M::Connection>) -> bool {
        let check = self.inner.manager.is_valid(&idle.conn);
        match tokio::time::timeout(self.inner.config.validation_timeout, check).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!(conn_id = idle.id, error = %e, "Connection failed liveness check");
                false
            }
            Err(_) => {
                debug!(conn_id = idle.id, "Connection liveness check timed out");
                false
            }
        }
    }

    /// Opens a connection into the slot held by `reservation`.
    async fn open_reserved(
        &self,
        mut reservation: Reservation<M>,
    ) -> Result<PooledConnection<M::Connection>, PoolError> {
        match self.inner.manager.connect().await {
            Ok(conn) => {
                let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
                debug!(conn_id = id, "Opened a new connection");
                let conn = Arc::new(conn);
                reservation.conn = Some(Idle {
                    id,
                    conn: Arc::clone(&conn),
                });
                Ok(self.check_out(reservation, id, conn).await)
            }
            Err(e) => {
                drop(reservation);
                warn!(error = %e, "Failed to establish a new connection");
                Err(PoolError::Connect(e))
            }
        }
    }

    /// Records the reserved connection as checked out.
    ///
    /// `reservation` keeps its own handle on `conn` until the record is in
    /// place, so cancelling here still closes the connection.
    async fn check_out(
        &self,
        reservation: Reservation<M>,
        id: u64,
        conn: Arc<M::Connection>,
    ) -> PooledConnection<M::Connection> {
        let mut state = self.inner.state.lock().await;
        let now = Instant::now();
        state.checked_out.insert(
            id,
            Checkout {
                conn: Arc::clone(&conn),
                since: now,
            },
        );
        reservation.complete();
        PooledConnection {
            id,
            conn,
            checked_out_at: now,
        }
    }
}

struct PoolReclaimTask<M: ConnectionManager> {
    pool: ConnectionPool<M>,
}

#[async_trait]
impl<M: ConnectionManager> PeriodicTask for PoolReclaimTask<M> {
    async fn run(&self) -> usize {
        self.pool.reclaim_leaked().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct FakeConn {
        serial: usize,
        healthy: AtomicBool,
        /// Liveness check never answers.
        hangs: AtomicBool,
        closes: AtomicUsize,
    }

    #[derive(Default)]
    struct FakeManager {
        opened: AtomicUsize,
        refuse: AtomicBool,
        connect_delay_ms: AtomicU64,
    }

    #[async_trait]
    impl ConnectionManager for FakeManager {
        type Connection = FakeConn;

        async fn connect(&self) -> anyhow::Result<FakeConn> {
            let delay = self.connect_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            if self.refuse.load(Ordering::SeqCst) {
                anyhow::bail!("connection refused");
            }
            let serial = self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(FakeConn {
                serial,
                healthy: AtomicBool::new(true),
                hangs: AtomicBool::new(false),
                closes: AtomicUsize::new(0),
            })
        }

        async fn is_valid(&self, conn: &FakeConn) -> anyhow::Result<()> {
            if conn.hangs.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if conn.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                anyhow::bail!("connection {} went away", conn.serial)
            }
        }

        async fn close(&self, conn: &FakeConn) {
            conn.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn pool(max_connections: usize) -> ConnectionPool<FakeManager> {
        ConnectionPool::new(
            FakeManager::default(),
            PoolConfig {
                max_connections,
                get_timeout: Duration::from_millis(300),
                validation_timeout: Duration::from_millis(50),
                max_release_wait: Duration::from_secs(60),
                check_interval: Duration::from_secs(1),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_released_connection_is_reused() {
        let pool = pool(2);

        let conn = pool.get_connection().await.unwrap();
        let first = conn.serial;
        pool.release_connection(conn).await;

        let conn = pool.get_connection().await.unwrap();
        assert_eq!(conn.serial, first);
        assert_eq!(pool.inner.manager.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_pool_times_out() {
        let pool = pool(1);
        let _held = pool.get_connection().await.unwrap();

        let start = Instant::now();
        let err = pool.get_connection().await.unwrap_err();

        assert!(matches!(err, PoolError::Exhausted { .. }));
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_gets_released_connection() {
        let pool = pool(1);
        let held = pool.get_connection().await.unwrap();
        let serial = held.serial;

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.get_connection().await.map(|c| c.serial) })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        pool.release_connection(held).await;

        assert_eq!(waiter.await.unwrap().unwrap(), serial);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_connection_is_replaced() {
        let pool = pool(1);

        let conn = pool.get_connection().await.unwrap();
        conn.healthy.store(false, Ordering::SeqCst);
        pool.release_connection(conn).await;

        let conn = pool.get_connection().await.unwrap();
        assert_eq!(conn.serial, 1, "a fresh connection replaces the dead one");

        let status = pool.status().await;
        assert_eq!(status.checked_out, 1);
        assert_eq!(status.available, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_frees_reserved_slot() {
        let pool = pool(1);
        pool.inner.manager.refuse.store(true, Ordering::SeqCst);

        assert!(matches!(pool.get_connection().await, Err(PoolError::Connect(_))));

        pool.inner.manager.refuse.store(false, Ordering::SeqCst);
        assert!(pool.get_connection().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_leaked_connection_is_reclaimed_and_late_release_closes() {
        let pool = pool(1);
        let leaked = pool.get_connection().await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(pool.reclaim_leaked().await, 1);
        assert_eq!(leaked.closes.load(Ordering::SeqCst), 1);

        // The slot is free again.
        let fresh = pool.get_connection().await.unwrap();
        assert_ne!(fresh.serial, leaked.serial);

        pool.release_connection(leaked).await;
        let status = pool.status().await;
        assert_eq!(status.checked_out, 1);
        assert_eq!(status.available, 0);
        assert_eq!(status.reclaimed_total, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recent_checkouts_survive_reclaim() {
        let pool = pool(2);
        let conn = pool.get_connection().await.unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(pool.reclaim_leaked().await, 0);

        pool.release_connection(conn).await;
        assert_eq!(pool.status().await.available, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_idle() {
        let pool = pool(3);
        let a = pool.get_connection().await.unwrap();
        let b = pool.get_connection().await.unwrap();
        pool.release_connection(a).await;
        pool.release_connection(b).await;

        assert_eq!(pool.close_idle().await, 2);
        assert_eq!(pool.status().await.available, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_liveness_check_replaces_connection() {
        let pool = pool(1);

        let conn = pool.get_connection().await.unwrap();
        let stale = Arc::clone(&conn.conn);
        stale.hangs.store(true, Ordering::SeqCst);
        pool.release_connection(conn).await;

        let start = Instant::now();
        let fresh = pool.get_connection().await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_millis(50));
        assert_eq!(stale.closes.load(Ordering::SeqCst), 1);
        assert_ne!(fresh.serial, stale.serial);
        assert_eq!(pool.status().await.checked_out, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_connect_gives_slot_back() {
        let pool = pool(1);
        pool.inner.manager.connect_delay_ms.store(500, Ordering::SeqCst);

        let abandoned = tokio::time::timeout(Duration::from_millis(10), pool.get_connection()).await;
        assert!(abandoned.is_err());

        let status = pool.status().await;
        assert_eq!(status.available, 0);
        assert_eq!(status.checked_out, 0);

        pool.inner.manager.connect_delay_ms.store(0, Ordering::SeqCst);
        assert!(pool.get_connection().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_validation_closes_connection_and_frees_slot() {
        let pool = pool(1);

        let conn = pool.get_connection().await.unwrap();
        let stale = Arc::clone(&conn.conn);
        stale.hangs.store(true, Ordering::SeqCst);
        pool.release_connection(conn).await;

        let abandoned = tokio::time::timeout(Duration::from_millis(10), pool.get_connection()).await;
        assert!(abandoned.is_err());

        // The close runs on a spawned task.
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(stale.closes.load(Ordering::SeqCst), 1);

        let fresh = pool.get_connection().await.unwrap();
        assert_ne!(fresh.serial, stale.serial);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_waiter_does_not_block_others() {
        let pool = pool(1);
        let held = pool.get_connection().await.unwrap();

        let abandoned = tokio::time::timeout(Duration::from_millis(10), pool.get_connection()).await;
        assert!(abandoned.is_err());

        pool.release_connection(held).await;
        assert!(pool.get_connection().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_releases_wake_both_waiters() {
        let pool = pool(2);
        let a = pool.get_connection().await.unwrap();
        let b = pool.get_connection().await.unwrap();

        let start = Instant::now();
        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.get_connection().await.map(|c| c.id()) })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(10)).await;

        pool.release_connection(a).await;
        pool.release_connection(b).await;

        for waiter in waiters {
            assert!(waiter.await.unwrap().is_ok());
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
