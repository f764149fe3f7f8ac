//! Lifecycle Tests
//!
//! Cross-component behavior over simulated time: the pool bound under
//! concurrency, leak reclamation, idle reaping through the shared scheduler
//! and paged navigation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use botkit::cache::{SweepStore, TimedCache};
use botkit::config::PoolConfig;
use botkit::error::PoolError;
use botkit::paging::{PageSink, PagedView};
use botkit::pool::{ConnectionManager, ConnectionPool};
use botkit::session::{
    ButtonClickEvent, ButtonRegistry, ChannelUserKey, Dispatch, MessageEvent, ResponseRegistry,
    SessionHandler,
};
use botkit::Scheduler;

// == Helpers ==

#[derive(Default)]
struct CountingManager {
    opened: AtomicUsize,
    open_now: AtomicUsize,
    peak: AtomicUsize,
}

#[derive(Debug)]
struct Conn {
    closed: AtomicUsize,
}

#[async_trait]
impl ConnectionManager for CountingManager {
    type Connection = Conn;

    async fn connect(&self) -> anyhow::Result<Conn> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let now = self.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Ok(Conn {
            closed: AtomicUsize::new(0),
        })
    }

    async fn is_valid(&self, _conn: &Conn) -> anyhow::Result<()> {
        Ok(())
    }

    async fn close(&self, conn: &Conn) {
        if conn.closed.fetch_add(1, Ordering::SeqCst) == 0 {
            self.open_now.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

fn pool_config(max_connections: usize) -> PoolConfig {
    PoolConfig {
        max_connections,
        get_timeout: Duration::from_secs(3),
        validation_timeout: Duration::from_secs(1),
        max_release_wait: Duration::from_secs(60),
        check_interval: Duration::from_secs(10),
    }
}

// == Connection Pool ==

#[tokio::test(start_paused = true)]
async fn test_pool_never_exceeds_max_connections() {
    let pool = ConnectionPool::new(CountingManager::default(), pool_config(3));
    let outstanding = Arc::new(AtomicUsize::new(0));
    let peak_outstanding = Arc::new(AtomicUsize::new(0));

    let mut workers = Vec::new();
    for _ in 0..12 {
        let pool = pool.clone();
        let outstanding = Arc::clone(&outstanding);
        let peak_outstanding = Arc::clone(&peak_outstanding);
        workers.push(tokio::spawn(async move {
            let conn = pool.get_connection().await?;
            let now = outstanding.fetch_add(1, Ordering::SeqCst) + 1;
            peak_outstanding.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(100)).await;

            outstanding.fetch_sub(1, Ordering::SeqCst);
            pool.release_connection(conn).await;
            Ok::<_, PoolError>(())
        }));
    }

    for worker in workers {
        worker.await.unwrap().unwrap();
    }

    assert!(peak_outstanding.load(Ordering::SeqCst) <= 3);
    let status = pool.status().await;
    assert!(status.available <= 3);
    assert_eq!(status.checked_out, 0);
}

#[tokio::test(start_paused = true)]
async fn test_pool_reclaims_through_scheduler() {
    let pool = ConnectionPool::new(CountingManager::default(), pool_config(1));
    let scheduler = Scheduler::new();
    scheduler
        .register("pool-reclaim", pool.config().check_interval, pool.reclaim_task())
        .await;
    scheduler.start().await;

    let leaked = pool.get_connection().await.unwrap();

    // Past max_release_wait plus one check interval.
    tokio::time::sleep(Duration::from_secs(71)).await;
    assert_eq!(pool.status().await.reclaimed_total, 1);
    assert_eq!(leaked.closed.load(Ordering::SeqCst), 1);

    let fresh = pool.get_connection().await.unwrap();
    pool.release_connection(leaked).await;

    let status = pool.status().await;
    assert_eq!(status.checked_out, 1);
    assert_eq!(status.available, 0);

    pool.release_connection(fresh).await;
    assert_eq!(pool.status().await.available, 1);
    scheduler.shutdown().await;
}

// == Session Registry ==

struct Reminder {
    key: ChannelUserKey,
    destroyed: Arc<AtomicUsize>,
}

#[async_trait]
impl SessionHandler<MessageEvent> for Reminder {
    fn key(&self) -> ChannelUserKey {
        self.key
    }

    async fn handle(&mut self, _event: &MessageEvent) -> anyhow::Result<Dispatch> {
        Ok(Dispatch::Continue)
    }

    async fn on_destroy(&mut self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    fn max_live(&self) -> Duration {
        Duration::from_millis(10)
    }
}

#[tokio::test(start_paused = true)]
async fn test_idle_handler_reaped_once_by_scheduler() {
    let registry = ResponseRegistry::new("responses");
    let scheduler = Scheduler::new();
    scheduler
        .register("response-reap", Duration::from_millis(5), registry.reap_task())
        .await;
    scheduler.start().await;

    let destroyed = Arc::new(AtomicUsize::new(0));
    registry
        .register(Reminder {
            key: ChannelUserKey::new(1, 2),
            destroyed: Arc::clone(&destroyed),
        })
        .await;

    // 10ms max_live plus one 5ms sweep interval, with slack for tie-breaking.
    tokio::time::sleep(Duration::from_millis(16)).await;
    assert!(registry.is_empty().await);
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_dispatch_and_reap_destroy_once() {
    let registry = ResponseRegistry::new("responses");
    let destroyed = Arc::new(AtomicUsize::new(0));

    for user in 0..20 {
        registry
            .register(Reminder {
                key: ChannelUserKey::new(1, user),
                destroyed: Arc::clone(&destroyed),
            })
            .await;
    }
    tokio::time::advance(Duration::from_millis(11)).await;

    let reaper = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.reap_idle().await })
    };
    let remover = {
        let registry = registry.clone();
        tokio::spawn(async move {
            for user in 0..20 {
                registry.remove(&ChannelUserKey::new(1, user)).await;
            }
        })
    };
    reaper.await.unwrap();
    remover.await.unwrap();
    tokio::task::yield_now().await;

    assert!(registry.is_empty().await);
    assert_eq!(destroyed.load(Ordering::SeqCst), 20);
}

// == Cache ==

#[tokio::test(start_paused = true)]
async fn test_cache_entry_gone_after_hold_plus_interval() {
    let cache = TimedCache::new(SweepStore::new(10, Duration::from_millis(100)));
    let scheduler = Scheduler::new();
    scheduler
        .register("cache-sweep", Duration::from_millis(50), cache.sweep_task())
        .await;
    scheduler.start().await;

    cache.add("skin:Notch".to_string(), vec![1u8, 2, 3]).await;
    tokio::time::sleep(Duration::from_millis(151)).await;

    assert_eq!(cache.get(&"skin:Notch".to_string()).await, None);
    assert_eq!(cache.stats().await.expirations, 1);
    scheduler.shutdown().await;
}

// == Paged View ==

#[derive(Default)]
struct Frames(Mutex<Vec<usize>>);

impl PageSink<usize> for Frames {
    fn replace(&self, page: usize) {
        self.0.lock().unwrap().push(page);
    }

    fn remove_controls(&self) {}
}

#[tokio::test]
async fn test_paged_view_cycles_through_five_pages() {
    let frames = Arc::new(Frames::default());
    let buttons = ButtonRegistry::new("buttons");
    let sink: Arc<dyn PageSink<usize>> = frames.clone();
    let view = PagedView::new(77, 4, |page| page, sink);
    view.open(&buttons).await;

    let click = |id: &str| ButtonClickEvent::new(77, 1, 2, id);

    for _ in 0..5 {
        buttons.dispatch(&click("right_page")).await;
    }
    assert_eq!(view.current_page().await, 0);

    buttons.dispatch(&click("left_page")).await;
    assert_eq!(view.current_page().await, 4);

    assert_eq!(*frames.0.lock().unwrap(), vec![0, 1, 2, 3, 4, 0, 4]);
}
