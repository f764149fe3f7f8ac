//! Shared Scheduler
//!
//! A single background task drives every periodic sweep in the process:
//! cache expiry, pool leak reclamation and session idle reaping. Components
//! register a [`PeriodicTask`] instead of spawning their own timers, so
//! shutting the scheduler down stops all of them at once.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

// == Periodic Task ==
/// A unit of periodic work.
#[async_trait]
pub trait PeriodicTask: Send + Sync {
    /// Runs one pass and returns how many items it removed.
    async fn run(&self) -> usize;
}

struct Job {
    name: String,
    interval: Duration,
    next_due: Instant,
    task: Arc<dyn PeriodicTask>,
}

struct SchedulerInner {
    jobs: Mutex<Vec<Job>>,
    /// Wakes the loop when the job list changes.
    wake: Notify,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

// == Scheduler ==
/// Cheap to clone; all clones drive the same loop.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(SchedulerInner {
                jobs: Mutex::new(Vec::new()),
                wake: Notify::new(),
                shutdown_tx,
                handle: Mutex::new(None),
            }),
        }
    }

    // == Register ==
    /// Adds a job that first runs one `interval` from now.
    ///
    /// Safe to call before or after [`Scheduler::start`].
    pub async fn register(
        &self,
        name: impl Into<String>,
        interval: Duration,
        task: Arc<dyn PeriodicTask>,
    ) {
        let name = name.into();
        debug!(job = %name, interval_ms = interval.as_millis() as u64, "Registering periodic job");

        self.inner.jobs.lock().await.push(Job {
            name,
            interval,
            next_due: Instant::now() + interval,
            task,
        });
        self.inner.wake.notify_one();
    }

    /// Number of registered jobs.
    pub async fn job_count(&self) -> usize {
        self.inner.jobs.lock().await.len()
    }

    // == Start ==
    /// Spawns the scheduler loop. Calling it twice has no effect.
    pub async fn start(&self) {
        let mut handle = self.inner.handle.lock().await;
        if handle.is_some() {
            return;
        }

        let inner = Arc::clone(&self.inner);
        let shutdown_rx = self.inner.shutdown_tx.subscribe();
        *handle = Some(tokio::spawn(run_loop(inner, shutdown_rx)));
    }

    // == Shutdown ==
    /// Stops the loop and waits for it to exit.
    ///
    /// No periodic job runs after this returns.
    pub async fn shutdown(&self) {
        self.inner.shutdown_tx.send_replace(true);

        let handle = self.inner.handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Scheduler task ended abnormally");
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_loop(inner: Arc<SchedulerInner>, mut shutdown_rx: watch::Receiver<bool>) {
    info!("Scheduler started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let next_due = inner.jobs.lock().await.iter().map(|job| job.next_due).min();
        let wait = async {
            match next_due {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = inner.wake.notified() => continue,
            _ = wait => {}
        }

        run_due_jobs(&inner).await;
    }

    info!("Scheduler stopped");
}

async fn run_due_jobs(inner: &SchedulerInner) {
    let now = Instant::now();
    let due: Vec<(String, Arc<dyn PeriodicTask>)> = {
        let mut jobs = inner.jobs.lock().await;
        jobs.iter_mut()
            .filter(|job| job.next_due <= now)
            .map(|job| {
                job.next_due = now + job.interval;
                (job.name.clone(), Arc::clone(&job.task))
            })
            .collect()
    };

    for (name, task) in due {
        match AssertUnwindSafe(task.run()).catch_unwind().await {
            Ok(0) => debug!(job = %name, "Periodic sweep found nothing to remove"),
            Ok(removed) => info!(job = %name, removed, "Periodic sweep removed entries"),
            Err(panic) => error!(
                job = %name,
                panic = panic_message(panic.as_ref()),
                "Periodic job panicked, keeping it scheduled"
            ),
        }
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "<non-string panic>"
    }
}
