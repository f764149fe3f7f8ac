//! Keyed handler registry with exactly-once teardown.
//!
//! Lookup, insertion and removal happen under the registry lock; running a
//! handler happens under that handler's own lock only, so a slow handler
//! delays events for its own key and nothing else. Each slot carries a
//! `destroyed` flag, and whoever flips it runs `on_destroy`.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::session::{Dispatch, SessionEvent, SessionHandler};
use crate::tasks::{panic_message, PeriodicTask};

/// Result of routing one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing is registered under the event's key.
    NoHandler,
    /// A handler is registered but declined the event.
    Rejected,
    /// The handler ran and stays registered.
    Continued,
    /// The handler ran, signalled completion and was torn down.
    Completed,
    /// The handler returned an error or panicked.
    Failed,
}

struct Slot<E: SessionEvent> {
    handler: Box<dyn SessionHandler<E>>,
    updated_at: Instant,
    destroyed: bool,
}

type SharedSlot<E> = Arc<Mutex<Slot<E>>>;

struct RegistryInner<E: SessionEvent> {
    name: String,
    slots: Mutex<HashMap<E::Key, SharedSlot<E>>>,
}

// == Session Registry ==
/// At most one handler per key. Cheap to clone; clones share the handlers.
pub struct SessionRegistry<E: SessionEvent> {
    inner: Arc<RegistryInner<E>>,
}

impl<E: SessionEvent> Clone for SessionRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: SessionEvent + 'static> SessionRegistry<E> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                name: name.into(),
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    // == Register ==
    /// Registers `handler` under its key, tearing down any handler it replaces.
    pub async fn register<H>(&self, handler: H)
    where
        H: SessionHandler<E> + 'static,
    {
        self.register_boxed(Box::new(handler)).await;
    }

    pub async fn register_boxed(&self, handler: Box<dyn SessionHandler<E>>) {
        let key = handler.key();
        let slot = Arc::new(Mutex::new(Slot {
            handler,
            updated_at: Instant::now(),
            destroyed: false,
        }));

        let replaced = self.inner.slots.lock().await.insert(key.clone(), slot);
        debug!(registry = %self.inner.name, ?key, "Handler registered");

        if let Some(previous) = replaced {
            debug!(registry = %self.inner.name, ?key, "Replacing existing handler");
            self.retire(previous).await;
        }
    }

    // == Dispatch ==
    /// Routes `event` to the handler registered under its key.
    ///
    /// Handler errors are logged and the handler stays registered. A panic is
    /// logged and the handler is evicted.
    pub async fn dispatch(&self, event: &E) -> DispatchOutcome {
        let key = event.session_key();
        let Some((slot, mut guard)) = self.lock_current(&key).await else {
            return DispatchOutcome::NoHandler;
        };
        if !guard.handler.accepts(event) {
            return DispatchOutcome::Rejected;
        }
        guard.updated_at = Instant::now();

        let result = AssertUnwindSafe(guard.handler.handle(event))
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(Dispatch::Continue)) => DispatchOutcome::Continued,
            Ok(Ok(Dispatch::Done)) => {
                self.detach(&key, &slot).await;
                self.teardown(&key, &mut guard).await;
                DispatchOutcome::Completed
            }
            Ok(Err(e)) => {
                warn!(registry = %self.inner.name, ?key, error = %e, "Handler failed");
                DispatchOutcome::Failed
            }
            Err(panic) => {
                error!(
                    registry = %self.inner.name,
                    ?key,
                    panic = panic_message(panic.as_ref()),
                    "Handler panicked, evicting it"
                );
                self.detach(&key, &slot).await;
                self.teardown(&key, &mut guard).await;
                DispatchOutcome::Failed
            }
        }
    }

    // == Remove ==
    /// Tears down the handler under `key`, if any.
    pub async fn remove(&self, key: &E::Key) -> bool {
        let removed = self.inner.slots.lock().await.remove(key);
        match removed {
            Some(slot) => {
                self.retire(slot).await;
                true
            }
            None => false,
        }
    }

    /// Tears down every handler.
    pub async fn clear(&self) -> usize {
        let drained: Vec<SharedSlot<E>> = {
            let mut slots = self.inner.slots.lock().await;
            slots.drain().map(|(_, slot)| slot).collect()
        };
        let count = drained.len();
        for slot in drained {
            self.retire(slot).await;
        }
        count
    }

    // == Reap Idle ==
    /// Tears down every handler idle for longer than its `max_live`.
    ///
    /// Handlers busy with an event are skipped; they are by definition not idle.
    pub async fn reap_idle(&self) -> usize {
        let expired: Vec<(E::Key, OwnedMutexGuard<Slot<E>>)> = {
            let mut slots = self.inner.slots.lock().await;
            let now = Instant::now();

            let mut expired = Vec::new();
            for (key, slot) in slots.iter() {
                let Ok(guard) = Arc::clone(slot).try_lock_owned() else {
                    continue;
                };
                if now.saturating_duration_since(guard.updated_at) > guard.handler.max_live() {
                    expired.push((key.clone(), guard));
                }
            }
            for (key, _) in &expired {
                slots.remove(key);
            }
            expired
        };

        let count = expired.len();
        for (key, mut guard) in expired {
            self.teardown(&key, &mut guard).await;
        }
        if count > 0 {
            info!(registry = %self.inner.name, reaped = count, "Reaped idle handlers");
        }
        count
    }

    /// The periodic job that reaps idle handlers.
    pub fn reap_task(&self) -> Arc<dyn PeriodicTask> {
        Arc::new(RegistryReapTask {
            registry: self.clone(),
        })
    }

    pub async fn len(&self) -> usize {
        self.inner.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.slots.lock().await.is_empty()
    }

    pub async fn contains(&self, key: &E::Key) -> bool {
        self.inner.slots.lock().await.contains_key(key)
    }

    /// Locks the slot registered under `key`.
    ///
    /// If the slot was replaced or removed while we waited for its lock, the
    /// key is looked up once more so the event reaches the successor.
    async fn lock_current(&self, key: &E::Key) -> Option<(SharedSlot<E>, OwnedMutexGuard<Slot<E>>)> {
        for _ in 0..2 {
            let slot = Arc::clone(self.inner.slots.lock().await.get(key)?);
            let guard = Arc::clone(&slot).lock_owned().await;
            if !guard.destroyed && self.is_current(key, &slot).await {
                return Some((slot, guard));
            }
        }
        None
    }

    async fn is_current(&self, key: &E::Key, slot: &SharedSlot<E>) -> bool {
        self.inner
            .slots
            .lock()
            .await
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    /// Removes `slot` from the map unless it was already replaced.
    async fn detach(&self, key: &E::Key, slot: &SharedSlot<E>) {
        let mut slots = self.inner.slots.lock().await;
        if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(key);
        }
    }

    /// Tears down a slot that is no longer in the map.
    ///
    /// A slot busy with a dispatch (possibly the very dispatch that caused
    /// this call) is torn down in the background once that dispatch ends.
    async fn retire(&self, slot: SharedSlot<E>) {
        match Arc::clone(&slot).try_lock_owned() {
            Ok(mut guard) => {
                let key = guard.handler.key();
                self.teardown(&key, &mut guard).await;
            }
            Err(_) => {
                let registry = self.clone();
                tokio::spawn(async move {
                    let mut guard = slot.lock_owned().await;
                    let key = guard.handler.key();
                    registry.teardown(&key, &mut guard).await;
                });
            }
        }
    }

    async fn teardown(&self, key: &E::Key, slot: &mut Slot<E>) {
        if slot.destroyed {
            return;
        }
        slot.destroyed = true;

        let result = AssertUnwindSafe(slot.handler.on_destroy())
            .catch_unwind()
            .await;
        match result {
            Ok(()) => debug!(registry = %self.inner.name, ?key, "Handler destroyed"),
            Err(panic) => error!(
                registry = %self.inner.name,
                ?key,
                panic = panic_message(panic.as_ref()),
                "Handler panicked during teardown"
            ),
        }
    }
}

struct RegistryReapTask<E: SessionEvent> {
    registry: SessionRegistry<E>,
}

#[async_trait]
impl<E: SessionEvent + 'static> PeriodicTask for RegistryReapTask<E> {
    async fn run(&self) -> usize {
        self.registry.reap_idle().await
    }
}
