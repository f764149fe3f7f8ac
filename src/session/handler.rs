//! The handler contract.

use std::time::Duration;

use async_trait::async_trait;

use crate::session::SessionEvent;

/// Idle lifetime used when a handler does not override [`SessionHandler::max_live`].
pub const DEFAULT_MAX_LIVE: Duration = Duration::from_secs(600);

/// What a handler wants after processing an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Keep receiving events.
    Continue,
    /// Remove me and run my teardown.
    Done,
}

/// A stateful receiver of session events.
#[async_trait]
pub trait SessionHandler<E: SessionEvent>: Send {
    /// The key this handler is registered under.
    fn key(&self) -> E::Key;

    /// Filters events that match the key but are not meant for this handler,
    /// e.g. clicks from users other than the one who opened a prompt.
    fn accepts(&self, _event: &E) -> bool {
        true
    }

    async fn handle(&mut self, event: &E) -> anyhow::Result<Dispatch>;

    /// Teardown, run exactly once when the handler leaves the registry.
    async fn on_destroy(&mut self) {}

    /// Idle time after which the handler is reaped.
    fn max_live(&self) -> Duration {
        DEFAULT_MAX_LIVE
    }
}
