//! Closure-backed handlers for the two standard registries.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::session::{
    ButtonClickEvent, ChannelUserKey, Dispatch, MessageEvent, SessionHandler, SessionRegistry,
    DEFAULT_MAX_LIVE,
};

/// Handlers awaiting a typed reply from one user in one channel.
pub type ResponseRegistry = SessionRegistry<MessageEvent>;

/// Handlers attached to the interactive controls of one message.
pub type ButtonRegistry = SessionRegistry<ButtonClickEvent>;

type Teardown = Box<dyn FnOnce() + Send>;

// == Response Handler ==
/// Runs a closure for each message the user posts in the channel.
pub struct ResponseHandler {
    key: ChannelUserKey,
    on_message: Box<dyn FnMut(&MessageEvent) -> anyhow::Result<Dispatch> + Send>,
    teardown: Option<Teardown>,
    max_live: Duration,
}

impl ResponseHandler {
    pub fn new<F>(channel_id: u64, user_id: u64, on_message: F) -> Self
    where
        F: FnMut(&MessageEvent) -> anyhow::Result<Dispatch> + Send + 'static,
    {
        Self {
            key: ChannelUserKey::new(channel_id, user_id),
            on_message: Box::new(on_message),
            teardown: None,
            max_live: DEFAULT_MAX_LIVE,
        }
    }

    /// A handler that completes on the first message and hands its text to
    /// the returned receiver. The receiver errors if the handler is reaped
    /// or replaced first.
    pub fn next_message(channel_id: u64, user_id: u64) -> (Self, oneshot::Receiver<String>) {
        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        let handler = Self::new(channel_id, user_id, move |event| {
            if let Some(tx) = tx.take() {
                // The caller may have stopped waiting.
                let _ = tx.send(event.content.clone());
            }
            Ok(Dispatch::Done)
        });
        (handler, rx)
    }

    /// Runs `teardown` when the handler leaves the registry.
    pub fn with_teardown(mut self, teardown: impl FnOnce() + Send + 'static) -> Self {
        self.teardown = Some(Box::new(teardown));
        self
    }

    pub fn with_max_live(mut self, max_live: Duration) -> Self {
        self.max_live = max_live;
        self
    }
}

#[async_trait]
impl SessionHandler<MessageEvent> for ResponseHandler {
    fn key(&self) -> ChannelUserKey {
        self.key
    }

    async fn handle(&mut self, event: &MessageEvent) -> anyhow::Result<Dispatch> {
        (self.on_message)(event)
    }

    async fn on_destroy(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }

    fn max_live(&self) -> Duration {
        self.max_live
    }
}

// == Button Handler ==
/// Runs a closure for each click on one message's controls.
pub struct ButtonHandler {
    message_id: u64,
    owner: Option<u64>,
    on_click: Box<dyn FnMut(&ButtonClickEvent) -> anyhow::Result<Dispatch> + Send>,
    teardown: Option<Teardown>,
    max_live: Duration,
}

impl ButtonHandler {
    pub fn new<F>(message_id: u64, on_click: F) -> Self
    where
        F: FnMut(&ButtonClickEvent) -> anyhow::Result<Dispatch> + Send + 'static,
    {
        Self {
            message_id,
            owner: None,
            on_click: Box::new(on_click),
            teardown: None,
            max_live: DEFAULT_MAX_LIVE,
        }
    }

    /// Ignores clicks from anyone but `user_id`.
    pub fn restrict_to(mut self, user_id: u64) -> Self {
        self.owner = Some(user_id);
        self
    }

    pub fn with_teardown(mut self, teardown: impl FnOnce() + Send + 'static) -> Self {
        self.teardown = Some(Box::new(teardown));
        self
    }

    pub fn with_max_live(mut self, max_live: Duration) -> Self {
        self.max_live = max_live;
        self
    }
}

#[async_trait]
impl SessionHandler<ButtonClickEvent> for ButtonHandler {
    fn key(&self) -> u64 {
        self.message_id
    }

    fn accepts(&self, event: &ButtonClickEvent) -> bool {
        self.owner.map_or(true, |owner| owner == event.user_id)
    }

    async fn handle(&mut self, event: &ButtonClickEvent) -> anyhow::Result<Dispatch> {
        (self.on_click)(event)
    }

    async fn on_destroy(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }

    fn max_live(&self) -> Duration {
        self.max_live
    }
}
