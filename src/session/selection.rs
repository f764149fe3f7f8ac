//! Numbered choice prompt.
//!
//! The user answers with a number from the listed choices or with `cancel`.
//! The outcome arrives on a oneshot receiver instead of a callback.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::debug;

use crate::session::{ChannelUserKey, Dispatch, MessageEvent, SessionHandler, DEFAULT_MAX_LIVE};

/// How a selection prompt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// `index` is zero-based into the choice list.
    Chosen { index: usize, value: String },
    Cancelled,
    /// The prompt was reaped, replaced or removed before an answer arrived.
    Expired,
}

type InvalidHook = Box<dyn FnMut(i64, usize) + Send>;

pub struct SelectionHandler {
    key: ChannelUserKey,
    choices: Vec<String>,
    outcome: Option<oneshot::Sender<SelectionOutcome>>,
    on_invalid: Option<InvalidHook>,
    max_live: Duration,
}

impl SelectionHandler {
    pub fn new(
        channel_id: u64,
        user_id: u64,
        choices: Vec<String>,
    ) -> (Self, oneshot::Receiver<SelectionOutcome>) {
        let (tx, rx) = oneshot::channel();
        let handler = Self {
            key: ChannelUserKey::new(channel_id, user_id),
            choices,
            outcome: Some(tx),
            on_invalid: None,
            max_live: DEFAULT_MAX_LIVE,
        };
        (handler, rx)
    }

    /// Called with the rejected number and the choice count when the user
    /// answers out of range. The prompt keeps waiting either way.
    pub fn on_invalid(mut self, hook: impl FnMut(i64, usize) + Send + 'static) -> Self {
        self.on_invalid = Some(Box::new(hook));
        self
    }

    pub fn with_max_live(mut self, max_live: Duration) -> Self {
        self.max_live = max_live;
        self
    }

    pub fn choices(&self) -> &[String] {
        &self.choices
    }

    /// The numbered choice list, one `n. `choice`` line per entry.
    pub fn prompt(&self) -> String {
        self.choices
            .iter()
            .enumerate()
            .map(|(i, choice)| format!("{}. `{}`", i + 1, choice))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn finish(&mut self, outcome: SelectionOutcome) {
        if let Some(tx) = self.outcome.take() {
            if tx.send(outcome).is_err() {
                debug!(key = ?self.key, "Selection outcome dropped, nobody is waiting");
            }
        }
    }
}

#[async_trait]
impl SessionHandler<MessageEvent> for SelectionHandler {
    fn key(&self) -> ChannelUserKey {
        self.key
    }

    async fn handle(&mut self, event: &MessageEvent) -> anyhow::Result<Dispatch> {
        let answer = event.content.trim();
        if answer.eq_ignore_ascii_case("cancel") {
            self.finish(SelectionOutcome::Cancelled);
            return Ok(Dispatch::Done);
        }

        let Ok(number) = answer.parse::<i64>() else {
            return Ok(Dispatch::Continue);
        };

        let count = self.choices.len();
        match usize::try_from(number) {
            Ok(n) if (1..=count).contains(&n) => {
                let value = self.choices[n - 1].clone();
                self.finish(SelectionOutcome::Chosen { index: n - 1, value });
                Ok(Dispatch::Done)
            }
            _ => {
                if let Some(hook) = self.on_invalid.as_mut() {
                    hook(number, count);
                }
                Ok(Dispatch::Continue)
            }
        }
    }

    async fn on_destroy(&mut self) {
        self.finish(SelectionOutcome::Expired);
    }

    fn max_live(&self) -> Duration {
        self.max_live
    }
}
