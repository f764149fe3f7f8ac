//! Button-driven paged message.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::paging::{PageAction, PageState, Transition};
use crate::session::{ButtonClickEvent, ButtonRegistry, Dispatch, SessionHandler, DEFAULT_MAX_LIVE};

/// Where rendered pages go, typically a message edit on the chat gateway.
pub trait PageSink<A>: Send + Sync {
    /// Replaces the displayed page with `artifact`.
    fn replace(&self, artifact: A);

    /// Strips the navigation controls once the view stops listening.
    fn remove_controls(&self);
}

type Render<A> = Arc<dyn Fn(usize) -> A + Send + Sync>;
type MaxPage = Arc<dyn Fn() -> usize + Send + Sync>;

// == Paged View ==
/// A paged message bound to one message id.
///
/// Clones share the page state, so the clone handed to a [`ButtonRegistry`]
/// and the one kept for programmatic jumps always agree.
pub struct PagedView<A> {
    message_id: u64,
    state: Arc<Mutex<PageState>>,
    max_page: MaxPage,
    render: Render<A>,
    sink: Arc<dyn PageSink<A>>,
    max_live: Duration,
}

impl<A> Clone for PagedView<A> {
    fn clone(&self) -> Self {
        Self {
            message_id: self.message_id,
            state: Arc::clone(&self.state),
            max_page: Arc::clone(&self.max_page),
            render: Arc::clone(&self.render),
            sink: Arc::clone(&self.sink),
            max_live: self.max_live,
        }
    }
}

impl<A: Send + 'static> PagedView<A> {
    pub fn new<F>(message_id: u64, max_page: usize, render: F, sink: Arc<dyn PageSink<A>>) -> Self
    where
        F: Fn(usize) -> A + Send + Sync + 'static,
    {
        Self::with_page_count(message_id, move || max_page, render, sink)
    }

    /// Like [`PagedView::new`], but asks `max_page` for the last page before
    /// every render, so the view follows data that grows or shrinks while
    /// it is open.
    pub fn with_page_count<M, F>(
        message_id: u64,
        max_page: M,
        render: F,
        sink: Arc<dyn PageSink<A>>,
    ) -> Self
    where
        M: Fn() -> usize + Send + Sync + 'static,
        F: Fn(usize) -> A + Send + Sync + 'static,
    {
        let max_page: MaxPage = Arc::new(max_page);
        Self {
            message_id,
            state: Arc::new(Mutex::new(PageState::new(max_page()))),
            max_page,
            render: Arc::new(render),
            sink,
            max_live: DEFAULT_MAX_LIVE,
        }
    }

    pub fn with_max_live(mut self, max_live: Duration) -> Self {
        self.max_live = max_live;
        self
    }

    pub fn message_id(&self) -> u64 {
        self.message_id
    }

    /// Shows the current page and starts listening for clicks.
    pub async fn open(&self, buttons: &ButtonRegistry) {
        {
            let state = self.refreshed_state().await;
            self.sink.replace((self.render)(state.current_page()));
        }
        buttons.register(self.clone()).await;
    }

    pub async fn current_page(&self) -> usize {
        self.state.lock().await.current_page()
    }

    /// Jumps to `page` (wrapped into range) and re-renders.
    pub async fn set_page(&self, page: i64) -> usize {
        let mut state = self.refreshed_state().await;
        let page = state.set_page(page);
        self.sink.replace((self.render)(page));
        page
    }

    /// Applies `action`, re-rendering if the page changed or was refreshed.
    pub async fn apply(&self, action: PageAction) -> Transition {
        let mut state = self.refreshed_state().await;
        let transition = state.apply(action);
        if let Transition::Render(page) = transition {
            self.sink.replace((self.render)(page));
        }
        transition
    }

    async fn refreshed_state(&self) -> MutexGuard<'_, PageState> {
        let mut state = self.state.lock().await;
        state.set_max_page((self.max_page)());
        state
    }
}

#[async_trait]
impl<A: Send + 'static> SessionHandler<ButtonClickEvent> for PagedView<A> {
    fn key(&self) -> u64 {
        self.message_id
    }

    async fn handle(&mut self, event: &ButtonClickEvent) -> anyhow::Result<Dispatch> {
        let Some(button_id) = event.button_id.as_deref() else {
            return Ok(Dispatch::Continue);
        };

        match self.apply(PageAction::from_button_id(button_id)).await {
            Transition::Close => Ok(Dispatch::Done),
            Transition::Ignore => {
                debug!(message_id = self.message_id, button_id, "Ignoring unknown page control");
                Ok(Dispatch::Continue)
            }
            Transition::Render(_) => Ok(Dispatch::Continue),
        }
    }

    async fn on_destroy(&mut self) {
        self.sink.remove_controls();
    }

    fn max_live(&self) -> Duration {
        self.max_live
    }
}
