//! Paged View Module
//!
//! A multi-page message navigated with buttons. [`PageState`] is the pure,
//! cyclic page state machine; [`PagedView`] drives it from button clicks
//! and pushes rendered pages to a [`PageSink`].

mod state;
mod view;

pub use state::{PageAction, PageState, Transition};
pub use view::{PageSink, PagedView};
