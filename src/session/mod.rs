//! Session Registry Module
//!
//! Routes incoming chat events to the handler waiting on them. A handler is
//! registered under an identity key, receives every matching event until it
//! reports completion, and is torn down exactly once: on completion, on
//! replacement, on explicit removal, or when it sits idle past its lifetime.

mod events;
mod handler;
mod registry;
mod response;
mod selection;

pub use events::{ButtonClickEvent, ChannelUserKey, MessageEvent, SessionEvent};
pub use handler::{Dispatch, SessionHandler, DEFAULT_MAX_LIVE};
pub use registry::{DispatchOutcome, SessionRegistry};
pub use response::{ButtonHandler, ButtonRegistry, ResponseHandler, ResponseRegistry};
pub use selection::{SelectionHandler, SelectionOutcome};
