//! Inbound events and the keys they are routed by.

use std::fmt::Debug;
use std::hash::Hash;

/// An event that can be routed to a registered handler.
pub trait SessionEvent: Send + Sync {
    type Key: Eq + Hash + Clone + Debug + Send + Sync + 'static;

    /// The identity a handler must be registered under to receive this event.
    fn session_key(&self) -> Self::Key;
}

/// Identifies one user in one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelUserKey {
    pub channel_id: u64,
    pub user_id: u64,
}

impl ChannelUserKey {
    pub fn new(channel_id: u64, user_id: u64) -> Self {
        Self {
            channel_id,
            user_id,
        }
    }
}

/// A text message posted in a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel_id: u64,
    pub user_id: u64,
    pub content: String,
}

impl MessageEvent {
    pub fn new(channel_id: u64, user_id: u64, content: impl Into<String>) -> Self {
        Self {
            channel_id,
            user_id,
            content: content.into(),
        }
    }
}

impl SessionEvent for MessageEvent {
    type Key = ChannelUserKey;

    fn session_key(&self) -> ChannelUserKey {
        ChannelUserKey::new(self.channel_id, self.user_id)
    }
}

/// A click on an interactive control attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonClickEvent {
    pub message_id: u64,
    pub channel_id: u64,
    pub user_id: u64,
    /// `None` when the gateway delivered an interaction without a component id.
    pub button_id: Option<String>,
}

impl ButtonClickEvent {
    pub fn new(message_id: u64, channel_id: u64, user_id: u64, button_id: impl Into<String>) -> Self {
        Self {
            message_id,
            channel_id,
            user_id,
            button_id: Some(button_id.into()),
        }
    }
}

impl SessionEvent for ButtonClickEvent {
    type Key = u64;

    fn session_key(&self) -> u64 {
        self.message_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_key_is_channel_and_user() {
        let a = MessageEvent::new(1, 2, "hi");
        let b = MessageEvent::new(1, 2, "something else");
        let c = MessageEvent::new(1, 3, "hi");

        assert_eq!(a.session_key(), b.session_key());
        assert_ne!(a.session_key(), c.session_key());
        assert_eq!(a.session_key(), ChannelUserKey::new(1, 2));
    }

    #[test]
    fn test_button_key_is_message_id() {
        let click = ButtonClickEvent::new(42, 1, 2, "refresh");
        assert_eq!(click.session_key(), 42);
        assert_eq!(click.button_id.as_deref(), Some("refresh"));
    }
}
