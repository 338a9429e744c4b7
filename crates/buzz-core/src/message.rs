//! Inbound chat messages.
//!
//! The transport turns every chat line of a joined channel into a
//! [`ChatMessage`] and hands it to the registry for dispatch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A unique message identifier.
pub type MessageId = u64;

/// Atomic counter for ensuring unique IDs even within the same nanosecond.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// Generate a unique message ID.
#[must_use]
pub fn generate_message_id() -> MessageId {
    let timestamp = now().as_nanos() as u64;
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    timestamp.wrapping_add(counter)
}

/// A chat line received on an upstream channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Unique message identifier.
    pub id: MessageId,
    /// Channel the message was sent in.
    pub channel: String,
    /// Display name of the sender.
    pub sender: String,
    /// Message text as sent.
    pub text: String,
    /// Receive time in milliseconds since the epoch.
    pub timestamp: u64,
}

impl ChatMessage {
    /// Create a new message.
    #[must_use]
    pub fn new(
        channel: impl Into<String>,
        sender: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_message_id(),
            channel: channel.into(),
            sender: sender.into(),
            text: text.into(),
            timestamp: now().as_millis() as u64,
        }
    }

    /// Get the text size in bytes.
    #[must_use]
    pub fn text_size(&self) -> usize {
        self.text.len()
    }

    /// Time elapsed since the message was received.
    #[must_use]
    pub fn age(&self) -> Duration {
        now().saturating_sub(Duration::from_millis(self.timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = ChatMessage::new("forsen", "Viewer", "hello chat");
        assert_eq!(msg.channel, "forsen");
        assert_eq!(msg.sender, "Viewer");
        assert_eq!(msg.text, "hello chat");
        assert_eq!(msg.text_size(), 10);
        assert!(msg.timestamp > 0);
    }

    #[test]
    fn test_unique_message_ids() {
        let id1 = generate_message_id();
        let id2 = generate_message_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_message_age() {
        let mut msg = ChatMessage::new("c", "s", "t");
        assert!(msg.age() < Duration::from_secs(5));

        msg.timestamp -= 3_000;
        assert!(msg.age() >= Duration::from_secs(3));

        msg.timestamp = u64::MAX;
        assert_eq!(msg.age(), Duration::ZERO);
    }
}
