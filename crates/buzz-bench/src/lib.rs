//! Shared fixtures for the Buzz benchmarks.

use buzz_core::message::MessageId;
use buzz_core::{ChatMessage, NotificationSink, SinkError, Upstream};
use tokio::sync::mpsc;

/// Upstream that ignores membership changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullUpstream;

impl Upstream for NullUpstream {
    fn join(&self, _channel: &str) {}
    fn part(&self, _channel: &str) {}
}

/// Sink that discards deliveries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn deliver(&self, _message: &ChatMessage) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Sink that forwards message ids over a channel.
#[derive(Debug, Clone)]
pub struct ChannelSink(pub mpsc::UnboundedSender<MessageId>);

impl NotificationSink for ChannelSink {
    fn deliver(&self, message: &ChatMessage) -> Result<(), SinkError> {
        self.0
            .send(message.id)
            .map_err(|_| SinkError::Closed)
    }
}

/// Build `count` filters that never occur in benchmark text.
#[must_use]
pub fn filters(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("keyword{i}")).collect()
}
