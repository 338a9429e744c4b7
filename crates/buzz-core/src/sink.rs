//! Delivery of matching messages.

use crate::message::ChatMessage;
use thiserror::Error;

/// Errors a sink may report for a single delivery.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The downstream side is gone.
    #[error("Sink closed")]
    Closed,

    /// The sink refused the message.
    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

/// Receives the messages that matched a subscription.
///
/// Deliveries happen on the dispatching thread, so implementations should
/// hand the message off (e.g. to a queue) rather than do slow work inline.
pub trait NotificationSink: Clone + Send + Sync {
    /// Deliver one matching message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message could not be handed off. The registry
    /// logs it and carries on with the remaining subscriptions.
    fn deliver(&self, message: &ChatMessage) -> Result<(), SinkError>;
}
