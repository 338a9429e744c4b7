//! Transport abstraction traits for Buzz.
//!
//! A [`Connector`] opens [`Connection`]s to the chat server. The chat client
//! only talks to these traits, so tests can drive it with in-memory
//! connections.

use async_trait::async_trait;
use buzz_core::ChatMessage;
use buzz_protocol::IrcMessage;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed by the server.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Connecting timed out.
    #[error("Connection timed out")]
    Timeout,

    /// The server rejected our credentials.
    #[error("Login failed: {0}")]
    LoginFailed(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] buzz_protocol::ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Lifecycle and data events emitted by the chat client.
#[derive(Debug)]
pub enum TransportEvent {
    /// Logged in; tracked channels are being joined.
    Ready,
    /// A chat message in a joined channel.
    Message(ChatMessage),
    /// The connection ended. The client reconnects on its own.
    Closed(Option<TransportError>),
}

/// Opens connections to the chat server.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new connection.
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError>;

    /// Get the connector name (e.g., "tcp").
    fn name(&self) -> &'static str;
}

/// An open line-based connection to the chat server.
#[async_trait]
pub trait Connection: Send {
    /// Receive the next message.
    ///
    /// Returns `None` if the server closed the connection cleanly. Must be
    /// cancel safe: dropping the future loses no buffered data.
    async fn recv(&mut self) -> Result<Option<IrcMessage>, TransportError>;

    /// Send a message.
    async fn send(&mut self, message: &IrcMessage) -> Result<(), TransportError>;

    /// Close the connection.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Get the remote address of the connection, if available.
    fn remote_addr(&self) -> Option<String> {
        None
    }

    /// Check if the connection is still open.
    fn is_open(&self) -> bool;
}
