//! # buzz-transport
//!
//! Upstream chat transport for Buzz.
//!
//! The [`ChatClient`] keeps one connection to Twitch chat alive, rejoins
//! tracked channels after reconnecting and emits [`TransportEvent`]s. Its
//! [`ChatHandle`] implements `buzz_core::Upstream`, so the registry can drive
//! joins and parts directly.
//!
//! ```rust,ignore
//! use buzz_transport::{ChatClient, ClientConfig, TcpConnector, TransportEvent};
//!
//! let (handle, mut events, _task) =
//!     ChatClient::spawn(TcpConnector::default(), ClientConfig::default());
//! while let Some(event) = events.recv().await {
//!     if let TransportEvent::Message(msg) = event {
//!         registry.dispatch(&msg);
//!     }
//! }
//! ```

pub mod client;
pub mod tcp;
pub mod traits;

pub use client::{ChatClient, ChatHandle, ClientConfig};
pub use tcp::{TcpConfig, TcpConnector};
pub use traits::{Connection, Connector, TransportError, TransportEvent};
