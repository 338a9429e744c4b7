//! # buzz-core
//!
//! Subscription registry and keyword matching for the Buzz chat alert bot.
//!
//! This crate provides the routing core:
//!
//! - **Filter** - Case-insensitive keyword matching
//! - **Channel** - Per-channel subscription lists
//! - **Registry** - Channel membership and message dispatch
//! - **Upstream** / **NotificationSink** - Seams to the chat transport and
//!   the notifier
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  message  ┌─────────────┐  matches  ┌──────────────────┐
//! │  Transport  │──────────▶│  Registry   │──────────▶│ NotificationSink │
//! └─────────────┘           └─────────────┘           └──────────────────┘
//!        ▲                         │
//!        └──────── join / part ────┘
//! ```

pub mod channel;
pub mod filter;
pub mod message;
pub mod registry;
pub mod sink;
pub mod upstream;

pub use channel::{normalize_channel_name, validate_channel_name, Channel, ChannelId, Subscription};
pub use filter::{matches, parse_filters};
pub use message::ChatMessage;
pub use registry::{DispatchOutcome, Registry, RegistryStats};
pub use sink::{NotificationSink, SinkError};
pub use upstream::Upstream;
