//! # buzz-protocol
//!
//! IRCv3 line protocol used to talk to Twitch chat.
//!
//! ## Example
//!
//! ```rust
//! use buzz_protocol::{codec, IrcMessage};
//!
//! let line = codec::encode(&IrcMessage::join("forsen")).unwrap();
//! assert_eq!(&line[..], b"JOIN #forsen\r\n");
//!
//! let msg = codec::decode("@display-name=Viewer :viewer!viewer@host PRIVMSG #forsen :hello").unwrap();
//! assert_eq!(msg.display_name(), Some("Viewer"));
//! assert_eq!(msg.text(), Some("hello"));
//! ```

pub mod codec;
pub mod message;

pub use codec::{decode, encode, ProtocolError};
pub use message::{commands, IrcMessage};
