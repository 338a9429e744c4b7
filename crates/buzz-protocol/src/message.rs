//! IRC message type.
//!
//! Twitch chat speaks IRCv3: every line is an optional tag block, an
//! optional prefix, a command and its parameters.

use std::collections::BTreeMap;
use std::fmt;

/// Command names used by the chat client.
pub mod commands {
    pub const CAP: &str = "CAP";
    pub const JOIN: &str = "JOIN";
    pub const NICK: &str = "NICK";
    pub const NOTICE: &str = "NOTICE";
    pub const PART: &str = "PART";
    pub const PASS: &str = "PASS";
    pub const PING: &str = "PING";
    pub const PONG: &str = "PONG";
    pub const PRIVMSG: &str = "PRIVMSG";
    pub const RECONNECT: &str = "RECONNECT";
    /// Registration complete.
    pub const RPL_WELCOME: &str = "001";
}

/// Tag carrying the sender's display name on Twitch.
pub const DISPLAY_NAME_TAG: &str = "display-name";

/// A single IRC protocol line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IrcMessage {
    /// IRCv3 message tags (unescaped values).
    pub tags: BTreeMap<String, String>,
    /// Source prefix without the leading `:`.
    pub prefix: Option<String>,
    /// Command name or numeric reply.
    pub command: String,
    /// Parameters; the last one may contain spaces.
    pub params: Vec<String>,
}

impl IrcMessage {
    /// Create a message with a command and parameters.
    #[must_use]
    pub fn new<I, P>(command: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            tags: BTreeMap::new(),
            prefix: None,
            command: command.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// Attach a tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Attach a prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Create a `PASS` message.
    #[must_use]
    pub fn pass(password: impl Into<String>) -> Self {
        Self::new(commands::PASS, [password.into()])
    }

    /// Create a `NICK` message.
    #[must_use]
    pub fn nick(nick: impl Into<String>) -> Self {
        Self::new(commands::NICK, [nick.into()])
    }

    /// Request capabilities.
    #[must_use]
    pub fn cap_req(capabilities: &[&str]) -> Self {
        Self::new(commands::CAP, ["REQ".to_string(), capabilities.join(" ")])
    }

    /// Join a channel, given without the leading `#`.
    #[must_use]
    pub fn join(channel: &str) -> Self {
        Self::new(commands::JOIN, [format!("#{channel}")])
    }

    /// Leave a channel, given without the leading `#`.
    #[must_use]
    pub fn part(channel: &str) -> Self {
        Self::new(commands::PART, [format!("#{channel}")])
    }

    /// Answer a `PING`, echoing its argument.
    #[must_use]
    pub fn pong(ping: &IrcMessage) -> Self {
        Self::new(commands::PONG, ping.params.iter().cloned())
    }

    /// Check the command name.
    #[must_use]
    pub fn is(&self, command: &str) -> bool {
        self.command.eq_ignore_ascii_case(command)
    }

    /// Get a tag value.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Get the nickname part of the prefix (`nick!user@host`).
    #[must_use]
    pub fn nick_name(&self) -> Option<&str> {
        self.prefix
            .as_deref()
            .map(|p| p.split(['!', '@']).next().unwrap_or(p))
    }

    /// Get the sender's display name, falling back to the nickname.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.tag(DISPLAY_NAME_TAG)
            .filter(|name| !name.is_empty())
            .or_else(|| self.nick_name())
    }

    /// Get the target channel of a channel command, without the `#`.
    #[must_use]
    pub fn channel(&self) -> Option<&str> {
        self.params.first().and_then(|p| p.strip_prefix('#'))
    }

    /// Get the trailing parameter (message text for `PRIVMSG`).
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }
}

impl fmt::Display for IrcMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        for param in &self.params {
            write!(f, " {param}")?;
        }
        Ok(())
    }
}
