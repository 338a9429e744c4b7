//! Telegram command parsing.

use crate::telegram::BotCommand;
use buzz_core::{normalize_channel_name, parse_filters, validate_channel_name};

/// Reply to `/help`.
pub const HELP_TEXT: &str = "Commands available:\n/list\n/subscribe <channel> <filters>\n/unsubscribe <channel>\n\nFilters are comma separated and case insensitive.";

/// Reply to `/start`.
pub const START_TEXT: &str = "Welcome to TwitchBuzzBot!\n\nCommands available:\n/list\n/subscribe <channel> <filters>\n/unsubscribe <channel>\n\nFilters are comma separated and case insensitive.";

/// Commands published to the Telegram menu.
pub const MENU: [BotCommand; 4] = [
    BotCommand {
        command: "list",
        description: "List your subscriptions",
    },
    BotCommand {
        command: "subscribe",
        description: "Subscribe to a channel",
    },
    BotCommand {
        command: "unsubscribe",
        description: "Unsubscribe from a channel",
    },
    BotCommand {
        command: "help",
        description: "Show this help message",
    },
];

/// A parsed bot command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    List,
    /// `/subscribe <channel> <filters>`. Either part may be empty.
    Subscribe { channel: String, filters: Vec<String> },
    /// `/unsubscribe <channel>`. The channel may be empty.
    Unsubscribe { channel: String },
    Unknown(String),
}

/// Parse a message text into a command.
///
/// Returns `None` for text that is not a command. A `@botname` suffix on the
/// command word is ignored and channel names are normalized.
#[must_use]
pub fn parse(text: &str) -> Option<Command> {
    let text = text.trim_start();
    let rest = text.strip_prefix('/')?;

    let (word, args) = match rest.find(char::is_whitespace) {
        Some(pos) => (&rest[..pos], rest[pos..].trim_start()),
        None => (rest, ""),
    };
    let name = word.split('@').next().unwrap_or_default().to_lowercase();

    let (channel, remainder) = match args.find(char::is_whitespace) {
        Some(pos) => (&args[..pos], &args[pos..]),
        None => (args, ""),
    };

    Some(match name.as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "list" => Command::List,
        "subscribe" => Command::Subscribe {
            channel: normalize_channel_name(channel),
            filters: parse_filters(remainder),
        },
        "unsubscribe" => Command::Unsubscribe {
            channel: normalize_channel_name(channel),
        },
        _ => Command::Unknown(name),
    })
}

/// Check a normalized channel argument, returning the reply on failure.
pub(crate) fn check_channel(channel: &str, missing: &str) -> Result<(), String> {
    if channel.is_empty() {
        return Err(missing.to_string());
    }
    validate_channel_name(channel).map_err(|reason| format!("{reason}: {channel}"))
}
