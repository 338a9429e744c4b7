//! Per-channel subscription lists.
//!
//! A [`Channel`] holds the subscriptions of one upstream channel, at most one
//! per subscriber key, in the order they were first registered.

use crate::filter;
use tracing::debug;

/// Maximum channel name length (Twitch login names).
pub const MAX_CHANNEL_NAME_LENGTH: usize = 25;

/// A channel identifier.
pub type ChannelId = String;

/// Validate a user-supplied channel name.
///
/// The registry treats names as opaque; this check belongs to the front end.
///
/// # Errors
///
/// Returns an error message if the channel name is invalid.
pub fn validate_channel_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Channel name cannot be empty");
    }
    if name.len() > MAX_CHANNEL_NAME_LENGTH {
        return Err("Channel name too long");
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err("Channel name contains invalid characters");
    }
    Ok(())
}

/// Normalize a user-supplied channel reference.
///
/// Accepts `name`, `#name`, `twitch.tv/name` and full URLs, and lowercases
/// the result to match how the chat server reports channel names.
#[must_use]
pub fn normalize_channel_name(raw: &str) -> ChannelId {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let without_www = without_scheme
        .strip_prefix("www.")
        .unwrap_or(without_scheme);
    let name = without_www
        .strip_prefix("twitch.tv/")
        .unwrap_or(without_www)
        .trim_start_matches('#')
        .trim_end_matches('/');
    name.to_lowercase()
}

/// A registered interest in one channel.
#[derive(Debug, Clone)]
pub struct Subscription<S> {
    /// Channel the subscription listens to.
    pub channel: ChannelId,
    /// Subscriber key.
    pub key: String,
    /// Lowercase keyword filters.
    pub filters: Vec<String>,
    /// Where matching messages go.
    pub sink: S,
}

impl<S> Subscription<S> {
    /// Create a new subscription.
    #[must_use]
    pub fn new(
        channel: impl Into<ChannelId>,
        key: impl Into<String>,
        filters: Vec<String>,
        sink: S,
    ) -> Self {
        Self {
            channel: channel.into(),
            key: key.into(),
            filters,
            sink,
        }
    }
}

/// The subscriptions of one channel.
#[derive(Debug)]
pub struct Channel<S> {
    /// Channel name.
    name: ChannelId,
    /// Subscriptions in registration order, unique by key.
    subscriptions: Vec<Subscription<S>>,
}

impl<S: Clone> Channel<S> {
    /// Create a new, empty channel.
    #[must_use]
    pub fn new(name: impl Into<ChannelId>) -> Self {
        Self {
            name: name.into(),
            subscriptions: Vec::new(),
        }
    }

    /// Get the channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the number of subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Check if a key is subscribed.
    #[must_use]
    pub fn is_subscribed(&self, key: &str) -> bool {
        self.subscriptions.iter().any(|s| s.key == key)
    }

    /// Add a subscription.
    ///
    /// An existing subscription with the same key is replaced in place and
    /// keeps its dispatch position. Returns `true` if one was replaced.
    pub fn subscribe(&mut self, subscription: Subscription<S>) -> bool {
        if let Some(existing) = self
            .subscriptions
            .iter_mut()
            .find(|s| s.key == subscription.key)
        {
            debug!(channel = %self.name, key = %subscription.key, "Subscription replaced");
            *existing = subscription;
            return true;
        }
        debug!(channel = %self.name, key = %subscription.key, "Subscription added");
        self.subscriptions.push(subscription);
        false
    }

    /// Remove the subscription of `key`.
    ///
    /// Returns `true` if the key was subscribed.
    pub fn unsubscribe(&mut self, key: &str) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.key != key);
        let removed = self.subscriptions.len() != before;
        if removed {
            debug!(channel = %self.name, key = %key, "Subscription removed");
        }
        removed
    }

    /// Collect the sinks whose filters match `text`, in registration order.
    #[must_use]
    pub fn matching(&self, text: &str) -> Vec<(String, S)> {
        let lowered = text.to_lowercase();
        self.subscriptions
            .iter()
            .filter(|s| filter::matches_lowercase(&lowered, &s.filters))
            .map(|s| (s.key.clone(), s.sink.clone()))
            .collect()
    }

    /// Get all subscriber keys in registration order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.subscriptions.iter().map(|s| s.key.clone()).collect()
    }

    /// Check if the channel has no subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(key: &str, filters: &[&str]) -> Subscription<u32> {
        Subscription::new(
            "test",
            key,
            filters.iter().map(|f| f.to_string()).collect(),
            0,
        )
    }

    #[test]
    fn test_channel_creation() {
        let channel: Channel<u32> = Channel::new("test");
        assert_eq!(channel.name(), "test");
        assert_eq!(channel.subscriber_count(), 0);
        assert!(channel.is_empty());
    }

    #[test]
    fn test_channel_subscribe_unsubscribe() {
        let mut channel = Channel::new("test");

        assert!(!channel.subscribe(sub("key-1", &["a"])));
        assert_eq!(channel.subscriber_count(), 1);
        assert!(channel.is_subscribed("key-1"));

        channel.subscribe(sub("key-2", &["b"]));
        assert_eq!(channel.subscriber_count(), 2);

        assert!(channel.unsubscribe("key-1"));
        assert_eq!(channel.subscriber_count(), 1);
        assert!(!channel.is_subscribed("key-1"));

        // Unsubscribing a missing key
        assert!(!channel.unsubscribe("key-1"));
    }

    #[test]
    fn test_resubscribe_replaces_in_place() {
        let mut channel = Channel::new("test");
        channel.subscribe(sub("key-1", &["old"]));
        channel.subscribe(sub("key-2", &["x"]));

        assert!(channel.subscribe(sub("key-1", &["new"])));
        assert_eq!(channel.subscriber_count(), 2);
        assert_eq!(channel.keys(), vec!["key-1", "key-2"]);
        assert!(channel.matching("old news").is_empty());
        assert_eq!(channel.matching("new news").len(), 1);
    }

    #[test]
    fn test_matching_preserves_order() {
        let mut channel = Channel::new("test");
        channel.subscribe(sub("b", &["foo"]));
        channel.subscribe(sub("a", &["fighters"]));
        channel.subscribe(sub("c", &["bar"]));

        let keys: Vec<_> = channel
            .matching("Foo Fighters")
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn test_empty_filters_match_nothing() {
        let mut channel = Channel::new("test");
        channel.subscribe(sub("key", &[]));
        assert!(channel.matching("anything").is_empty());
    }

    #[test]
    fn test_channel_name_validation() {
        assert!(validate_channel_name("forsen").is_ok());
        assert!(validate_channel_name("some_user99").is_ok());
        assert!(validate_channel_name("").is_err());
        assert!(validate_channel_name("with space").is_err());
        assert!(validate_channel_name("#chan").is_err());

        let long_name = "a".repeat(MAX_CHANNEL_NAME_LENGTH + 1);
        assert!(validate_channel_name(&long_name).is_err());
    }

    #[test]
    fn test_normalize_channel_name() {
        assert_eq!(normalize_channel_name("Forsen"), "forsen");
        assert_eq!(normalize_channel_name("#forsen"), "forsen");
        assert_eq!(normalize_channel_name("twitch.tv/XQC"), "xqc");
        assert_eq!(normalize_channel_name("https://www.twitch.tv/xqc/"), "xqc");
        assert_eq!(normalize_channel_name("  chan  "), "chan");
    }
}
