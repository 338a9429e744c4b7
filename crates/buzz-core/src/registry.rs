//! Subscription registry.
//!
//! The registry maps channels to their subscriptions, joins a channel
//! upstream when it gains its first subscription, parts it when it loses its
//! last one, and dispatches inbound messages to every matching sink.
//!
//! Structural changes to a channel (create + join, remove + part) happen
//! while holding that channel's map entry, so they are atomic with respect
//! to dispatch and to other registrations on the same channel.

use crate::channel::{Channel, ChannelId, Subscription};
use crate::message::ChatMessage;
use crate::sink::NotificationSink;
use crate::upstream::Upstream;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, info, trace, warn};

/// Result of dispatching one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Subscriptions whose filters matched.
    pub matched: usize,
    /// Sinks that accepted the message.
    pub delivered: usize,
}

impl DispatchOutcome {
    /// Number of matching sinks that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.matched - self.delivered
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    /// Number of joined channels.
    pub channel_count: usize,
    /// Number of distinct subscriber keys.
    pub subscriber_count: usize,
    /// Total number of subscriptions.
    pub total_subscriptions: usize,
}

/// The channel → subscriptions routing table.
pub struct Registry<U, S> {
    /// Channels indexed by name. Present iff joined upstream.
    channels: DashMap<ChannelId, Channel<S>>,
    /// Upstream membership control.
    upstream: U,
}

impl<U: Upstream, S: NotificationSink> Registry<U, S> {
    /// Create an empty registry driving `upstream`.
    #[must_use]
    pub fn new(upstream: U) -> Self {
        Self {
            channels: DashMap::new(),
            upstream,
        }
    }

    /// Get the upstream this registry drives.
    #[must_use]
    pub fn upstream(&self) -> &U {
        &self.upstream
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let mut keys = HashSet::new();
        let mut total_subscriptions = 0;
        for entry in self.channels.iter() {
            total_subscriptions += entry.subscriber_count();
            keys.extend(entry.keys());
        }
        RegistryStats {
            channel_count: self.channels.len(),
            subscriber_count: keys.len(),
            total_subscriptions,
        }
    }

    /// Subscribe `key` to each of `channels` with the given filters.
    ///
    /// Filters are lowercased and blank entries dropped. If no filter
    /// remains, nothing is installed. Empty channel names are skipped. A
    /// channel without subscriptions is joined upstream before the new
    /// subscription becomes visible to dispatch. An existing subscription of
    /// `key` on a channel is replaced.
    ///
    /// Returns the number of channels a subscription was installed on.
    pub fn subscribe<I>(&self, channels: I, key: &str, filters: &[String], sink: S) -> usize
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let filters: Vec<String> = filters
            .iter()
            .map(|f| f.to_lowercase())
            .filter(|f| !f.is_empty())
            .collect();
        if filters.is_empty() {
            warn!(key = %key, "Ignoring subscription without filters");
            return 0;
        }

        let mut installed = 0;
        for channel in channels {
            let channel = channel.as_ref();
            if channel.is_empty() {
                warn!(key = %key, "Ignoring subscription to unnamed channel");
                continue;
            }

            let mut entry = self
                .channels
                .entry(channel.to_string())
                .or_insert_with(|| {
                    info!(channel = %channel, "Joining channel");
                    self.upstream.join(channel);
                    Channel::new(channel)
                });

            entry.subscribe(Subscription::new(
                channel,
                key,
                filters.clone(),
                sink.clone(),
            ));
            installed += 1;

            debug!(
                channel = %channel,
                key = %key,
                subscribers = entry.subscriber_count(),
                "Subscribed"
            );
        }
        installed
    }

    /// Remove the subscriptions of `key` on each of `channels`.
    ///
    /// Missing channels or keys are ignored. A channel left without
    /// subscriptions is parted upstream and dropped.
    ///
    /// Returns the number of subscriptions removed.
    pub fn unsubscribe<I>(&self, channels: I, key: &str) -> usize
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut removed = 0;
        for channel in channels {
            let channel = channel.as_ref();
            if !self.channels.contains_key(channel) {
                trace!(channel = %channel, key = %key, "Unsubscribe from unknown channel");
                continue;
            }

            if let Entry::Occupied(mut occupied) = self.channels.entry(channel.to_string()) {
                if occupied.get_mut().unsubscribe(key) {
                    removed += 1;
                    debug!(
                        channel = %channel,
                        key = %key,
                        subscribers = occupied.get().subscriber_count(),
                        "Unsubscribed"
                    );
                }
                if occupied.get().is_empty() {
                    // Part before releasing the entry so a racing subscribe
                    // cannot join ahead of it.
                    info!(channel = %channel, "Leaving channel");
                    self.upstream.part(channel);
                    occupied.remove();
                }
            }
        }
        removed
    }

    /// Route one inbound message to every matching subscription.
    ///
    /// Matching sinks are collected under the channel's read guard and
    /// invoked after it is released. A sink that errors or panics is logged
    /// and does not affect the others.
    pub fn dispatch(&self, message: &ChatMessage) -> DispatchOutcome {
        let targets = match self.channels.get(message.channel.as_str()) {
            Some(channel) => channel.matching(&message.text),
            None => {
                trace!(channel = %message.channel, "Message for channel without subscriptions");
                return DispatchOutcome::default();
            }
        };

        let mut outcome = DispatchOutcome {
            matched: targets.len(),
            delivered: 0,
        };
        for (key, sink) in targets {
            match panic::catch_unwind(AssertUnwindSafe(|| sink.deliver(message))) {
                Ok(Ok(())) => {
                    outcome.delivered += 1;
                    trace!(channel = %message.channel, key = %key, id = message.id, "Delivered");
                }
                Ok(Err(e)) => {
                    warn!(
                        channel = %message.channel,
                        key = %key,
                        id = message.id,
                        error = %e,
                        "Delivery failed"
                    );
                }
                Err(_) => {
                    error!(
                        channel = %message.channel,
                        key = %key,
                        id = message.id,
                        "Sink panicked during delivery"
                    );
                }
            }
        }
        outcome
    }

    /// Check if a channel is joined (has at least one subscription).
    #[must_use]
    pub fn is_joined(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    /// Get the subscriber count for a channel.
    #[must_use]
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|c| c.subscriber_count())
            .unwrap_or(0)
    }

    /// Get the subscriber keys of a channel in dispatch order.
    #[must_use]
    pub fn subscriber_keys(&self, channel: &str) -> Vec<String> {
        self.channels
            .get(channel)
            .map(|c| c.keys())
            .unwrap_or_default()
    }

    /// Get all joined channel names.
    #[must_use]
    pub fn channel_names(&self) -> Vec<ChannelId> {
        self.channels.iter().map(|e| e.key().clone()).collect()
    }

    /// Get the channels `key` is subscribed to.
    #[must_use]
    pub fn subscribed_channels(&self, key: &str) -> Vec<ChannelId> {
        self.channels
            .iter()
            .filter(|e| e.is_subscribed(key))
            .map(|e| e.key().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkError;
    use parking_lot::Mutex;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Op {
        Join(String),
        Part(String),
    }

    /// Upstream that records every join/part and tracks membership.
    #[derive(Default)]
    struct FakeUpstream {
        ops: Mutex<Vec<Op>>,
        joined: Mutex<BTreeSet<String>>,
        part_delay: Duration,
    }

    impl Upstream for FakeUpstream {
        fn join(&self, channel: &str) {
            assert!(
                self.joined.lock().insert(channel.to_string()),
                "duplicate join for {channel}"
            );
            self.ops.lock().push(Op::Join(channel.to_string()));
        }

        fn part(&self, channel: &str) {
            std::thread::sleep(self.part_delay);
            assert!(
                self.joined.lock().remove(channel),
                "part without join for {channel}"
            );
            self.ops.lock().push(Op::Part(channel.to_string()));
        }
    }

    #[derive(Debug, Clone, Copy)]
    enum Mode {
        Accept,
        Fail,
        Panic,
    }

    /// Sink that logs `(key, text)` for every accepted delivery.
    #[derive(Clone)]
    struct TestSink {
        key: String,
        mode: Mode,
        log: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl NotificationSink for TestSink {
        fn deliver(&self, message: &ChatMessage) -> Result<(), SinkError> {
            match self.mode {
                Mode::Accept => {
                    self.log
                        .lock()
                        .push((self.key.clone(), message.text.clone()));
                    Ok(())
                }
                Mode::Fail => Err(SinkError::Rejected("test".into())),
                Mode::Panic => panic!("sink blew up"),
            }
        }
    }

    type TestRegistry = Registry<Arc<FakeUpstream>, TestSink>;

    struct Harness {
        registry: TestRegistry,
        upstream: Arc<FakeUpstream>,
        log: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_upstream(FakeUpstream::default())
        }

        fn with_upstream(upstream: FakeUpstream) -> Self {
            let upstream = Arc::new(upstream);
            Self {
                registry: Registry::new(Arc::clone(&upstream)),
                upstream,
                log: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn sink(&self, key: &str, mode: Mode) -> TestSink {
            TestSink {
                key: key.to_string(),
                mode,
                log: Arc::clone(&self.log),
            }
        }

        fn subscribe(&self, channels: &[&str], key: &str, filters: &[&str]) -> usize {
            let filters: Vec<String> = filters.iter().map(|f| f.to_string()).collect();
            self.registry
                .subscribe(channels, key, &filters, self.sink(key, Mode::Accept))
        }

        fn send(&self, channel: &str, text: &str) -> Vec<String> {
            self.log.lock().clear();
            self.registry
                .dispatch(&ChatMessage::new(channel, "someone", text));
            self.log.lock().iter().map(|(k, _)| k.clone()).collect()
        }

        fn ops(&self) -> Vec<Op> {
            self.upstream.ops.lock().clone()
        }

        fn assert_membership_invariant(&self) {
            let joined: BTreeSet<String> = self.upstream.joined.lock().clone();
            let live: BTreeSet<String> = self
                .registry
                .channel_names()
                .into_iter()
                .filter(|c| self.registry.subscriber_count(c) > 0)
                .collect();
            assert_eq!(joined, live);
            assert_eq!(self.registry.channel_names().len(), live.len());
        }
    }

    #[test]
    fn test_subscribe_joins_once() {
        let h = Harness::new();

        assert_eq!(h.subscribe(&["chan"], "key-1", &["foo"]), 1);
        assert_eq!(h.subscribe(&["chan"], "key-2", &["bar"]), 1);

        assert!(h.registry.is_joined("chan"));
        assert_eq!(h.registry.subscriber_count("chan"), 2);
        assert_eq!(h.ops(), vec![Op::Join("chan".into())]);
        h.assert_membership_invariant();
    }

    #[test]
    fn test_last_unsubscribe_parts() {
        let h = Harness::new();
        h.subscribe(&["chan"], "key-1", &["foo"]);
        h.subscribe(&["chan"], "key-2", &["bar"]);

        assert_eq!(h.registry.unsubscribe(["chan"], "key-1"), 1);
        assert!(h.registry.is_joined("chan"));

        assert_eq!(h.registry.unsubscribe(["chan"], "key-2"), 1);
        assert!(!h.registry.is_joined("chan"));
        assert_eq!(
            h.ops(),
            vec![Op::Join("chan".into()), Op::Part("chan".into())]
        );
        h.assert_membership_invariant();
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let h = Harness::new();
        h.subscribe(&["chan"], "key", &["foo"]);

        assert_eq!(h.registry.unsubscribe(["chan"], "key"), 1);
        assert_eq!(h.registry.unsubscribe(["chan"], "key"), 0);
        assert_eq!(h.registry.unsubscribe(["never-joined"], "key"), 0);

        assert_eq!(
            h.ops(),
            vec![Op::Join("chan".into()), Op::Part("chan".into())]
        );
    }

    #[test]
    fn test_unsubscribe_other_key_keeps_channel() {
        let h = Harness::new();
        h.subscribe(&["chan"], "key", &["foo"]);

        assert_eq!(h.registry.unsubscribe(["chan"], "stranger"), 0);
        assert!(h.registry.is_joined("chan"));
        assert_eq!(h.ops(), vec![Op::Join("chan".into())]);
    }

    #[test]
    fn test_fan_out() {
        let h = Harness::new();
        h.subscribe(&["C"], "key1", &["foo"]);
        h.subscribe(&["C"], "key2", &["bar", "baz"]);

        assert_eq!(h.send("C", "this has FOO in it"), vec!["key1"]);
        assert!(h.send("C", "no match here").is_empty());
        assert_eq!(h.send("C", "bar and foo"), vec!["key1", "key2"]);
    }

    #[test]
    fn test_dispatch_outcome() {
        let h = Harness::new();
        h.subscribe(&["C"], "key1", &["foo"]);
        h.subscribe(&["C"], "key2", &["foo"]);
        h.subscribe(&["C"], "key3", &["bar"]);

        let outcome = h
            .registry
            .dispatch(&ChatMessage::new("C", "someone", "foo"));
        assert_eq!(outcome.matched, 2);
        assert_eq!(outcome.delivered, 2);
        assert_eq!(outcome.failed(), 0);
    }

    #[test]
    fn test_no_cross_channel_leakage() {
        let h = Harness::new();
        h.subscribe(&["D"], "key", &["foo"]);

        assert!(h.send("C", "foo").is_empty());
        assert_eq!(h.send("D", "foo"), vec!["key"]);
    }

    #[test]
    fn test_dispatch_to_unknown_channel_is_noop() {
        let h = Harness::new();
        let outcome = h
            .registry
            .dispatch(&ChatMessage::new("nowhere", "someone", "foo"));
        assert_eq!(outcome, DispatchOutcome::default());
    }

    #[test]
    fn test_empty_filters_install_nothing() {
        let h = Harness::new();

        assert_eq!(h.subscribe(&["chan"], "key", &[]), 0);
        assert_eq!(h.subscribe(&["chan"], "key", &["", ""]), 0);

        assert!(!h.registry.is_joined("chan"));
        assert!(h.ops().is_empty());
        assert!(h.send("chan", "anything").is_empty());
    }

    #[test]
    fn test_empty_channel_list_is_noop() {
        let h = Harness::new();
        let none: [&str; 0] = [];

        assert_eq!(h.subscribe(&none, "key", &["foo"]), 0);
        assert_eq!(h.registry.unsubscribe(none, "key"), 0);
        assert!(h.ops().is_empty());
    }

    #[test]
    fn test_unnamed_channel_skipped() {
        let h = Harness::new();
        assert_eq!(h.subscribe(&["", "chan"], "key", &["foo"]), 1);
        assert_eq!(h.registry.channel_names(), vec!["chan"]);
    }

    #[test]
    fn test_filters_lowercased_on_subscribe() {
        let h = Harness::new();
        h.subscribe(&["chan"], "key", &["FoO"]);
        assert_eq!(h.send("chan", "fOo"), vec!["key"]);
    }

    #[test]
    fn test_multi_channel_subscribe() {
        let h = Harness::new();
        assert_eq!(h.subscribe(&["chanA", "chanB"], "user1", &["x"]), 2);

        assert!(h.registry.is_joined("chanA"));
        assert!(h.registry.is_joined("chanB"));
        let mut channels = h.registry.subscribed_channels("user1");
        channels.sort();
        assert_eq!(channels, vec!["chanA", "chanB"]);

        assert_eq!(h.registry.unsubscribe(["chanA"], "user1"), 1);
        assert!(!h.registry.is_joined("chanA"));
        assert_eq!(h.registry.subscriber_keys("chanB"), vec!["user1"]);
        assert_eq!(h.send("chanB", "x marks"), vec!["user1"]);
        h.assert_membership_invariant();
    }

    #[test]
    fn test_resubscribe_overwrites_filters() {
        let h = Harness::new();
        h.subscribe(&["chan"], "key", &["old"]);
        h.subscribe(&["chan"], "key", &["new"]);

        assert_eq!(h.registry.subscriber_count("chan"), 1);
        assert!(h.send("chan", "old").is_empty());
        assert_eq!(h.send("chan", "new"), vec!["key"]);
        assert_eq!(h.ops(), vec![Op::Join("chan".into())]);

        // A single unsubscribe removes it entirely.
        assert_eq!(h.registry.unsubscribe(["chan"], "key"), 1);
        assert!(!h.registry.is_joined("chan"));
    }

    #[test]
    fn test_dispatch_isolation() {
        let h = Harness::new();
        let filters = vec!["foo".to_string()];
        h.registry
            .subscribe(["C"], "before", &filters, h.sink("before", Mode::Accept));
        h.registry
            .subscribe(["C"], "failing", &filters, h.sink("failing", Mode::Fail));
        h.registry
            .subscribe(["C"], "panicking", &filters, h.sink("panicking", Mode::Panic));
        h.registry
            .subscribe(["C"], "after", &filters, h.sink("after", Mode::Accept));

        let outcome = h.registry.dispatch(&ChatMessage::new("C", "s", "foo"));
        assert_eq!(outcome.matched, 4);
        assert_eq!(outcome.delivered, 2);
        assert_eq!(outcome.failed(), 2);

        let keys: Vec<_> = h.log.lock().iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec!["before", "after"]);

        // Still usable afterwards.
        assert_eq!(h.send("C", "foo again"), vec!["before", "after"]);
        assert_eq!(h.registry.unsubscribe(["C"], "panicking"), 1);
        assert_eq!(h.registry.subscriber_count("C"), 3);
    }

    #[test]
    fn test_stats() {
        let h = Harness::new();
        h.subscribe(&["a", "b"], "key-1", &["x"]);
        h.subscribe(&["a"], "key-2", &["y"]);

        let stats = h.registry.stats();
        assert_eq!(stats.channel_count, 2);
        assert_eq!(stats.subscriber_count, 2);
        assert_eq!(stats.total_subscriptions, 3);
    }

    #[test]
    fn test_invariant_over_operation_sequence() {
        let h = Harness::new();
        let channels = ["a", "b", "c"];
        let keys = ["k1", "k2", "k3"];

        for step in 0..200usize {
            let channel = channels[step % 3];
            let key = keys[(step / 3) % 3];
            if (step * 7) % 5 < 3 {
                h.subscribe(&[channel], key, &["f"]);
            } else {
                h.registry.unsubscribe([channel], key);
            }
            h.assert_membership_invariant();
        }
    }

    #[test]
    fn test_concurrent_registration_keeps_invariant() {
        let h = Harness::new();
        let channels = ["a", "b", "c", "d"];

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let h = &h;
                scope.spawn(move || {
                    let key = format!("key-{worker}");
                    for round in 0..100 {
                        let channel = channels[(worker + round) % channels.len()];
                        h.subscribe(&[channel], &key, &["f"]);
                        h.registry
                            .dispatch(&ChatMessage::new(channel, "s", "f"));
                        h.registry.unsubscribe([channel], &key);
                    }
                });
            }
        });

        h.assert_membership_invariant();
        assert!(h.registry.channel_names().is_empty());
        let joins = h
            .ops()
            .iter()
            .filter(|op| matches!(op, Op::Join(_)))
            .count();
        let parts = h.ops().len() - joins;
        assert_eq!(joins, parts);
    }

    #[test]
    fn test_subscribe_during_slow_part_joins_after_it() {
        let h = Harness::with_upstream(FakeUpstream {
            part_delay: Duration::from_millis(200),
            ..FakeUpstream::default()
        });
        h.subscribe(&["chan"], "a", &["f"]);

        std::thread::scope(|scope| {
            scope.spawn(|| h.registry.unsubscribe(["chan"], "a"));
            scope.spawn(|| {
                std::thread::sleep(Duration::from_millis(50));
                h.subscribe(&["chan"], "b", &["f"]);
            });
        });

        assert_eq!(
            h.ops(),
            vec![
                Op::Join("chan".into()),
                Op::Part("chan".into()),
                Op::Join("chan".into()),
            ]
        );
        assert!(h.registry.is_joined("chan"));
        assert_eq!(h.registry.subscriber_keys("chan"), vec!["b"]);
        h.assert_membership_invariant();
    }
}
