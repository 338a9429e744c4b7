//! Command execution.
//!
//! The [`Bot`] owns the registry and the store. Every change is written to
//! the store first and then applied to the registry, so a restart replays
//! exactly what users were told.

use crate::commands::{self, Command, HELP_TEXT, START_TEXT};
use crate::metrics;
use crate::store::{StoreError, SubscriptionStore};
use crate::telegram::{Outbox, TelegramSink};
use buzz_core::{Registry, RegistryStats, Upstream};
use tracing::{debug, error, info, warn};

const STORE_FAILURE_REPLY: &str = "Something went wrong, please try again later.";

/// Telegram-facing front end over the subscription registry.
pub struct Bot<U: Upstream> {
    registry: Registry<U, TelegramSink>,
    store: SubscriptionStore,
    outbox: Outbox,
}

impl<U: Upstream> Bot<U> {
    /// Create a bot.
    #[must_use]
    pub fn new(upstream: U, store: SubscriptionStore, outbox: Outbox) -> Self {
        Self {
            registry: Registry::new(upstream),
            store,
            outbox,
        }
    }

    /// Get the registry.
    #[must_use]
    pub fn registry(&self) -> &Registry<U, TelegramSink> {
        &self.registry
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    fn sink(&self, chat_id: i64) -> TelegramSink {
        TelegramSink::new(chat_id, self.outbox.clone())
    }

    /// Load every stored subscription into the registry.
    ///
    /// Returns the number of subscriptions restored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn restore(&self) -> Result<usize, StoreError> {
        let mut restored = 0;
        for row in self.store.all()? {
            let Ok(chat_id) = row.chat_id.parse::<i64>() else {
                warn!(chat = %row.chat_id, channel = %row.channel, "Skipping row with invalid chat id");
                continue;
            };
            restored += self.registry.subscribe(
                [row.channel.as_str()],
                &row.chat_id,
                &row.filters,
                self.sink(chat_id),
            );
        }
        self.refresh_gauges();
        info!(restored, "Subscriptions restored");
        Ok(restored)
    }

    /// Run a command for `chat_id` and return the reply, if any.
    pub fn execute(&self, chat_id: i64, command: Command) -> Option<String> {
        debug!(chat = chat_id, command = ?command, "Executing command");
        let reply = match command {
            Command::Start => {
                metrics::record_command("start");
                START_TEXT.to_string()
            }
            Command::Help => {
                metrics::record_command("help");
                HELP_TEXT.to_string()
            }
            Command::List => {
                metrics::record_command("list");
                self.list(chat_id)
            }
            Command::Subscribe { channel, filters } => {
                metrics::record_command("subscribe");
                self.subscribe(chat_id, &channel, &filters)
            }
            Command::Unsubscribe { channel } => {
                metrics::record_command("unsubscribe");
                self.unsubscribe(chat_id, &channel)
            }
            Command::Unknown(name) => {
                debug!(chat = chat_id, command = %name, "Ignoring unknown command");
                return None;
            }
        };
        Some(reply)
    }

    fn subscribe(&self, chat_id: i64, channel: &str, filters: &[String]) -> String {
        if let Err(reply) =
            commands::check_channel(channel, "Please specify a channel to subscribe to.")
        {
            return reply;
        }
        if filters.is_empty() {
            return "Please specify at least one filter.".to_string();
        }

        let key = chat_id.to_string();
        if let Err(e) = self.store.replace(&key, channel, filters) {
            return store_failure(&e);
        }
        self.registry
            .subscribe([channel], &key, filters, self.sink(chat_id));
        metrics::record_subscription_change("subscribe");
        self.refresh_gauges();

        let listed: Vec<String> = filters.iter().map(|f| format!("- {f}")).collect();
        format!("Subscribed to {} with filters:\n{}", channel, listed.join("\n"))
    }

    fn unsubscribe(&self, chat_id: i64, channel: &str) -> String {
        if let Err(reply) =
            commands::check_channel(channel, "Please specify a channel to unsubscribe from.")
        {
            return reply;
        }

        let key = chat_id.to_string();
        if let Err(e) = self.store.remove(&key, channel) {
            return store_failure(&e);
        }
        if self.registry.unsubscribe([channel], &key) > 0 {
            metrics::record_subscription_change("unsubscribe");
        }
        self.refresh_gauges();

        format!("Unsubscribed from {channel}")
    }

    fn list(&self, chat_id: i64) -> String {
        let rows = match self.store.list_for_chat(&chat_id.to_string()) {
            Ok(rows) => rows,
            Err(e) => return store_failure(&e),
        };
        if rows.is_empty() {
            return "You have no subscriptions.\nAdd one using /subscribe <channel> <filters>"
                .to_string();
        }

        let lines: Vec<String> = rows
            .iter()
            .map(|row| format!("twitch.tv/{}: {}", row.channel, row.filters.join(", ")))
            .collect();
        format!(
            "Your subscriptions:\n{}\n\nRemove one using /unsubscribe <channel>",
            lines.join("\n")
        )
    }

    fn refresh_gauges(&self) {
        let stats = self.registry.stats();
        metrics::set_active_channels(stats.channel_count);
        metrics::set_subscriptions(stats.total_subscriptions);
    }
}

fn store_failure(e: &StoreError) -> String {
    error!(error = %e, "Subscription store failure");
    metrics::record_error("store");
    STORE_FAILURE_REPLY.to_string()
}
