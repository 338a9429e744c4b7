//! Telegram Bot API integration.
//!
//! Provides the HTTP client used for long polling and replies, and the
//! [`TelegramSink`] that turns matched chat messages into queued
//! notifications.

use crate::metrics;
use buzz_core::{ChatMessage, NotificationSink, SinkError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Telegram errors.
#[derive(Debug, Error)]
pub enum TelegramError {
    /// HTTP or decoding failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The Bot API answered `ok: false`.
    #[error("Telegram API error {code}: {description}")]
    Api { code: i64, description: String },
}

/// Bot API response envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

/// An incoming update.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    /// Monotonic update id.
    pub update_id: i64,
    /// New message, if this update carries one.
    pub message: Option<Message>,
}

/// A Telegram message.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// Chat the message was sent in.
    pub chat: Chat,
    /// Message text.
    pub text: Option<String>,
}

/// A Telegram chat.
#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    /// Chat id.
    pub id: i64,
}

/// A command shown in the Telegram client menu.
#[derive(Debug, Clone, Serialize)]
pub struct BotCommand {
    /// Command name without the slash.
    pub command: &'static str,
    /// Menu description.
    pub description: &'static str,
}

/// Minimal Bot API client.
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
}

impl TelegramClient {
    /// Create a client for the bot `token`.
    ///
    /// The HTTP timeout is set above `poll_timeout` so long polls can finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_url: &str, token: &str, poll_timeout: Duration) -> Result<Self, TelegramError> {
        let http = reqwest::Client::builder()
            .timeout(poll_timeout + Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    async fn call<P, R>(&self, method: &str, params: &P) -> Result<R, TelegramError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response: ApiResponse<R> = self
            .http
            .post(format!("{}/{}", self.base_url, method))
            .json(params)
            .send()
            .await?
            .json()
            .await?;

        match response {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            other => Err(TelegramError::Api {
                code: other.error_code.unwrap_or_default(),
                description: other
                    .description
                    .unwrap_or_else(|| "missing result".to_string()),
            }),
        }
    }

    /// Long-poll for updates starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<Update>, TelegramError> {
        self.call(
            "getUpdates",
            &serde_json::json!({
                "offset": offset,
                "timeout": timeout.as_secs(),
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    /// Send a plain text message.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        let _: serde_json::Value = self
            .call(
                "sendMessage",
                &serde_json::json!({ "chat_id": chat_id, "text": text }),
            )
            .await?;
        debug!(chat = chat_id, length = text.len(), "Sent Telegram message");
        Ok(())
    }

    /// Publish the command menu.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn set_my_commands(&self, commands: &[BotCommand]) -> Result<(), TelegramError> {
        let _: bool = self
            .call("setMyCommands", &serde_json::json!({ "commands": commands }))
            .await?;
        Ok(())
    }
}

/// A queued outbound notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Recipient chat.
    pub chat_id: i64,
    /// Message text.
    pub text: String,
}

/// Sender half of the notification queue.
pub type Outbox = mpsc::UnboundedSender<Notification>;

/// Format the alert for a matched chat message.
#[must_use]
pub fn format_notification(message: &ChatMessage) -> String {
    format!(
        "{} just sent a message at twitch.tv/{} that matches one of your filters:\n\n{}",
        message.sender, message.channel, message.text
    )
}

/// Delivers matched messages to one Telegram chat through the outbox.
#[derive(Debug, Clone)]
pub struct TelegramSink {
    chat_id: i64,
    outbox: Outbox,
}

impl TelegramSink {
    /// Create a sink for `chat_id`.
    #[must_use]
    pub fn new(chat_id: i64, outbox: Outbox) -> Self {
        Self { chat_id, outbox }
    }

    /// Get the recipient chat id.
    #[must_use]
    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }
}

impl NotificationSink for TelegramSink {
    fn deliver(&self, message: &ChatMessage) -> Result<(), SinkError> {
        self.outbox
            .send(Notification {
                chat_id: self.chat_id,
                text: format_notification(message),
            })
            .map_err(|_| SinkError::Closed)
    }
}

/// Send queued notifications until every outbox sender is dropped.
pub async fn run_outbox(client: Arc<TelegramClient>, mut queue: mpsc::UnboundedReceiver<Notification>) {
    info!("Notification outbox started");
    while let Some(notification) = queue.recv().await {
        match client
            .send_message(notification.chat_id, &notification.text)
            .await
        {
            Ok(()) => metrics::record_notification_sent(),
            Err(e) => {
                warn!(chat = notification.chat_id, error = %e, "Failed to send notification");
                metrics::record_error("telegram_send");
            }
        }
    }
    info!("Notification outbox stopped");
}
