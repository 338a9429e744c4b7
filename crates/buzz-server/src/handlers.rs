//! Runtime wiring for the Buzz bot.
//!
//! This module starts the chat client, the Telegram loops and the ops
//! endpoint, and moves events between them.

use crate::bot::Bot;
use crate::commands;
use crate::config::Config;
use crate::metrics;
use crate::store::SubscriptionStore;
use crate::telegram::{self, TelegramClient, Update};
use anyhow::{Context, Result};
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use buzz_core::{RegistryStats, Upstream};
use buzz_transport::{ChatClient, ChatHandle, TcpConnector, TransportEvent};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Run the bot until the ops server stops or a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if the database, the Telegram client or the ops
/// listener cannot be set up.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let database = config.database_path();
    let store = SubscriptionStore::open(&database)
        .with_context(|| format!("Failed to open database {}", database.display()))?;

    let poll_timeout = Duration::from_secs(config.telegram.poll_timeout_secs);
    let telegram = Arc::new(
        TelegramClient::new(&config.telegram.api_url, &config.telegram.token, poll_timeout)
            .context("Failed to build Telegram client")?,
    );

    let (handle, events, chat_task) = ChatClient::spawn(
        TcpConnector::new(config.irc.tcp_config()),
        config.irc.client_config(),
    );
    let (outbox, queue) = mpsc::unbounded_channel();
    let bot = Arc::new(Bot::new(handle, store, outbox));
    bot.restore().context("Failed to restore subscriptions")?;

    tokio::spawn(telegram::run_outbox(telegram.clone(), queue));
    tokio::spawn(route_events(bot.clone(), events));

    if let Err(e) = telegram.set_my_commands(&commands::MENU).await {
        warn!(error = %e, "Failed to publish command menu");
    }
    let retry_delay = Duration::from_millis(config.telegram.retry_delay_ms);
    let poller = tokio::spawn(poll_updates(
        bot.clone(),
        telegram,
        poll_timeout,
        retry_delay,
    ));

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler::<ChatHandle>))
        .with_state(bot);

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Buzz ops endpoint listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    poller.abort();
    chat_task.abort();
    info!("Buzz stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Feed chat transport events into the registry.
pub async fn route_events<U: Upstream>(bot: Arc<Bot<U>>, mut events: mpsc::Receiver<TransportEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Ready => {
                info!("Successfully connected to chat");
                metrics::set_chat_connected(true);
            }
            TransportEvent::Message(message) => {
                metrics::record_chat_message(message.text_size());
                metrics::record_message_age(message.age().as_secs_f64());
                let start = Instant::now();
                let outcome = bot.registry().dispatch(&message);
                metrics::record_dispatch(
                    outcome.delivered,
                    outcome.failed(),
                    start.elapsed().as_secs_f64(),
                );
                trace!(
                    id = message.id,
                    channel = %message.channel,
                    matched = outcome.matched,
                    delivered = outcome.delivered,
                    "Dispatched"
                );
            }
            TransportEvent::Closed(reason) => {
                metrics::set_chat_connected(false);
                match reason {
                    Some(e) => {
                        warn!(error = %e, "Chat connection closed");
                        metrics::record_error("chat");
                    }
                    None => info!("Chat connection closed"),
                }
            }
        }
    }
    debug!("Chat event stream ended");
}

/// Run a Telegram update through the bot, returning the reply target.
pub fn handle_update<U: Upstream>(bot: &Bot<U>, update: Update) -> Option<(i64, String)> {
    let message = update.message?;
    let command = commands::parse(message.text.as_deref()?)?;
    let chat_id = message.chat.id;
    bot.execute(chat_id, command).map(|reply| (chat_id, reply))
}

/// Run [`handle_update`] on the blocking pool, since commands hit SQLite.
pub async fn answer_update<U: Upstream + 'static>(
    bot: &Arc<Bot<U>>,
    update: Update,
) -> Option<(i64, String)> {
    let bot = Arc::clone(bot);
    match tokio::task::spawn_blocking(move || handle_update(&bot, update)).await {
        Ok(reply) => reply,
        Err(e) => {
            error!(error = %e, "Command handler failed");
            metrics::record_error("command");
            None
        }
    }
}

/// Long-poll Telegram for commands and answer them.
async fn poll_updates<U: Upstream + 'static>(
    bot: Arc<Bot<U>>,
    client: Arc<TelegramClient>,
    timeout: Duration,
    retry_delay: Duration,
) {
    info!("Polling Telegram for updates");
    let mut offset = 0;
    loop {
        let updates = match client.get_updates(offset, timeout).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, "Failed to fetch updates, retrying in {:?}", retry_delay);
                metrics::record_error("telegram_poll");
                tokio::time::sleep(retry_delay).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            if let Some((chat_id, reply)) = answer_update(&bot, update).await {
                if let Err(e) = client.send_message(chat_id, &reply).await {
                    warn!(chat = chat_id, error = %e, "Failed to send reply");
                    metrics::record_error("telegram_send");
                }
            }
        }
    }
}

/// Health check handler.
async fn health_handler(State(bot): State<Arc<Bot<ChatHandle>>>) -> impl IntoResponse {
    let chat = if bot.registry().upstream().is_running() {
        "running"
    } else {
        "stopped"
    };
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "chat": chat
    }))
}

/// Registry statistics handler.
async fn stats_handler<U: Upstream + 'static>(State(bot): State<Arc<Bot<U>>>) -> Json<RegistryStats> {
    Json(bot.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::{Chat, Message};
    use buzz_core::ChatMessage;
    use buzz_transport::{ClientConfig, TcpConfig};

    struct NullUpstream;

    impl Upstream for NullUpstream {
        fn join(&self, _channel: &str) {}
        fn part(&self, _channel: &str) {}
    }

    fn bot() -> (
        Arc<Bot<NullUpstream>>,
        mpsc::UnboundedReceiver<telegram::Notification>,
    ) {
        let (outbox, queue) = mpsc::unbounded_channel();
        let store = SubscriptionStore::open_in_memory().unwrap();
        (Arc::new(Bot::new(NullUpstream, store, outbox)), queue)
    }

    fn update(chat_id: i64, text: Option<&str>) -> Update {
        Update {
            update_id: 1,
            message: Some(Message {
                chat: Chat { id: chat_id },
                text: text.map(str::to_string),
            }),
        }
    }

    #[test]
    fn test_handle_update() {
        let (bot, _) = bot();
        let (chat, reply) = handle_update(&bot, update(3, Some("/subscribe forsen hi"))).unwrap();
        assert_eq!(chat, 3);
        assert!(reply.starts_with("Subscribed to forsen"));

        assert!(handle_update(&bot, update(3, Some("just chatting"))).is_none());
        assert!(handle_update(&bot, update(3, None)).is_none());
        assert!(handle_update(
            &bot,
            Update {
                update_id: 2,
                message: None
            }
        )
        .is_none());
    }

    #[tokio::test]
    async fn test_route_events_dispatches() {
        let (bot, mut queue) = bot();
        handle_update(&bot, update(9, Some("/subscribe forsen news")));

        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(route_events(bot.clone(), rx));
        tx.send(TransportEvent::Ready).await.unwrap();
        tx.send(TransportEvent::Message(ChatMessage::new("forsen", "a", "big NEWS")))
            .await
            .unwrap();
        tx.send(TransportEvent::Message(ChatMessage::new("forsen", "b", "nothing")))
            .await
            .unwrap();
        tx.send(TransportEvent::Closed(None)).await.unwrap();
        drop(tx);
        task.await.unwrap();

        let notification = queue.recv().await.unwrap();
        assert_eq!(notification.chat_id, 9);
        assert!(notification.text.ends_with("big NEWS"));
        assert!(queue.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let (bot, _) = bot();
        handle_update(&bot, update(1, Some("/subscribe forsen a")));
        handle_update(&bot, update(2, Some("/subscribe forsen b")));

        let Json(stats) = stats_handler(State(bot)).await;
        assert_eq!(stats.channel_count, 1);
        assert_eq!(stats.total_subscriptions, 2);
    }

    #[tokio::test]
    async fn test_answer_update_off_runtime_thread() {
        let (bot, _) = bot();
        let (chat, reply) = answer_update(&bot, update(4, Some("/subscribe xqc pog")))
            .await
            .unwrap();
        assert_eq!(chat, 4);
        assert_eq!(reply, "Subscribed to xqc with filters:\n- pog");
        assert!(bot.registry().is_joined("xqc"));
        assert!(answer_update(&bot, update(4, Some("/nope"))).await.is_none());
    }

    #[tokio::test]
    async fn test_health_reports_chat_client_state() {
        let connector = TcpConnector::new(TcpConfig {
            host: "127.0.0.1".into(),
            port: 1,
            connect_timeout: Duration::from_millis(100),
        });
        let (handle, _events, task) = ChatClient::spawn(connector, ClientConfig::default());
        let (outbox, _queue) = mpsc::unbounded_channel();
        let store = SubscriptionStore::open_in_memory().unwrap();
        let bot = Arc::new(Bot::new(handle, store, outbox));

        let body = health_handler(State(bot.clone())).await.into_response();
        let bytes = axum::body::to_bytes(body.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["chat"], "running");

        task.abort();
        let _ = task.await;
        let body = health_handler(State(bot)).await.into_response();
        let bytes = axum::body::to_bytes(body.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["chat"], "stopped");
    }
}
