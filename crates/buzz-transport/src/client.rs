//! Twitch chat client.
//!
//! [`ChatClient::spawn`] starts a background task that owns the connection.
//! It logs in anonymously, keeps the set of requested channels joined across
//! reconnects, answers keepalives and forwards chat lines as
//! [`TransportEvent`]s. Callers steer membership through the returned
//! [`ChatHandle`], which implements [`Upstream`] for the registry.

use buzz_core::{ChatMessage, Upstream};
use buzz_protocol::{commands, IrcMessage};
use std::collections::BTreeSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::traits::{Connection, Connector, TransportError, TransportEvent};

/// Capabilities requested after connecting.
pub const CAPABILITIES: [&str; 2] = ["twitch.tv/tags", "twitch.tv/commands"];

/// Chat client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Login name. Defaults to an anonymous `justinfan` nick.
    pub nick: Option<String>,
    /// Login password (`oauth:...`). Anonymous logins send none.
    pub password: Option<String>,
    /// First delay before reconnecting.
    pub reconnect_delay: Duration,
    /// Upper bound for the reconnect delay.
    pub max_reconnect_delay: Duration,
    /// Capacity of the event channel.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            nick: None,
            password: None,
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(60),
            event_capacity: 1024,
        }
    }
}

/// Generate an anonymous read-only nick.
#[must_use]
pub fn anonymous_nick() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    format!("justinfan{}", 10_000 + nanos % 90_000)
}

#[derive(Debug)]
enum Command {
    Join(String),
    Part(String),
}

/// Cheap, cloneable control handle for a running chat client.
#[derive(Debug, Clone)]
pub struct ChatHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl ChatHandle {
    fn send(&self, command: Command) {
        if let Err(e) = self.commands.send(command) {
            warn!(command = ?e.0, "Chat client stopped, dropping request");
        }
    }

    /// Check if the client task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

impl Upstream for ChatHandle {
    fn join(&self, channel: &str) {
        self.send(Command::Join(channel.to_string()));
    }

    fn part(&self, channel: &str) {
        self.send(Command::Part(channel.to_string()));
    }
}

/// How a session ended without an error.
enum SessionEnd {
    /// Every handle is gone or the event receiver was dropped.
    Shutdown,
    /// The server asked us to reconnect or hung up cleanly.
    Reconnect,
}

/// The background chat client.
pub struct ChatClient<C> {
    connector: C,
    config: ClientConfig,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::Sender<TransportEvent>,
    /// Channels that should be joined, whether or not we are connected.
    channels: BTreeSet<String>,
    backoff: Duration,
}

impl<C: Connector + 'static> ChatClient<C> {
    /// Start the client task.
    ///
    /// The task runs until every [`ChatHandle`] clone or the event receiver
    /// is dropped.
    pub fn spawn(
        connector: C,
        config: ClientConfig,
    ) -> (ChatHandle, mpsc::Receiver<TransportEvent>, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));

        let client = Self {
            connector,
            backoff: config.reconnect_delay,
            config,
            commands: command_rx,
            events: event_tx,
            channels: BTreeSet::new(),
        };
        let task = tokio::spawn(client.run());

        (ChatHandle { commands: command_tx }, event_rx, task)
    }

    async fn run(mut self) {
        info!(connector = self.connector.name(), "Chat client started");

        loop {
            let closed_with = match self.session().await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Reconnect) => None,
                Err(e) => {
                    warn!(error = %e, "Chat connection lost");
                    Some(e)
                }
            };

            if self.events.send(TransportEvent::Closed(closed_with)).await.is_err() {
                break;
            }
            if !self.wait_backoff().await {
                break;
            }
        }

        info!("Chat client stopped");
    }

    /// Sleep before reconnecting while still tracking join/part requests.
    ///
    /// Returns `false` if the client should shut down instead.
    async fn wait_backoff(&mut self) -> bool {
        let delay = self.backoff;
        self.backoff = (self.backoff * 2).min(self.config.max_reconnect_delay);
        debug!(delay_ms = delay.as_millis() as u64, "Reconnecting after delay");

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    Some(command) => {
                        self.track(&command);
                    }
                    None => return false,
                },
            }
        }
    }

    /// Record a join/part in the tracked channel set.
    ///
    /// Returns `true` if the set changed.
    fn track(&mut self, command: &Command) -> bool {
        match command {
            Command::Join(channel) => self.channels.insert(channel.clone()),
            Command::Part(channel) => self.channels.remove(channel),
        }
    }

    async fn session(&mut self) -> Result<SessionEnd, TransportError> {
        let mut conn = self.connector.connect().await?;
        self.login(conn.as_mut()).await?;

        let mut ready = false;
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        let _ = conn.close().await;
                        return Ok(SessionEnd::Shutdown);
                    };
                    if self.track(&command) && ready {
                        let line = match &command {
                            Command::Join(channel) => IrcMessage::join(channel),
                            Command::Part(channel) => IrcMessage::part(channel),
                        };
                        debug!(request = %line, "Updating membership");
                        conn.send(&line).await?;
                    }
                }
                incoming = conn.recv() => {
                    let Some(message) = incoming? else {
                        return Ok(SessionEnd::Reconnect);
                    };
                    if let Some(end) = self.handle(message, conn.as_mut(), &mut ready).await? {
                        let _ = conn.close().await;
                        return Ok(end);
                    }
                }
            }
        }
    }

    async fn login(&self, conn: &mut dyn Connection) -> Result<(), TransportError> {
        conn.send(&IrcMessage::cap_req(&CAPABILITIES)).await?;
        if let Some(password) = &self.config.password {
            conn.send(&IrcMessage::pass(password.clone())).await?;
        }
        let nick = self.config.nick.clone().unwrap_or_else(anonymous_nick);
        debug!(nick = %nick, "Logging in");
        conn.send(&IrcMessage::nick(nick)).await
    }

    async fn handle(
        &mut self,
        message: IrcMessage,
        conn: &mut dyn Connection,
        ready: &mut bool,
    ) -> Result<Option<SessionEnd>, TransportError> {
        if message.is(commands::PRIVMSG) {
            let (Some(channel), Some(text)) = (message.channel(), message.text()) else {
                trace!("PRIVMSG without channel or text");
                return Ok(None);
            };
            let sender = message.display_name().unwrap_or_default();
            let event = TransportEvent::Message(ChatMessage::new(channel, sender, text));
            if self.events.send(event).await.is_err() {
                return Ok(Some(SessionEnd::Shutdown));
            }
        } else if message.is(commands::PING) {
            conn.send(&IrcMessage::pong(&message)).await?;
        } else if message.is(commands::RPL_WELCOME) {
            *ready = true;
            self.backoff = self.config.reconnect_delay;
            info!(channels = self.channels.len(), "Successfully connected to chat");
            for channel in &self.channels {
                conn.send(&IrcMessage::join(channel)).await?;
            }
            if self.events.send(TransportEvent::Ready).await.is_err() {
                return Ok(Some(SessionEnd::Shutdown));
            }
        } else if message.is(commands::RECONNECT) {
            info!("Server requested reconnect");
            return Ok(Some(SessionEnd::Reconnect));
        } else if message.is(commands::NOTICE) {
            let text = message.text().unwrap_or_default();
            if !*ready && text.contains("authentication failed") {
                return Err(TransportError::LoginFailed(text.to_string()));
            }
            debug!(notice = %text, "Server notice");
        } else {
            trace!(command = %message.command, "Ignoring line");
        }
        Ok(None)
    }
}
