//! Bot configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (BUZZ_*, TELEGRAM_TOKEN)
//! - TOML configuration file

use anyhow::{bail, Context, Result};
use buzz_transport::{ClientConfig, TcpConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host the ops endpoint binds to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port of the ops endpoint.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Chat connection.
    #[serde(default)]
    pub irc: IrcConfig,

    /// Telegram bot.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Subscription database.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Chat connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrcConfig {
    /// Chat server host.
    #[serde(default = "default_irc_host")]
    pub host: String,

    /// Chat server port.
    #[serde(default = "default_irc_port")]
    pub port: u16,

    /// Login name; anonymous when unset.
    #[serde(default)]
    pub nick: Option<String>,

    /// OAuth password for `nick`.
    #[serde(default)]
    pub password: Option<String>,

    /// Connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// First reconnect delay in milliseconds.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    /// Maximum reconnect delay in milliseconds.
    #[serde(default = "default_max_reconnect_delay")]
    pub max_reconnect_delay_ms: u64,
}

/// Telegram bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    #[serde(default = "default_token")]
    pub token: String,

    /// Bot API base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Long polling timeout in seconds.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,

    /// Delay before retrying a failed poll, in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path.
    #[serde(default = "default_database_path")]
    pub path: String,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("BUZZ_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("BUZZ_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_irc_host() -> String {
    "irc.chat.twitch.tv".to_string()
}

fn default_irc_port() -> u16 {
    6667
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_reconnect_delay() -> u64 {
    1_000
}

fn default_max_reconnect_delay() -> u64 {
    60_000
}

fn default_token() -> String {
    std::env::var("TELEGRAM_TOKEN").unwrap_or_default()
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout() -> u64 {
    30
}

fn default_retry_delay() -> u64 {
    5_000
}

fn default_database_path() -> String {
    std::env::var("BUZZ_DATABASE").unwrap_or_else(|_| "db/db.sqlite".to_string())
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            irc: IrcConfig::default(),
            telegram: TelegramConfig::default(),
            database: DatabaseConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            host: default_irc_host(),
            port: default_irc_port(),
            nick: None,
            password: None,
            connect_timeout_ms: default_connect_timeout(),
            reconnect_delay_ms: default_reconnect_delay(),
            max_reconnect_delay_ms: default_max_reconnect_delay(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: default_token(),
            api_url: default_api_url(),
            poll_timeout_secs: default_poll_timeout(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl IrcConfig {
    /// Connector settings for the chat client.
    #[must_use]
    pub fn tcp_config(&self) -> TcpConfig {
        TcpConfig {
            host: self.host.clone(),
            port: self.port,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }

    /// Session settings for the chat client.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            nick: self.nick.clone(),
            password: self.password.clone(),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            max_reconnect_delay: Duration::from_millis(self.max_reconnect_delay_ms),
            ..ClientConfig::default()
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "buzz.toml",
            "/etc/buzz/buzz.toml",
            "~/.config/buzz/buzz.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Check settings that have no usable default.
    ///
    /// # Errors
    ///
    /// Returns an error if the Telegram token is missing.
    pub fn validate(&self) -> Result<()> {
        if self.telegram.token.trim().is_empty() {
            bail!("Telegram token is not configured (set TELEGRAM_TOKEN or [telegram].token)");
        }
        Ok(())
    }

    /// Get the socket address of the ops endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid host:port {}:{}", self.host, self.port))
    }

    /// Get the database path with `~` expanded.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.database.path).as_ref())
    }
}
