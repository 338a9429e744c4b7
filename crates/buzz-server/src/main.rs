//! # Buzz
//!
//! Telegram bot that watches Twitch chat channels and alerts subscribers
//! when a message contains one of their keywords.
//!
//! ## Usage
//!
//! ```bash
//! # Run with a token from the environment
//! TELEGRAM_TOKEN=123:abc buzz
//!
//! # Run with a config file in the working directory
//! buzz   # reads ./buzz.toml
//!
//! # Override the ops endpoint and database
//! BUZZ_PORT=8081 BUZZ_DATABASE=/var/lib/buzz/db.sqlite buzz
//! ```

mod bot;
mod commands;
mod config;
mod handlers;
mod metrics;
mod store;
mod telegram;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "buzz=debug,buzz_core=debug,buzz_transport=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;
    config.validate()?;

    tracing::info!(
        "Starting Buzz, chat server {}:{}, ops endpoint {}:{}",
        config.irc.host,
        config.irc.port,
        config.host,
        config.port
    );

    // Initialize metrics
    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}
