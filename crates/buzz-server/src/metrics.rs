//! Metrics collection and export for Buzz.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CHAT_MESSAGES_TOTAL: &str = "buzz_chat_messages_total";
    pub const CHAT_MESSAGES_BYTES: &str = "buzz_chat_messages_bytes";
    pub const CHAT_CONNECTED: &str = "buzz_chat_connected";
    pub const DELIVERIES_TOTAL: &str = "buzz_deliveries_total";
    pub const DELIVERY_FAILURES_TOTAL: &str = "buzz_delivery_failures_total";
    pub const DISPATCH_SECONDS: &str = "buzz_dispatch_seconds";
    pub const MESSAGE_AGE_SECONDS: &str = "buzz_message_age_seconds";
    pub const NOTIFICATIONS_SENT_TOTAL: &str = "buzz_notifications_sent_total";
    pub const CHANNELS_ACTIVE: &str = "buzz_channels_active";
    pub const SUBSCRIPTIONS_ACTIVE: &str = "buzz_subscriptions_active";
    pub const SUBSCRIPTION_CHANGES_TOTAL: &str = "buzz_subscription_changes_total";
    pub const COMMANDS_TOTAL: &str = "buzz_commands_total";
    pub const ERRORS_TOTAL: &str = "buzz_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CHAT_MESSAGES_TOTAL,
        "Total number of chat messages received"
    );
    metrics::describe_counter!(
        names::CHAT_MESSAGES_BYTES,
        "Total bytes of chat message text received"
    );
    metrics::describe_gauge!(
        names::CHAT_CONNECTED,
        "Whether the chat connection is logged in"
    );
    metrics::describe_counter!(
        names::DELIVERIES_TOTAL,
        "Total number of matched messages handed to sinks"
    );
    metrics::describe_counter!(
        names::DELIVERY_FAILURES_TOTAL,
        "Total number of sink deliveries that failed"
    );
    metrics::describe_histogram!(names::DISPATCH_SECONDS, "Dispatch latency in seconds");
    metrics::describe_histogram!(
        names::MESSAGE_AGE_SECONDS,
        "Time from receiving a chat message until dispatch starts"
    );
    metrics::describe_counter!(
        names::NOTIFICATIONS_SENT_TOTAL,
        "Total number of notifications sent to Telegram"
    );
    metrics::describe_gauge!(names::CHANNELS_ACTIVE, "Current number of joined channels");
    metrics::describe_gauge!(
        names::SUBSCRIPTIONS_ACTIVE,
        "Current number of subscriptions"
    );
    metrics::describe_counter!(
        names::SUBSCRIPTION_CHANGES_TOTAL,
        "Total number of subscribe and unsubscribe operations"
    );
    metrics::describe_counter!(names::COMMANDS_TOTAL, "Total number of bot commands handled");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record an inbound chat message.
pub fn record_chat_message(bytes: usize) {
    counter!(names::CHAT_MESSAGES_TOTAL).increment(1);
    counter!(names::CHAT_MESSAGES_BYTES).increment(bytes as u64);
}

/// Record the result of one dispatch.
pub fn record_dispatch(delivered: usize, failed: usize, seconds: f64) {
    counter!(names::DELIVERIES_TOTAL).increment(delivered as u64);
    if failed > 0 {
        counter!(names::DELIVERY_FAILURES_TOTAL).increment(failed as u64);
    }
    histogram!(names::DISPATCH_SECONDS).record(seconds);
}

/// Record how long a chat message waited before dispatch.
pub fn record_message_age(seconds: f64) {
    histogram!(names::MESSAGE_AGE_SECONDS).record(seconds);
}

/// Record a notification that reached Telegram.
pub fn record_notification_sent() {
    counter!(names::NOTIFICATIONS_SENT_TOTAL).increment(1);
}

/// Set the chat connection state.
pub fn set_chat_connected(connected: bool) {
    gauge!(names::CHAT_CONNECTED).set(if connected { 1.0 } else { 0.0 });
}

/// Update joined channel count.
pub fn set_active_channels(count: usize) {
    gauge!(names::CHANNELS_ACTIVE).set(count as f64);
}

/// Update subscription count.
pub fn set_subscriptions(count: usize) {
    gauge!(names::SUBSCRIPTIONS_ACTIVE).set(count as f64);
}

/// Record a subscribe or unsubscribe.
pub fn record_subscription_change(kind: &'static str) {
    counter!(names::SUBSCRIPTION_CHANGES_TOTAL, "kind" => kind).increment(1);
}

/// Record a handled command.
pub fn record_command(command: &'static str) {
    counter!(names::COMMANDS_TOTAL, "command" => command).increment(1);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}
