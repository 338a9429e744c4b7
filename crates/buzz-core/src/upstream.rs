//! Upstream channel membership.
//!
//! The registry drives joins and parts through this trait. Both calls are
//! fire-and-forget: implementations queue the request and return at once.

use std::sync::Arc;

/// Join/part control over the upstream chat connection.
pub trait Upstream: Send + Sync {
    /// Start receiving messages for `channel`.
    fn join(&self, channel: &str);

    /// Stop receiving messages for `channel`.
    fn part(&self, channel: &str);
}

impl<T: Upstream + ?Sized> Upstream for Arc<T> {
    fn join(&self, channel: &str) {
        (**self).join(channel);
    }

    fn part(&self, channel: &str) {
        (**self).part(channel);
    }
}

impl<T: Upstream + ?Sized> Upstream for &T {
    fn join(&self, channel: &str) {
        (**self).join(channel);
    }

    fn part(&self, channel: &str) {
        (**self).part(channel);
    }
}
