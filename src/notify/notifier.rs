//! Delivery of admitted notifications.

use tracing::info;

use crate::error::Result;

/// Delivers a notification that has passed rate limiting.
pub trait Notifier: Send + Sync {
    fn deliver(&self, recipient: &str, category: &str, message: &str) -> Result<()>;
}

/// Notifier that writes each delivery to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn deliver(&self, recipient: &str, category: &str, message: &str) -> Result<()> {
        info!(recipient, category, message, "Sending notification");
        Ok(())
    }
}
