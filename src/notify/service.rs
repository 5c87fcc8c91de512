//! Notification dispatch gated by a rate limiter.

use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

use super::notifier::Notifier;
use crate::error::{QuotaError, Result};
use crate::ratelimit::RateLimiterBackend;

/// Sends notifications after checking them against a rate limiter.
pub struct NotificationService<R: RateLimiterBackend, N: Notifier> {
    /// The rate limiter instance
    rate_limiter: Arc<R>,
    notifier: N,
}

impl<R: RateLimiterBackend, N: Notifier> NotificationService<R, N> {
    /// Create a new NotificationService with the given rate limiter and notifier.
    pub fn new(rate_limiter: Arc<R>, notifier: N) -> Self {
        Self {
            rate_limiter,
            notifier,
        }
    }

    /// Send one notification.
    ///
    /// A denial is returned as [`QuotaError::RateLimitExceeded`]. A limiter
    /// error is logged and the notification goes out anyway: limiter faults
    /// must not block legitimate traffic.
    #[instrument(skip(self, message))]
    pub fn send(&self, recipient: &str, category: &str, message: &str) -> Result<()> {
        if recipient.is_empty() {
            warn!("Received notification with empty recipient");
            return Err(QuotaError::InvalidRequest("recipient is required".to_string()));
        }
        if category.is_empty() {
            warn!("Received notification with empty category");
            return Err(QuotaError::InvalidRequest("category is required".to_string()));
        }

        match self.rate_limiter.allow(recipient, category) {
            Ok(true) => {}
            Ok(false) => {
                debug!("Notification rejected by rate limiter");
                return Err(QuotaError::RateLimitExceeded {
                    category: category.to_string(),
                    recipient: recipient.to_string(),
                });
            }
            Err(e) => {
                error!(error = %e, "Error checking rate limit, sending anyway");
            }
        }

        self.notifier.deliver(recipient, category, message)
    }
}
