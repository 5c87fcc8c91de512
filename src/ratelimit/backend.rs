//! Rate limiter trait for abstracting over limiter implementations.

use crate::error::Result;

/// Trait for rate limiter implementations.
///
/// The in-memory [`RateLimiter`](super::RateLimiter) never fails. The error
/// channel exists for backends that can, such as a shared networked store,
/// so callers always have one place to decide between failing open and
/// failing closed.
pub trait RateLimiterBackend: Send + Sync {
    /// Decide whether `recipient` may receive a `category` notification now.
    ///
    /// `Ok(false)` is a normal denial, not an error.
    fn allow(&self, recipient: &str, category: &str) -> Result<bool>;
}
