//! Error types for notify-quota.

use thiserror::Error;

/// Main error type for notify-quota operations.
#[derive(Error, Debug)]
pub enum QuotaError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A limit or interval that can never admit anything
    #[error("Invalid rate limit rule: {0}")]
    InvalidLimit(String),

    /// A rule file entry that can never admit anything
    #[error("Invalid rule for category {category}: {reason}")]
    InvalidRule { category: String, reason: String },

    /// A notification request that cannot be dispatched
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Failures reported by a rate limiter backend
    #[error("Rate limiter backend error: {0}")]
    Backend(String),

    /// The recipient has used up the quota for this category
    #[error("rate limit exceeded for {category} notifications to {recipient}")]
    RateLimitExceeded { category: String, recipient: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for notify-quota operations.
pub type Result<T> = std::result::Result<T, QuotaError>;
