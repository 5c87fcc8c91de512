//! Rate limit key generation and handling.

/// A key that uniquely identifies a (recipient, category) quota.
///
/// Kept as a struct rather than a joined string so that no choice of
/// separator can make two distinct pairs collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    /// Who receives the notification
    pub recipient: String,
    /// The notification category the rule is looked up by
    pub category: String,
}

impl RateLimitKey {
    /// Create a new key from a recipient and category.
    pub fn new(recipient: &str, category: &str) -> Self {
        Self {
            recipient: recipient.to_string(),
            category: category.to_string(),
        }
    }
}

impl std::fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}", self.recipient, self.category)
    }
}
