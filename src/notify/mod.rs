//! Rate-limited notification dispatch.

mod notifier;
mod service;

pub use notifier::{LogNotifier, Notifier};
pub use service::NotificationService;
