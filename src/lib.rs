//! notify-quota - per-recipient notification rate limiting
//!
//! This crate gates outbound notifications with a sliding-window quota per
//! (recipient, category) pair. Rules are configured per category; categories
//! without a rule are never limited. Idle keys are reclaimed by a periodic
//! sweep so memory tracks only recently active recipients.

pub mod config;
pub mod error;
pub mod notify;
pub mod ratelimit;
