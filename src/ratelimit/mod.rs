//! Rate limiting logic and state management.

mod backend;
mod clock;
mod key;
mod limiter;
mod rules;
mod store;
mod sweeper;

pub use backend::RateLimiterBackend;
#[cfg(any(test, feature = "test-helpers"))]
pub use clock::MockClock;
pub use clock::{Clock, SystemClock};
pub use key::RateLimitKey;
pub use limiter::RateLimiter;
pub use rules::{Rule, RuleConfig, RuleTable, RulesFile};
pub use sweeper::{spawn_sweeper, DEFAULT_SWEEP_INTERVAL};
