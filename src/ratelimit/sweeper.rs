//! Background reclamation of idle keys.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use super::clock::Clock;
use super::limiter::RateLimiter;

/// Default time between sweeps.
///
/// Expired records are already ignored on read, so sweeping only bounds
/// memory held by idle keys and does not need to be frequent.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(120);

/// Spawn a task that calls [`RateLimiter::sweep_expired`] every `period`.
///
/// The task holds only a weak reference and stops on its own once the
/// limiter is dropped. Must be called from within a tokio runtime, and
/// `period` must be non-zero.
pub fn spawn_sweeper<C>(limiter: &Arc<RateLimiter<C>>, period: Duration) -> JoinHandle<()>
where
    C: Clock + 'static,
{
    let limiter: Weak<RateLimiter<C>> = Arc::downgrade(limiter);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(limiter) = limiter.upgrade() else {
                trace!("Rate limiter dropped, stopping sweeper");
                break;
            };

            let evicted = limiter.sweep_expired();
            if evicted > 0 {
                debug!(
                    evicted,
                    remaining = limiter.tracked_keys(),
                    "Evicted idle rate limit keys"
                );
            }
        }
    })
}
