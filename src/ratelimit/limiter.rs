//! Core sliding-window rate limiter implementation.

use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::backend::RateLimiterBackend;
use super::clock::{Clock, SystemClock};
use super::key::RateLimitKey;
use super::rules::RuleTable;
use super::store::TimestampStore;
use crate::error::Result;

/// Per-recipient, per-category sliding-window rate limiter.
///
/// Each (recipient, category) key keeps the instants of its recent
/// admissions. A call is admitted while fewer than `limit` of them fall in
/// the trailing `interval`. Work on one key is serialized by that key's
/// lock; different keys never contend.
///
/// This struct is thread-safe and can be shared across threads and tasks.
pub struct RateLimiter<C: Clock = SystemClock> {
    /// Category rules, fixed at construction
    rules: RuleTable,
    /// Timestamp records and their key locks
    store: TimestampStore,
    clock: C,
}

impl RateLimiter<SystemClock> {
    /// Create a new rate limiter using the system clock.
    pub fn new(rules: RuleTable) -> Self {
        Self::with_clock(rules, SystemClock::new())
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a new rate limiter reading time from `clock`.
    pub fn with_clock(rules: RuleTable, clock: C) -> Self {
        Self {
            rules,
            store: TimestampStore::new(),
            clock,
        }
    }

    /// Check and record one notification for `recipient` in `category`.
    ///
    /// Returns `true` if the notification is admitted. Categories without a
    /// rule are always admitted and leave no state behind.
    pub fn check_rate_limit(&self, recipient: &str, category: &str) -> bool {
        let Some(rule) = self.rules.rule_for(category) else {
            trace!(recipient, category, "Category is not rate limited");
            return true;
        };

        let key = RateLimitKey::new(recipient, category);
        let _guard = self.store.lock(&key);

        // Read the clock under the lock so timestamps stay ascending per key.
        let now = self.clock.now();
        let mut timestamps = prune(self.store.take(&key, now), now, rule.interval());

        trace!(
            key = %key,
            recorded = timestamps.len(),
            limit = rule.limit(),
            "Checking rate limit"
        );

        // The TTL is refreshed on denial too, so a saturated key stays tracked.
        if timestamps.len() >= rule.limit() {
            self.store.put(key.clone(), timestamps, rule.interval(), now);
            debug!(key = %key, limit = rule.limit(), "Rate limit exceeded");
            return false;
        }

        timestamps.push(now);
        self.store.put(key, timestamps, rule.interval(), now);
        true
    }

    /// Number of timestamps currently recorded for a key.
    ///
    /// Returns `None` if the key has no live record, which is always the case
    /// for categories without a rule.
    pub fn recorded(&self, recipient: &str, category: &str) -> Option<usize> {
        let key = RateLimitKey::new(recipient, category);
        self.store.record_len(&key, self.clock.now())
    }

    /// Remove every key idle for longer than its interval, along with its
    /// lock. Returns the number of keys reclaimed.
    pub fn sweep_expired(&self) -> usize {
        self.store.sweep_expired(self.clock.now())
    }

    /// Number of keys with a stored record.
    pub fn tracked_keys(&self) -> usize {
        self.store.record_count()
    }

    /// Number of registered key locks.
    pub fn lock_count(&self) -> usize {
        self.store.lock_count()
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }
}

impl<C: Clock> RateLimiterBackend for RateLimiter<C> {
    fn allow(&self, recipient: &str, category: &str) -> Result<bool> {
        Ok(self.check_rate_limit(recipient, category))
    }
}

/// Drop every timestamp at or before `now - interval`.
///
/// `timestamps` is ascending, so the boundary is found by binary search. The
/// survivors are copied into a fresh allocation; shifting them down in place
/// would keep the old buffer alive at its historical size.
fn prune(timestamps: Vec<Instant>, now: Instant, interval: Duration) -> Vec<Instant> {
    let Some(cutoff) = now.checked_sub(interval) else {
        return timestamps;
    };

    let first_live = timestamps.partition_point(|t| *t <= cutoff);
    if first_live == 0 {
        return timestamps;
    }

    let live = &timestamps[first_live..];
    let mut pruned = Vec::with_capacity(live.len() + 1);
    pruned.extend_from_slice(live);
    pruned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::MockClock;
    use crate::ratelimit::rules::Rule;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    fn news_rules(limit: usize) -> RuleTable {
        [(
            "news".to_string(),
            Rule::new(limit, Duration::from_secs(60)).unwrap(),
        )]
        .into_iter()
        .collect()
    }

    fn create_test_limiter(limit: usize) -> (RateLimiter<MockClock>, MockClock) {
        let clock = MockClock::default();
        (RateLimiter::with_clock(news_rules(limit), clock.clone()), clock)
    }

    #[test]
    fn test_rate_limiter_creation() {
        let (limiter, _) = create_test_limiter(2);
        assert_eq!(limiter.tracked_keys(), 0);
        assert_eq!(limiter.lock_count(), 0);
        assert_eq!(limiter.rules().len(), 1);
    }

    #[test]
    fn test_limit_then_reset_after_interval() {
        let (limiter, clock) = create_test_limiter(2);

        assert!(limiter.check_rate_limit("user1", "news"));
        assert!(limiter.check_rate_limit("user1", "news"));
        assert!(!limiter.check_rate_limit("user1", "news"));

        clock.advance(Duration::from_secs(61));
        assert!(limiter.check_rate_limit("user1", "news"));
        assert_eq!(limiter.recorded("user1", "news"), Some(1));
    }

    #[test]
    fn test_unlimited_category_passthrough() {
        let (limiter, _) = create_test_limiter(2);

        for _ in 0..4 {
            assert!(limiter.check_rate_limit("user1", "push"));
        }
        assert_eq!(limiter.recorded("user1", "push"), None);
        assert_eq!(limiter.tracked_keys(), 0);
        assert_eq!(limiter.lock_count(), 0);
    }

    #[test]
    fn test_categories_are_independent() {
        let mut rules = std::collections::HashMap::new();
        rules.insert("news".to_string(), Rule::new(2, Duration::from_secs(60)).unwrap());
        rules.insert("status".to_string(), Rule::new(1, Duration::from_secs(60)).unwrap());
        let limiter = RateLimiter::with_clock(RuleTable::new(rules), MockClock::default());

        limiter.check_rate_limit("user1", "news");
        limiter.check_rate_limit("user1", "news");
        limiter.check_rate_limit("user1", "push");
        limiter.check_rate_limit("user1", "push");

        assert!(!limiter.check_rate_limit("user1", "news"));
        assert!(limiter.check_rate_limit("user1", "push"));
        assert!(limiter.check_rate_limit("user1", "status"));
    }

    #[test]
    fn test_recipients_are_independent() {
        let (limiter, _) = create_test_limiter(1);

        assert!(limiter.check_rate_limit("user1", "news"));
        assert!(!limiter.check_rate_limit("user1", "news"));
        assert!(limiter.check_rate_limit("user2", "news"));
    }

    #[test]
    fn test_prune_keeps_only_window() {
        let (limiter, clock) = create_test_limiter(2);

        assert!(limiter.check_rate_limit("user1", "news"));
        clock.advance(Duration::from_secs(59));
        assert!(limiter.check_rate_limit("user1", "news"));
        clock.advance(Duration::from_secs(10));
        assert!(limiter.check_rate_limit("user1", "news"));

        assert!(!limiter.check_rate_limit("user1", "news"));
        assert_eq!(limiter.recorded("user1", "news"), Some(2));
    }

    #[test]
    fn test_timestamp_exactly_one_interval_old_is_pruned() {
        let (limiter, clock) = create_test_limiter(1);

        assert!(limiter.check_rate_limit("user1", "news"));
        clock.advance(Duration::from_secs(60));
        assert!(limiter.check_rate_limit("user1", "news"));
        assert_eq!(limiter.recorded("user1", "news"), Some(1));
    }

    #[test]
    fn test_huge_interval_still_decides() {
        let yaml = "rules:\n  - category: news\n    limit: 2\n    interval_secs: 18446744073709551615\n";
        let limiter = RateLimiter::with_clock(RuleTable::from_yaml(yaml).unwrap(), MockClock::default());

        assert!(limiter.check_rate_limit("user1", "news"));
        assert!(limiter.check_rate_limit("user1", "news"));
        assert!(!limiter.check_rate_limit("user1", "news"));
        assert_eq!(limiter.recorded("user1", "news"), Some(2));
        assert_eq!(limiter.sweep_expired(), 0);
    }

    #[test]
    fn test_denial_refreshes_ttl() {
        let (limiter, clock) = create_test_limiter(1);

        assert!(limiter.check_rate_limit("user1", "news"));
        clock.advance(Duration::from_secs(50));
        assert!(!limiter.check_rate_limit("user1", "news"));

        // 70s after the admission but only 20s after the denial.
        clock.advance(Duration::from_secs(20));
        assert_eq!(limiter.sweep_expired(), 0);
        assert_eq!(limiter.tracked_keys(), 1);
        assert_eq!(limiter.lock_count(), 1);
    }

    #[test]
    fn test_denial_persists_pruning() {
        let (limiter, clock) = create_test_limiter(2);

        limiter.check_rate_limit("user1", "news");
        clock.advance(Duration::from_secs(30));
        limiter.check_rate_limit("user1", "news");
        clock.advance(Duration::from_secs(31));
        limiter.check_rate_limit("user1", "news");

        // The first stamp fell out of the window when the third call pruned.
        assert_eq!(limiter.recorded("user1", "news"), Some(2));
        assert!(!limiter.check_rate_limit("user1", "news"));
        assert_eq!(limiter.recorded("user1", "news"), Some(2));
    }

    #[test]
    fn test_idle_key_is_reclaimed() {
        let (limiter, clock) = create_test_limiter(2);

        limiter.check_rate_limit("user1", "news");
        assert_eq!(limiter.lock_count(), 1);

        clock.advance(Duration::from_secs(180));
        assert_eq!(limiter.sweep_expired(), 1);
        assert_eq!(limiter.tracked_keys(), 0);
        assert_eq!(limiter.lock_count(), 0);

        assert!(limiter.check_rate_limit("user1", "news"));
        assert_eq!(limiter.recorded("user1", "news"), Some(1));
        assert_eq!(limiter.lock_count(), 1);
    }

    #[test]
    fn test_sweep_keeps_active_keys() {
        let (limiter, clock) = create_test_limiter(2);

        limiter.check_rate_limit("idle", "news");
        clock.advance(Duration::from_secs(45));
        limiter.check_rate_limit("active", "news");
        clock.advance(Duration::from_secs(30));

        assert_eq!(limiter.sweep_expired(), 1);
        assert_eq!(limiter.recorded("idle", "news"), None);
        assert_eq!(limiter.recorded("active", "news"), Some(1));
        assert_eq!(limiter.lock_count(), 1);
    }

    #[test]
    fn test_concurrent_calls_admit_exactly_limit() {
        const CALLERS: usize = 256;
        const LIMIT: usize = 100;

        let (limiter, _) = create_test_limiter(LIMIT);
        let admitted = AtomicUsize::new(0);
        let barrier = Barrier::new(CALLERS);

        std::thread::scope(|s| {
            for _ in 0..CALLERS {
                s.spawn(|| {
                    barrier.wait();
                    if limiter.check_rate_limit("user1", "news") {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(admitted.load(Ordering::SeqCst), LIMIT);
        assert_eq!(limiter.recorded("user1", "news"), Some(LIMIT));
        assert_eq!(limiter.lock_count(), 1);
    }

    #[test]
    fn test_concurrent_calls_during_sweeps() {
        const CALLERS: usize = 64;

        let (limiter, clock) = create_test_limiter(CALLERS);
        limiter.check_rate_limit("user1", "news");
        clock.advance(Duration::from_secs(120));

        let admitted = AtomicUsize::new(0);
        std::thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..100 {
                    limiter.sweep_expired();
                }
            });
            for _ in 0..CALLERS {
                s.spawn(|| {
                    if limiter.check_rate_limit("user1", "news") {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        // The stale record may be swept or pruned, never both counted.
        assert_eq!(admitted.load(Ordering::SeqCst), CALLERS);
        assert_eq!(limiter.recorded("user1", "news"), Some(CALLERS));
        assert_eq!(limiter.lock_count(), 1);
    }

    #[test]
    fn test_backend_never_errors() {
        let (limiter, _) = create_test_limiter(1);
        let backend: &dyn RateLimiterBackend = &limiter;

        assert!(backend.allow("user1", "news").unwrap());
        assert!(!backend.allow("user1", "news").unwrap());
        assert!(backend.allow("user1", "push").unwrap());
    }

    #[test]
    fn test_prune_reallocates_retained_suffix() {
        let start = Instant::now();
        let timestamps: Vec<Instant> = (0..10).map(|i| start + Duration::from_secs(i)).collect();

        let pruned = prune(timestamps, start + Duration::from_secs(15), Duration::from_secs(10));
        assert_eq!(pruned.len(), 4);
        assert_eq!(pruned[0], start + Duration::from_secs(6));
        assert!(pruned.capacity() <= 5);
    }
}
