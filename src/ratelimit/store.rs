//! Per-key timestamp storage with sliding TTL and coupled lock registry.
//!
//! Every key owns two things: its timestamp record and the mutex that
//! serializes work on it. Both live in sharded [`DashMap`]s and are only ever
//! evicted together, through [`TimestampStore::sweep_expired`].

use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::key::RateLimitKey;

type KeyLock = Arc<Mutex<()>>;

/// Exclusive access to one key, held for a whole prune/check/append cycle.
pub type KeyGuard = ArcMutexGuard<RawMutex, ()>;

#[derive(Debug)]
struct Record {
    /// Admission instants, ascending
    timestamps: Vec<Instant>,
    /// Last write plus the rule interval; `None` if that is past the
    /// representable range of `Instant`
    expires_at: Option<Instant>,
}

impl Record {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }
}

/// Sharded store of timestamp records and their per-key locks.
#[derive(Debug, Default)]
pub struct TimestampStore {
    records: DashMap<RateLimitKey, Record>,
    locks: DashMap<RateLimitKey, KeyLock>,
}

impl TimestampStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, creating it on first use.
    ///
    /// Concurrent first callers converge on one lock through the map entry.
    /// A sweep may unregister a lock between a caller fetching it and
    /// acquiring it, so the guard is only returned once the lock is confirmed
    /// to still be the registered one.
    pub fn lock(&self, key: &RateLimitKey) -> KeyGuard {
        loop {
            let existing = self.locks.get(key).map(|entry| entry.value().clone());
            let lock = match existing {
                Some(lock) => lock,
                None => self
                    .locks
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .value()
                    .clone(),
            };

            let guard = lock.lock_arc();
            let registered = self
                .locks
                .get(key)
                .is_some_and(|current| Arc::ptr_eq(current.value(), &lock));
            if registered {
                return guard;
            }
        }
    }

    /// Take the record for `key` out of the store.
    ///
    /// Absent and expired records both come back empty. Must be called while
    /// holding the key's guard, and paired with [`put`](Self::put).
    pub fn take(&self, key: &RateLimitKey, now: Instant) -> Vec<Instant> {
        match self.records.remove(key) {
            Some((_, record)) if !record.is_expired(now) => record.timestamps,
            _ => Vec::new(),
        }
    }

    /// Store `timestamps` for `key`, expiring `ttl` after `now`.
    ///
    /// A `ttl` too large to add to `now` never expires. Must be called while
    /// holding the key's guard.
    pub fn put(&self, key: RateLimitKey, timestamps: Vec<Instant>, ttl: Duration, now: Instant) {
        self.records.insert(
            key,
            Record {
                timestamps,
                expires_at: now.checked_add(ttl),
            },
        );
    }

    /// Length of the live record for `key`, if there is one.
    pub fn record_len(&self, key: &RateLimitKey, now: Instant) -> Option<usize> {
        self.records
            .get(key)
            .filter(|record| !record.is_expired(now))
            .map(|record| record.timestamps.len())
    }

    /// Number of stored records, expired ones included until swept.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Number of registered key locks.
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    /// Reclaim every idle key and return how many were removed.
    ///
    /// A key is idle when its record has expired, or when its lock has no
    /// record at all. Keys whose lock is currently held are skipped; they
    /// are about to be rewritten anyway.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        // Collect first: evicting while iterating would re-enter a shard lock.
        let mut candidates: Vec<RateLimitKey> = self
            .records
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();
        let lock_keys: Vec<RateLimitKey> =
            self.locks.iter().map(|entry| entry.key().clone()).collect();
        candidates.extend(
            lock_keys
                .into_iter()
                .filter(|key| !self.records.contains_key(key)),
        );

        candidates
            .iter()
            .filter(|key| self.try_evict(key, now))
            .count()
    }

    fn try_evict(&self, key: &RateLimitKey, now: Instant) -> bool {
        // Records are only written under their key's lock, so one is always registered.
        let Some(lock) = self.locks.get(key).map(|entry| entry.value().clone()) else {
            return false;
        };

        let Some(_guard) = lock.try_lock() else {
            return false;
        };

        // Nobody can write this key while we hold its lock.
        let live = self
            .records
            .get(key)
            .is_some_and(|record| !record.is_expired(now));
        if live {
            return false;
        }

        self.evict(key, &lock);
        true
    }

    /// Sweep removal: record and lock go together.
    fn evict(&self, key: &RateLimitKey, lock: &KeyLock) {
        self.records.remove(key);
        self.locks
            .remove_if(key, |_, registered| Arc::ptr_eq(registered, lock));
    }
}
