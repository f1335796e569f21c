// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Sliding-window admission guard in front of booking creation.
//!
//! A cheap, best-effort shed, independent of the engine's transactional
//! guarantees. Policy sits in [`CreationRateLimiter`]; timestamp storage
//! sits behind [`CounterStore`] so a multi-instance deployment can swap the
//! in-process map for a shared external counter.

use crate::error::BookingError;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default policy: at most 10 accepted attempts per identity per 60 seconds.
pub const CREATE_WINDOW: Duration = Duration::from_secs(60);
pub const CREATE_CAP: usize = 10;

/// One full-map sweep per this many admission checks.
const SWEEP_EVERY: u64 = 256;

/// Timestamp storage for one admission decision per call.
pub trait CounterStore: Send + Sync {
    /// Prunes entries older than `window` for `key`, then either records
    /// `now` and admits, or rejects at the cap. A rejected attempt must not
    /// consume a slot.
    fn admit(&self, key: &str, now: Instant, window: Duration, cap: usize) -> bool;
}

/// In-process counter store for single-instance deployments.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    hits: DashMap<String, Vec<Instant>>,
    attempts: AtomicU64,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of client identities currently tracked.
    pub fn tracked_identities(&self) -> usize {
        self.hits.len()
    }
}

impl CounterStore for InMemoryCounterStore {
    fn admit(&self, key: &str, now: Instant, window: Duration, cap: usize) -> bool {
        // A one-off client leaves its key behind forever; every SWEEP_EVERY
        // attempts, drop identities whose hits have all left the window.
        // The sweep runs before the entry guard below is taken.
        if self.attempts.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == 0 {
            self.hits.retain(|_, bucket| {
                bucket.retain(|ts| now.saturating_duration_since(*ts) <= window);
                !bucket.is_empty()
            });
        }

        // The entry guard keeps prune-check-record atomic per key.
        let mut bucket = self.hits.entry(key.to_string()).or_default();
        bucket.retain(|ts| now.saturating_duration_since(*ts) <= window);
        if bucket.len() >= cap {
            false
        } else {
            bucket.push(now);
            true
        }
    }
}

/// Sliding-window limiter keyed by client identity.
pub struct CreationRateLimiter<S = InMemoryCounterStore> {
    store: S,
    window: Duration,
    cap: usize,
}

impl CreationRateLimiter<InMemoryCounterStore> {
    /// Limiter with the default policy over an in-process store.
    pub fn new() -> Self {
        Self::with_store(InMemoryCounterStore::new(), CREATE_WINDOW, CREATE_CAP)
    }
}

impl Default for CreationRateLimiter<InMemoryCounterStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: CounterStore> CreationRateLimiter<S> {
    pub fn with_store(store: S, window: Duration, cap: usize) -> Self {
        Self { store, window, cap }
    }

    /// Admission check for one creation attempt.
    pub fn check(&self, key: &str) -> Result<(), BookingError> {
        self.check_at(key, Instant::now())
    }

    /// Same as [`check`](Self::check) with an injected clock, for tests.
    pub fn check_at(&self, key: &str, now: Instant) -> Result<(), BookingError> {
        if self.store.admit(key, now, self.window, self.cap) {
            Ok(())
        } else {
            Err(BookingError::RateLimited)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_cap_then_rejects() {
        let limiter = CreationRateLimiter::new();
        let now = Instant::now();
        for _ in 0..CREATE_CAP {
            assert_eq!(limiter.check_at("10.0.0.1", now), Ok(()));
        }
        // The 11th request in the window is shed.
        assert_eq!(
            limiter.check_at("10.0.0.1", now),
            Err(BookingError::RateLimited)
        );
    }

    #[test]
    fn rejected_attempt_consumes_no_slot() {
        let limiter =
            CreationRateLimiter::with_store(InMemoryCounterStore::new(), CREATE_WINDOW, 2);
        let now = Instant::now();
        assert!(limiter.check_at("k", now).is_ok());
        assert!(limiter.check_at("k", now).is_ok());
        for _ in 0..5 {
            assert_eq!(limiter.check_at("k", now), Err(BookingError::RateLimited));
        }
        // If rejections consumed slots the window would never drain; after
        // the window elapses the key must be admitted again.
        let later = now + CREATE_WINDOW + Duration::from_secs(1);
        assert!(limiter.check_at("k", later).is_ok());
    }

    #[test]
    fn window_elapse_readmits() {
        let limiter =
            CreationRateLimiter::with_store(InMemoryCounterStore::new(), Duration::from_secs(60), 1);
        let now = Instant::now();
        assert!(limiter.check_at("k", now).is_ok());
        assert_eq!(limiter.check_at("k", now), Err(BookingError::RateLimited));
        assert!(limiter.check_at("k", now + Duration::from_secs(61)).is_ok());
    }

    #[test]
    fn stale_identities_are_evicted() {
        let store = InMemoryCounterStore::new();
        let now = Instant::now();
        for i in 0..10 {
            assert!(store.admit(&format!("10.0.0.{i}"), now, CREATE_WINDOW, CREATE_CAP));
        }
        assert_eq!(store.tracked_identities(), 10);

        // Once their windows elapse, the next sweep drops the old keys
        // instead of letting the map grow by one entry per client forever.
        let later = now + CREATE_WINDOW + Duration::from_secs(1);
        for _ in 0..SWEEP_EVERY {
            store.admit("10.1.0.1", later, CREATE_WINDOW, CREATE_CAP);
        }
        assert_eq!(store.tracked_identities(), 1);
    }

    #[test]
    fn identities_are_independent() {
        let limiter =
            CreationRateLimiter::with_store(InMemoryCounterStore::new(), CREATE_WINDOW, 1);
        let now = Instant::now();
        assert!(limiter.check_at("a", now).is_ok());
        assert!(limiter.check_at("b", now).is_ok());
        assert_eq!(limiter.check_at("a", now), Err(BookingError::RateLimited));
    }
}
