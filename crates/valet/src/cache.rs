// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pulse::Clock;
use serde_json::Value;

use crate::key::CacheKey;

/// How much each recorded access is worth relative to recency, in milliseconds.
///
/// The eviction score is `last_accessed_offset_ms + access_count * ACCESS_WEIGHT_MS`;
/// one access buys an entry a one-second head start over an otherwise equally
/// recent neighbor.
const ACCESS_WEIGHT_MS: u128 = 1000;

/// Fraction of capacity the cache is trimmed down to when it overflows.
const EVICTION_FILL: (usize, usize) = (8, 10);

/// Memoizes results of cacheable operations with per-entry TTL and scored eviction.
///
/// Expiry is enforced lazily on read and eagerly by the adapter's periodic sweep.
/// When an insert pushes the cache past its capacity, entries are evicted lowest
/// score first until the cache is back at ~80% of capacity, which removes the least
/// recently *and* least frequently used entries (approximate LRU + LFU).
///
/// The cache is exclusively owned by one adapter; values are cloned out on hits and
/// never aliased.
#[derive(Debug)]
pub(crate) struct OperationCache {
    clock: Clock,
    /// Anchor for converting access instants into comparable score offsets.
    origin: Instant,
    inner: Mutex<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<CacheKey, CacheEntry>,
}

#[derive(Debug)]
struct CacheEntry {
    value: Value,
    created_at: Instant,
    ttl: Duration,
    last_accessed_at: Instant,
    access_count: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }
}

impl OperationCache {
    pub(crate) fn new(clock: &Clock) -> Self {
        Self {
            clock: clock.clone(),
            origin: clock.instant(),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Looks the key up, enforcing TTL.
    ///
    /// A hit refreshes the entry's `last_accessed_at` and bumps its `access_count`,
    /// both of which feed the eviction score. An expired entry is removed on sight.
    pub(crate) fn get(&self, key: &CacheKey) -> Option<Value> {
        let now = self.clock.instant();
        let mut inner = self.inner.lock();

        match inner.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.last_accessed_at = now;
                entry.access_count += 1;
                Some(entry.value.clone())
            }
            Some(_) => {
                let _ = inner.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Inserts a value under `key`, evicting down to ~80% of `max_entries` when the
    /// insert overflows capacity.
    pub(crate) fn insert(&self, key: CacheKey, value: Value, ttl: Duration, max_entries: usize) {
        let now = self.clock.instant();
        let mut inner = self.inner.lock();

        inner.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                ttl,
                last_accessed_at: now,
                access_count: 0,
            },
        );

        if inner.entries.len() > max_entries {
            let target = (max_entries * EVICTION_FILL.0 / EVICTION_FILL.1).max(1);
            self.evict_to(&mut inner, target);
        }
    }

    /// Removes expired entries; returns how many were dropped.
    pub(crate) fn sweep(&self) -> usize {
        let now = self.clock.instant();
        let mut inner = self.inner.lock();

        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        before - inner.entries.len()
    }

    pub(crate) fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    fn evict_to(&self, inner: &mut CacheInner, target: usize) {
        let mut scored: Vec<(CacheKey, u128)> = inner
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), self.score(entry)))
            .collect();

        // Lowest score first: least recently and least frequently used.
        scored.sort_by_key(|(_, score)| *score);

        for (key, _) in scored {
            if inner.entries.len() <= target {
                break;
            }
            inner.entries.remove(&key);

            tracing::debug!(key = %key, "evicted cache entry");
        }
    }

    fn score(&self, entry: &CacheEntry) -> u128 {
        let recency = entry.last_accessed_at.saturating_duration_since(self.origin).as_millis();
        recency + u128::from(entry.access_count) * ACCESS_WEIGHT_MS
    }
}

#[cfg(test)]
mod tests {
    use pulse::TimeControl;
    use serde_json::json;

    use super::*;

    const TTL: Duration = Duration::from_millis(100);

    fn key(n: u32) -> CacheKey {
        CacheKey::compute("t", "op", &json!({ "n": n }))
    }

    #[test]
    fn get_within_ttl_hits() {
        let control = TimeControl::new();
        let cache = OperationCache::new(&control.to_clock());

        cache.insert(key(1), json!(1), TTL, 10);
        control.advance(Duration::from_millis(50));

        assert_eq!(cache.get(&key(1)), Some(json!(1)));
    }

    #[test]
    fn get_after_ttl_misses_and_evicts() {
        let control = TimeControl::new();
        let cache = OperationCache::new(&control.to_clock());

        cache.insert(key(1), json!(1), TTL, 10);
        control.advance(Duration::from_millis(150));

        assert_eq!(cache.get(&key(1)), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn ttl_boundary_is_inclusive() {
        let control = TimeControl::new();
        let cache = OperationCache::new(&control.to_clock());

        cache.insert(key(1), json!(1), TTL, 10);
        control.advance(TTL);

        // now - created_at == ttl is still fresh; only strictly older entries expire.
        assert_eq!(cache.get(&key(1)), Some(json!(1)));
    }

    #[test]
    fn sweep_removes_only_expired() {
        let control = TimeControl::new();
        let cache = OperationCache::new(&control.to_clock());

        cache.insert(key(1), json!(1), TTL, 10);
        cache.insert(key(2), json!(2), Duration::from_secs(60), 10);
        control.advance(Duration::from_millis(150));

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key(2)), Some(json!(2)));
    }

    #[test]
    fn overflow_evicts_to_eighty_percent() {
        let control = TimeControl::new();
        let cache = OperationCache::new(&control.to_clock());

        for n in 0..11 {
            cache.insert(key(n), json!(n), Duration::from_secs(60), 10);
            control.advance(Duration::from_millis(1));
        }

        // 11 entries against a capacity of 10 trims down to 8.
        assert_eq!(cache.len(), 8);
    }

    #[test]
    fn eviction_prefers_cold_entries() {
        let control = TimeControl::new();
        let cache = OperationCache::new(&control.to_clock());

        for n in 0..10 {
            cache.insert(key(n), json!(n), Duration::from_secs(60), 10);
            control.advance(Duration::from_millis(1));
        }

        // Touch the oldest entry repeatedly; its access count should save it.
        for _ in 0..5 {
            let _ = cache.get(&key(0));
        }

        cache.insert(key(99), json!(99), Duration::from_secs(60), 10);

        assert!(cache.get(&key(0)).is_some(), "hot entry survived eviction");
        assert!(cache.get(&key(1)).is_none(), "cold entry was evicted");
    }

    #[test]
    fn clear_empties_the_cache() {
        let control = TimeControl::new();
        let cache = OperationCache::new(&control.to_clock());

        cache.insert(key(1), json!(1), TTL, 10);
        cache.clear();

        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn insert_overwrites_existing_key() {
        let control = TimeControl::new();
        let cache = OperationCache::new(&control.to_clock());

        cache.insert(key(1), json!(1), TTL, 10);
        cache.insert(key(1), json!(2), TTL, 10);

        assert_eq!(cache.get(&key(1)), Some(json!(2)));
        assert_eq!(cache.len(), 1);
    }
}
