//! In-memory response cache with time-to-live expiry.
//!
//! Entries are checked for freshness on read and never evicted implicitly:
//! an expired entry stays in the map (usable as a stale fallback) until
//! [`ResponseCache::purge_expired`] or [`ResponseCache::clear`] removes it.
//!
//! Timestamps come from the tokio clock, so paused-time tests can step
//! across the TTL boundary deterministically.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Default freshness window for cached responses (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// A stored response together with the instant it was written.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub payload: V,
    pub stored_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.stored_at) < ttl
    }
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// All stored entries, fresh or not.
    pub entry_count: usize,
    pub fresh_entries: usize,
    pub stale_entries: usize,
}

/// Thread-safe TTL cache keyed by string.
///
/// Values are cloned out on read; store `Arc`-backed payloads to keep
/// that cheap.
#[derive(Debug)]
pub struct ResponseCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    ttl: Duration,
}

impl<V: Clone> Default for ResponseCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    // A panic while holding the lock cannot leave the map half-written
    // (every mutation is a single HashMap call), so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the payload for `key` if it was stored less than one TTL ago.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let entries = self.lock();
        let entry = entries.get(key)?;
        if entry.is_fresh(now, self.ttl) {
            Some(entry.payload.clone())
        } else {
            tracing::trace!(key, "cache entry expired");
            None
        }
    }

    /// Returns the payload for `key` regardless of its age.
    ///
    /// Only meant as a fallback when the network is unavailable.
    pub fn get_stale(&self, key: &str) -> Option<CacheEntry<V>> {
        self.lock().get(key).cloned()
    }

    /// Stores `payload` under `key`, replacing any previous entry.
    pub fn set(&self, key: impl Into<String>, payload: V) {
        let entry = CacheEntry {
            payload,
            stored_at: Instant::now(),
        };
        self.lock().insert(key.into(), entry);
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let mut entries = self.lock();
        let removed = entries.len();
        entries.clear();
        tracing::debug!(removed, "response cache cleared");
    }

    /// Removes entries older than the TTL. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now, self.ttl));
        before - entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.lock();
        let fresh_entries = entries
            .values()
            .filter(|entry| entry.is_fresh(now, self.ttl))
            .count();
        CacheStats {
            entry_count: entries.len(),
            fresh_entries,
            stale_entries: entries.len() - fresh_entries,
        }
    }
}
