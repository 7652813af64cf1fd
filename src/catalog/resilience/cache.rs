//! In-memory cache with per-entry time-to-live.
//!
//! Entries expire lazily: a read past `stored_at + ttl` deletes the entry
//! and reports a miss. Writes also sweep out whatever has expired, so keys
//! that are never read again don't pile up. Reads never extend an entry's
//! lifetime.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Default TTLs per logical operation.
pub mod ttl {
    use std::time::Duration;

    /// Fused multi-provider search
    pub const MERGED_SEARCH: Duration = Duration::from_secs(180);
    /// Single-provider detailed search
    pub const PROVIDER_SEARCH: Duration = Duration::from_secs(240);
    /// Recommendation bundles
    pub const RECOMMENDATIONS: Duration = Duration::from_secs(300);
    /// Generic lookups
    pub const LOOKUP: Duration = Duration::from_secs(900);
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    /// A TTL too large to represent as an instant never expires.
    fn is_expired(&self, now: Instant) -> bool {
        self.stored_at
            .checked_add(self.ttl)
            .is_some_and(|expires_at| now > expires_at)
    }
}

/// Key/value store with per-entry expiry.
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Get a live entry, evicting it if it has expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Store `value` under `key` for `ttl`, replacing any previous entry.
    ///
    /// Expired entries are dropped on the way in.
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        Self::retain_live(&mut entries, now);
        entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: now,
                ttl,
            },
        );
    }

    /// Remove one entry.
    pub fn invalidate(&self, key: &K) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Drop all expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        Self::retain_live(&mut self.entries.lock(), Instant::now())
    }

    fn retain_live(entries: &mut HashMap<K, CacheEntry<V>>, now: Instant) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_get_before_expiry() {
        let cache = TtlCache::new();
        cache.set("k", "v", Duration::from_millis(1000));
        assert_eq!(cache.get(&"k"), Some("v"));

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert_eq!(cache.get(&"k"), Some("v"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_after_expiry_is_miss_and_evicts() {
        let cache = TtlCache::new();
        cache.set("k", "v", Duration::from_millis(1000));

        tokio::time::advance(Duration::from_millis(1001)).await;
        assert_eq!(cache.get(&"k"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_do_not_extend_lifetime() {
        let cache = TtlCache::new();
        cache.set("k", 1, Duration::from_millis(1000));

        tokio::time::advance(Duration::from_millis(900)).await;
        assert_eq!(cache.get(&"k"), Some(1));

        tokio::time::advance(Duration::from_millis(200)).await;
        assert_eq!(cache.get(&"k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_replaces_entry_and_restarts_ttl() {
        let cache = TtlCache::new();
        cache.set("k", 1, Duration::from_millis(100));
        tokio::time::advance(Duration::from_millis(90)).await;
        cache.set("k", 2, Duration::from_millis(100));
        tokio::time::advance(Duration::from_millis(90)).await;
        assert_eq!(cache.get(&"k"), Some(2));
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = TtlCache::new();
        cache.set("a", 1, Duration::from_secs(60));
        cache.set("b", 2, Duration::from_secs(60));

        assert!(cache.invalidate(&"a"));
        assert!(!cache.invalidate(&"a"));
        assert_eq!(cache.get(&"b"), Some(2));

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = TtlCache::new();
        cache.set("short", 1, Duration::from_millis(10));
        cache.set("long", 2, Duration::from_secs(10));

        tokio::time::advance(Duration::from_millis(20)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_sweeps_expired_entries() {
        let cache = TtlCache::new();
        cache.set("old", 1, Duration::from_millis(10));
        cache.set("kept", 2, Duration::from_secs(10));

        tokio::time::advance(Duration::from_millis(20)).await;
        cache.set("new", 3, Duration::from_secs(10));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"kept"), Some(2));
        assert_eq!(cache.get(&"new"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_ttl_never_expires() {
        let cache = TtlCache::new();
        cache.set("k", 1, Duration::MAX);
        cache.set("j", 2, Duration::from_millis(u64::MAX));

        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert_eq!(cache.get(&"k"), Some(1));
        assert_eq!(cache.get(&"j"), Some(2));
        assert_eq!(cache.purge_expired(), 0);
    }
}
