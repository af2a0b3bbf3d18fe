//! Replay defense: a time-bounded cache of recently seen request salts.
//!
//! A concurrent map keyed on salt bytes, paired with a `retain`-based
//! eviction sweep driven by an `i64` millisecond epoch timestamp so the
//! cutoff arithmetic is plain `now_ms - WINDOW_MS`.

use dashmap::DashMap;

/// Replay window: must exceed the ±30s timestamp skew tolerance so that
/// any replay whose timestamp is still fresh enough to pass the
/// freshness check is also still present in this cache.
pub const WINDOW_MS: i64 = 60_000;

/// Time-bounded set of seen request salts.
pub struct SaltCache {
    seen: DashMap<Box<[u8]>, i64>,
}

impl SaltCache {
    pub fn new() -> Self {
        Self {
            seen: DashMap::new(),
        }
    }

    /// Evict every entry first observed before `now_ms - WINDOW_MS`.
    pub fn evict_older_than(&self, now_ms: i64) {
        let cutoff = now_ms - WINDOW_MS;
        self.seen.retain(|_salt, first_seen| *first_seen >= cutoff);
    }

    /// Attempt to record `salt` as seen at `now_ms`. Returns `true` iff
    /// the salt was not already present (i.e. the caller may proceed).
    pub fn try_add(&self, salt: &[u8], now_ms: i64) -> bool {
        match self.seen.entry(salt.into()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(now_ms);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for SaltCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_insert_succeeds_second_is_rejected() {
        let cache = SaltCache::new();
        assert!(cache.try_add(b"salt-a", 1_000));
        assert!(!cache.try_add(b"salt-a", 1_000));
    }

    #[test]
    fn distinct_salts_do_not_collide() {
        let cache = SaltCache::new();
        assert!(cache.try_add(b"salt-a", 1_000));
        assert!(cache.try_add(b"salt-b", 1_000));
    }

    #[test]
    fn eviction_allows_reuse_after_window_passes() {
        let cache = SaltCache::new();
        assert!(cache.try_add(b"salt-a", 0));
        cache.evict_older_than(WINDOW_MS + 1);
        assert!(cache.try_add(b"salt-a", WINDOW_MS + 1));
    }

    #[test]
    fn eviction_keeps_salts_still_within_the_window() {
        let cache = SaltCache::new();
        assert!(cache.try_add(b"salt-a", 30_000));
        cache.evict_older_than(40_000);
        assert!(!cache.try_add(b"salt-a", 40_000));
    }

    #[test]
    fn eviction_cutoff_is_subtractive_not_additive() {
        // cutoff must be `now - WINDOW_MS`, not `now + WINDOW_MS`, or every
        // entry is evicted immediately.
        let cache = SaltCache::new();
        cache.try_add(b"salt-a", 0);
        cache.evict_older_than(1);
        assert_eq!(cache.len(), 1);
    }
}
