// =============================================================================
// Content-addressed dedup cache — bounded LRU over (feed, topic, stableFields)
// =============================================================================

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(30);
pub const DEFAULT_CAPACITY: usize = 10_000;

/// A content key computed from the fields of a message that determine its
/// identity for dedup purposes (not necessarily every field — e.g. a
/// whale-trade key uses its signature, a price tick key uses token+price+ts
/// bucket).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentKey(u64);

impl ContentKey {
    pub fn compute(feed: &str, topic: &str, stable_fields: &[&str]) -> Self {
        let mut hasher = DefaultHasher::new();
        feed.hash(&mut hasher);
        topic.hash(&mut hasher);
        for f in stable_fields {
            f.hash(&mut hasher);
        }
        Self(hasher.finish())
    }
}

pub struct DedupCache {
    seen: DashMap<ContentKey, Instant>,
    order: Mutex<VecDeque<ContentKey>>,
    window: Duration,
    capacity: usize,
    duplicate_count: std::sync::atomic::AtomicU64,
}

impl DedupCache {
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            seen: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            window,
            capacity,
            duplicate_count: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Returns `true` if `key` is a fresh (non-duplicate) message within the
    /// dedup window; records it as seen either way advances the LRU order.
    pub fn check_and_record(&self, key: ContentKey) -> bool {
        let now = Instant::now();
        if let Some(seen_at) = self.seen.get(&key) {
            if now.duration_since(*seen_at) <= self.window {
                self.duplicate_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                return false;
            }
        }
        self.seen.insert(key, now);
        let mut order = self.order.lock();
        order.push_back(key);
        if order.len() > self.capacity {
            if let Some(evicted) = order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }

    pub fn duplicate_count(&self) -> u64 {
        self.duplicate_count.load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_within_window_is_suppressed() {
        let cache = DedupCache::new(Duration::from_secs(30), 10);
        let key = ContentKey::compute("new_pair", "new_pairs", &["T1"]);
        assert!(cache.check_and_record(key));
        assert!(!cache.check_and_record(key));
        assert_eq!(cache.duplicate_count(), 1);
    }

    #[test]
    fn bounded_capacity_evicts_oldest() {
        let cache = DedupCache::new(Duration::from_secs(30), 2);
        let k1 = ContentKey::compute("f", "t", &["1"]);
        let k2 = ContentKey::compute("f", "t", &["2"]);
        let k3 = ContentKey::compute("f", "t", &["3"]);
        assert!(cache.check_and_record(k1));
        assert!(cache.check_and_record(k2));
        assert!(cache.check_and_record(k3));
        // k1 was evicted, so it should be treated as fresh again.
        assert!(cache.check_and_record(k1));
    }
}
