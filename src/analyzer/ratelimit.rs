// =============================================================================
// Process-wide rate limiter — token bucket per provider
// =============================================================================
//
// Grounded on `binance/rate_limit.rs::RateLimitTracker`'s atomic-counter +
// pre-flight-check idiom, generalized from Binance-header-specific weight
// counters into a real token bucket: each provider gets its own bucket that
// refills on a timer and is drained by `try_acquire`/`acquire_timeout`.
// =============================================================================

use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

struct Bucket {
    tokens: AtomicU32,
    capacity: u32,
}

impl Bucket {
    fn new(capacity: u32) -> Self {
        Self { tokens: AtomicU32::new(capacity), capacity }
    }

    fn try_take(&self) -> bool {
        loop {
            let current = self.tokens.load(Ordering::Acquire);
            if current == 0 {
                return false;
            }
            if self
                .tokens
                .compare_exchange(current, current - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    fn refill(&self) {
        self.tokens.store(self.capacity, Ordering::Release);
    }
}

/// A process-wide rate limiter with one independently-refilling bucket per
/// named provider (e.g. "security_snapshot", "market_snapshot").
pub struct ProviderRateLimiter {
    buckets: DashMap<String, Arc<Bucket>>,
    default_capacity: u32,
    refill_interval: Duration,
}

impl ProviderRateLimiter {
    pub fn new(default_capacity: u32, refill_interval: Duration) -> Self {
        Self { buckets: DashMap::new(), default_capacity, refill_interval }
    }

    fn bucket_for(&self, provider: &str) -> Arc<Bucket> {
        self.buckets
            .entry(provider.to_string())
            .or_insert_with(|| Arc::new(Bucket::new(self.default_capacity)))
            .clone()
    }

    /// Attempts to acquire a permit immediately, without waiting.
    pub fn try_acquire(&self, provider: &str) -> bool {
        let ok = self.bucket_for(provider).try_take();
        if !ok {
            warn!(provider, "rate limiter exhausted, degrading inputs");
        }
        ok
    }

    /// Attempts to acquire a permit, retrying until `timeout` elapses.
    pub async fn acquire_timeout(&self, provider: &str, timeout: Duration) -> bool {
        let bucket = self.bucket_for(provider);
        let deadline = Instant::now() + timeout;
        loop {
            if bucket.try_take() {
                return true;
            }
            if Instant::now() >= deadline {
                warn!(provider, "rate limiter acquire timed out");
                return false;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    /// Spawns the background refill loop. One task serves every provider's
    /// bucket; each tick simply tops every bucket back up to capacity,
    /// matching a fixed-window token bucket rather than a leaky one.
    pub fn spawn_refill_loop(self: &Arc<Self>) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.refill_interval);
            loop {
                interval.tick().await;
                for entry in this.buckets.iter() {
                    entry.value().refill();
                }
            }
        });
    }
}
