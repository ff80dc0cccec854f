// =============================================================================
// TTL-gated external snapshot fetch — security, market, holders
// =============================================================================
//
// Grounded on `market_data/candle_buffer.rs`'s staleness-check-before-refetch
// idiom and `signals/signal_decay.rs`'s elapsed/half-life freshness model,
// generalized to the three provider kinds the spec names. Security and
// liquidity/market-cap live directly on `TokenRecord` (Token Cache is the
// store of record); this module only decides whether a cached value is
// fresh enough to use as-is or needs a provider fetch, and performs that
// fetch through the capability-set adapter from design note 9 so a missing
// provider degrades the score instead of failing the job.
// =============================================================================

use crate::clock::Timestamp;
use crate::token_cache::TokenCache;
use crate::types::{MarketCap, Price, SecurityInfo, TokenId, Volume};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use super::ratelimit::ProviderRateLimiter;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub const SECURITY_TTL: Duration = Duration::from_secs(60 * 60);
pub const MARKET_TTL: Duration = Duration::from_secs(60);
pub const PRICE_TTL: Duration = Duration::from_secs(5 * 60);

/// A fresh read of market aggregates from an external provider. Liquidity
/// and market cap are folded back into the `TokenRecord`; volume has no
/// home on `TokenRecord` so it travels separately.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    pub liquidity: Option<f64>,
    pub market_cap: Option<MarketCap>,
    pub volume: Option<Volume>,
    pub price: Option<Price>,
}

/// Uniform fetch interface for the heterogeneous external providers
/// (security, market, holders). Per design note 9, a missing provider
/// degrades the affected sub-score rather than failing the analysis job.
pub trait SnapshotProvider: Send + Sync {
    fn fetch_security(&self, token_id: &TokenId) -> BoxFuture<'_, anyhow::Result<SecurityInfo>>;
    fn fetch_market(&self, token_id: &TokenId) -> BoxFuture<'_, anyhow::Result<MarketSnapshot>>;
}

/// Fetch deadline per outbound call (spec §5 default).
pub const FETCH_DEADLINE: Duration = Duration::from_secs(5);

/// Outcome of a TTL-gated fetch attempt: whether a value is available at
/// all, and whether it had to fall back to a stale/missing value.
pub struct FetchResult<T> {
    pub value: Option<T>,
    pub fresh: bool,
    pub reason: Option<&'static str>,
}

/// Resolves the security snapshot for `token_id`: returns the cached value
/// unchanged if fresh, otherwise attempts a rate-limited provider fetch and
/// folds the result back into the Token Cache. Falls back to the (possibly
/// stale, possibly absent) cached value when no provider is configured, the
/// limiter is exhausted, or the fetch errors/times out.
pub async fn resolve_security(
    token_id: &TokenId,
    cache: &TokenCache,
    now: Timestamp,
    provider: Option<&Arc<dyn SnapshotProvider>>,
    limiter: &ProviderRateLimiter,
) -> FetchResult<SecurityInfo> {
    if let Some(record) = cache.get(token_id) {
        if let Some(security) = &record.security {
            if security_is_fresh(&record, now) {
                return FetchResult { value: Some(security.clone()), fresh: true, reason: None };
            }
        }
    }

    let Some(provider) = provider else {
        let stale = cache.get(token_id).and_then(|r| r.security);
        return FetchResult { value: stale, fresh: false, reason: Some("degraded_inputs") };
    };

    if !limiter.acquire_timeout("security_snapshot", FETCH_DEADLINE).await {
        let stale = cache.get(token_id).and_then(|r| r.security);
        return FetchResult { value: stale, fresh: false, reason: Some("degraded_inputs") };
    }

    match tokio::time::timeout(FETCH_DEADLINE, provider.fetch_security(token_id)).await {
        Ok(Ok(security)) => {
            cache.get_or_create_and_update(token_id, now, |rec| {
                rec.security = Some(security.clone());
            });
            FetchResult { value: Some(security), fresh: true, reason: None }
        }
        _ => {
            let stale = cache.get(token_id).and_then(|r| r.security);
            FetchResult { value: stale, fresh: false, reason: Some("degraded_inputs") }
        }
    }
}

/// Resolves the market snapshot for `token_id`, following the same
/// TTL-gate-then-fetch-then-degrade pattern as `resolve_security`.
pub async fn resolve_market(
    token_id: &TokenId,
    cache: &TokenCache,
    now: Timestamp,
    provider: Option<&Arc<dyn SnapshotProvider>>,
    limiter: &ProviderRateLimiter,
    market_fresh_since: Option<Timestamp>,
) -> FetchResult<MarketSnapshot> {
    if is_fresh(market_fresh_since, now, MARKET_TTL) {
        if let Some(record) = cache.get(token_id) {
            return FetchResult {
                value: Some(MarketSnapshot {
                    liquidity: record.liquidity,
                    market_cap: record.market_cap,
                    volume: None,
                    price: record.last_price,
                }),
                fresh: true,
                reason: None,
            };
        }
    }

    let Some(provider) = provider else {
        return degraded_market(cache, token_id);
    };

    if !limiter.acquire_timeout("market_snapshot", FETCH_DEADLINE).await {
        return degraded_market(cache, token_id);
    }

    match tokio::time::timeout(FETCH_DEADLINE, provider.fetch_market(token_id)).await {
        Ok(Ok(snapshot)) => {
            cache.get_or_create_and_update(token_id, now, |rec| {
                if snapshot.liquidity.is_some() {
                    rec.liquidity = snapshot.liquidity;
                }
                if snapshot.market_cap.is_some() {
                    rec.market_cap = snapshot.market_cap;
                }
            });
            FetchResult { value: Some(snapshot), fresh: true, reason: None }
        }
        _ => degraded_market(cache, token_id),
    }
}

fn degraded_market(cache: &TokenCache, token_id: &TokenId) -> FetchResult<MarketSnapshot> {
    let stale = cache.get(token_id).map(|r| MarketSnapshot {
        liquidity: r.liquidity,
        market_cap: r.market_cap,
        volume: None,
        price: r.last_price,
    });
    FetchResult { value: stale, fresh: false, reason: Some("degraded_inputs") }
}

fn is_fresh(since: Option<Timestamp>, now: Timestamp, ttl: Duration) -> bool {
    match since {
        Some(ts) => (now.mono_ms.saturating_sub(ts.mono_ms)) < ttl.as_millis() as u64,
        None => false,
    }
}

/// `TokenRecord` doesn't carry a dedicated "security last refreshed" stamp;
/// we approximate freshness with `last_price_ts`, since both are refreshed
/// together whenever a NewPair/PriceTick drives a cache update. A record
/// with a completely absent timestamp is always treated as stale.
fn security_is_fresh(record: &crate::types::TokenRecord, now: Timestamp) -> bool {
    is_fresh(record.last_price_ts, now, SECURITY_TTL)
}
