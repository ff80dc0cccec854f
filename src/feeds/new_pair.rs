// =============================================================================
// NewPair feed normalization
// =============================================================================

use crate::clock::{Clock, SeqSource};
use crate::types::{Event, EventKind, EventPayload, FeedKind, RejectReason, TokenId};
use serde_json::Value;

pub fn normalize(raw: &Value, clock: &Clock, seq_source: &SeqSource) -> Result<Event, RejectReason> {
    let token_id_raw = raw
        .get("tokenId")
        .or_else(|| raw.get("token_id"))
        .or_else(|| raw.get("mint"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| RejectReason::new("missing_token_id"))?;
    let token_id = TokenId::new(token_id_raw).ok_or_else(|| RejectReason::new("missing_token_id"))?;

    let liquidity = raw.get("liquidity").and_then(|v| v.as_f64());
    let market_cap = raw.get("marketCap").or_else(|| raw.get("market_cap")).and_then(|v| v.as_f64());

    if liquidity.is_none() && market_cap.is_none() {
        return Err(RejectReason::new("new_pair_missing_liquidity_or_market_cap"));
    }

    for (value, field) in [(liquidity, "liquidity"), (market_cap, "market_cap")] {
        if let Some(v) = value {
            super::require_nonneg(v, field)?;
        }
    }

    let wall_ts = raw.get("wallTs").and_then(|v| v.as_i64()).unwrap_or_else(|| clock.wall_ms());

    Ok(Event {
        seq: seq_source.next(),
        wall_ts,
        mono_ts: clock.mono_ms(),
        feed: FeedKind::NewPair,
        kind: EventKind::NewPair,
        token_id: Some(token_id),
        payload: EventPayload::NewPair { liquidity, market_cap },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_with_liquidity_only() {
        let clock = Clock::new();
        let seq = SeqSource::new();
        let raw = serde_json::json!({"tokenId": "T1", "liquidity": 25000});
        let event = normalize(&raw, &clock, &seq).unwrap();
        assert_eq!(event.token_id.unwrap().as_str(), "T1");
    }

    #[test]
    fn rejects_without_liquidity_or_market_cap() {
        let clock = Clock::new();
        let seq = SeqSource::new();
        let raw = serde_json::json!({"tokenId": "T1"});
        let err = normalize(&raw, &clock, &seq).unwrap_err();
        assert_eq!(err.0, "new_pair_missing_liquidity_or_market_cap");
    }

    #[test]
    fn rejects_missing_token_id() {
        let clock = Clock::new();
        let seq = SeqSource::new();
        let raw = serde_json::json!({"liquidity": 1000});
        assert!(normalize(&raw, &clock, &seq).is_err());
    }

    #[test]
    fn rejects_negative_liquidity() {
        let clock = Clock::new();
        let seq = SeqSource::new();
        let raw = serde_json::json!({"tokenId": "T1", "liquidity": -5.0});
        let err = normalize(&raw, &clock, &seq).unwrap_err();
        assert_eq!(err.0, "invalid_liquidity");
    }
}
