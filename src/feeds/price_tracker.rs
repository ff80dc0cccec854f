// =============================================================================
// PriceTracker feed normalization
// =============================================================================

use crate::clock::{Clock, SeqSource};
use crate::types::{Event, EventKind, EventPayload, FeedKind, RejectReason, TokenId};
use serde_json::Value;

pub fn normalize(raw: &Value, clock: &Clock, seq_source: &SeqSource) -> Result<Event, RejectReason> {
    let token_id_raw = raw
        .get("tokenId")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RejectReason::new("missing_token_id"))?;
    let token_id = TokenId::new(token_id_raw).ok_or_else(|| RejectReason::new("missing_token_id"))?;

    let price = raw.get("price").and_then(|v| v.as_f64()).ok_or_else(|| RejectReason::new("missing_price"))?;
    super::require_nonneg(price, "price")?;

    let wall_ts = raw.get("wallTs").and_then(|v| v.as_i64()).unwrap_or_else(|| clock.wall_ms());

    Ok(Event {
        seq: seq_source.next(),
        wall_ts,
        mono_ts: clock.mono_ms(),
        feed: FeedKind::PriceTracker,
        kind: EventKind::PriceTick,
        token_id: Some(token_id),
        payload: EventPayload::PriceTick { price },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_tick() {
        let clock = Clock::new();
        let seq = SeqSource::new();
        let raw = serde_json::json!({"tokenId": "T1", "price": 1.5, "wallTs": 1000});
        let event = normalize(&raw, &clock, &seq).unwrap();
        assert_eq!(event.kind, EventKind::PriceTick);
    }

    #[test]
    fn rejects_negative_price() {
        let clock = Clock::new();
        let seq = SeqSource::new();
        let raw = serde_json::json!({"tokenId": "T1", "price": -1.0});
        assert!(normalize(&raw, &clock, &seq).is_err());
    }
}
