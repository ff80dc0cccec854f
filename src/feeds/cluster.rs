// =============================================================================
// Cluster feed normalization — room-based routing
// =============================================================================
//
// Rooms of interest: "new_pairs", "trending-search-crypto", "block_hash",
// "sol-priority-fee", "jito-bribe-fee", "connection_monitor",
// "twitter_feed_v2", and "b-<tokenId>" for per-token price ticks. Only the
// per-token price-tick rooms enter the main pipeline as PriceTick events;
// everything else is exposed on a side channel for risk/telemetry.
// =============================================================================

use super::NormalizeOutcome;
use crate::clock::{Clock, SeqSource};
use crate::types::{Event, EventKind, EventPayload, FeedKind, RejectReason, TokenId};
use serde_json::Value;

const PRICE_TICK_ROOM_PREFIX: &str = "b-";

/// A Cluster room message not destined for the main pipeline, exposed
/// verbatim for risk/telemetry consumers (priority fees, Jito bribe rates,
/// block hash cadence, connection-monitor pings, trending/twitter signals).
#[derive(Debug, Clone)]
pub struct RoomMessage {
    pub room: String,
    pub content: Value,
    pub wall_ts: i64,
}

pub fn normalize(raw: &Value, clock: &Clock, seq_source: &SeqSource) -> Result<NormalizeOutcome, RejectReason> {
    let room = raw
        .get("room")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RejectReason::new("cluster_missing_room"))?;
    let content = raw.get("content").cloned().unwrap_or(Value::Null);
    let wall_ts = clock.wall_ms();

    if let Some(token_id_raw) = room.strip_prefix(PRICE_TICK_ROOM_PREFIX) {
        let token_id = TokenId::new(token_id_raw).ok_or_else(|| RejectReason::new("cluster_missing_room"))?;
        let price = content
            .get("price")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| RejectReason::new("cluster_price_tick_missing_price"))?;
        super::require_nonneg(price, "price")?;

        return Ok(NormalizeOutcome::MainPipeline(Event {
            seq: seq_source.next(),
            wall_ts,
            mono_ts: clock.mono_ms(),
            feed: FeedKind::Cluster,
            kind: EventKind::PriceTick,
            token_id: Some(token_id),
            payload: EventPayload::PriceTick { price },
        }));
    }

    Ok(NormalizeOutcome::SideChannel(RoomMessage { room: room.to_string(), content, wall_ts }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_tick_room_enters_main_pipeline() {
        let clock = Clock::new();
        let seq = SeqSource::new();
        let raw = serde_json::json!({"room": "b-T1", "content": {"price": 1.23}});
        match normalize(&raw, &clock, &seq).unwrap() {
            NormalizeOutcome::MainPipeline(event) => {
                assert_eq!(event.kind, EventKind::PriceTick);
                assert_eq!(event.token_id.unwrap().as_str(), "T1");
            }
            NormalizeOutcome::SideChannel(_) => panic!("expected main pipeline"),
        }
    }

    #[test]
    fn other_rooms_route_to_side_channel() {
        let clock = Clock::new();
        let seq = SeqSource::new();
        let raw = serde_json::json!({"room": "sol-priority-fee", "content": {"lamports": 5000}});
        match normalize(&raw, &clock, &seq).unwrap() {
            NormalizeOutcome::SideChannel(msg) => assert_eq!(msg.room, "sol-priority-fee"),
            NormalizeOutcome::MainPipeline(_) => panic!("expected side channel"),
        }
    }

    #[test]
    fn price_tick_room_requires_price_field() {
        let clock = Clock::new();
        let seq = SeqSource::new();
        let raw = serde_json::json!({"room": "b-T1", "content": {}});
        assert!(normalize(&raw, &clock, &seq).is_err());
    }
}
