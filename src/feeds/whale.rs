// =============================================================================
// Whale feed normalization — positional tuple mapping
// =============================================================================
//
// The whale feed's raw payload is a positional JSON array. Canonical index
// mapping (fields outside [0,27] are ignored):
//   0 wallTs, 1 whaleAddress, 2 signature, 4 fromToken, 5 toToken,
//   9 transactionAmount, 13 side, 18 tokenName, 19 symbol.
// Any deviation — a missing required index — is rejected with "whale_shape".
// =============================================================================

use crate::clock::{Clock, SeqSource};
use crate::types::{Event, EventKind, EventPayload, FeedKind, RejectReason, TokenId, WhaleSide};
use serde_json::Value;

const MAX_INDEX: usize = 27;
const IDX_WALL_TS: usize = 0;
const IDX_WHALE_ADDRESS: usize = 1;
const IDX_SIGNATURE: usize = 2;
const IDX_FROM_TOKEN: usize = 4;
const IDX_TO_TOKEN: usize = 5;
const IDX_AMOUNT: usize = 9;
const IDX_SIDE: usize = 13;

pub fn normalize(raw: &Value, clock: &Clock, seq_source: &SeqSource) -> Result<Event, RejectReason> {
    let arr = raw.as_array().ok_or_else(|| RejectReason::new("whale_shape"))?;
    let field = |idx: usize| -> Option<&Value> {
        if idx > MAX_INDEX {
            return None;
        }
        arr.get(idx)
    };

    let wall_ts = field(IDX_WALL_TS)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| RejectReason::new("whale_shape"))?;
    let whale_address = field(IDX_WHALE_ADDRESS)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RejectReason::new("whale_shape"))?
        .to_string();
    let signature = field(IDX_SIGNATURE)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RejectReason::new("whale_shape"))?
        .to_string();
    let from_token = field(IDX_FROM_TOKEN)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RejectReason::new("whale_shape"))?
        .to_string();
    let to_token = field(IDX_TO_TOKEN)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RejectReason::new("whale_shape"))?
        .to_string();
    let amount = field(IDX_AMOUNT)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| RejectReason::new("whale_shape"))?;
    let side_raw = field(IDX_SIDE)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RejectReason::new("whale_shape"))?;

    let side = match side_raw {
        "buy" => WhaleSide::Buy,
        "sell" => WhaleSide::Sell,
        _ => return Err(RejectReason::new("whale_shape")),
    };

    super::require_nonneg(amount, "transaction_amount")?;

    // The traded token (subject of TokenId) is the one the whale acquires on
    // a buy and disposes of on a sell.
    let subject = match side {
        WhaleSide::Buy => &to_token,
        WhaleSide::Sell => &from_token,
    };
    let token_id = TokenId::new(subject.clone()).ok_or_else(|| RejectReason::new("whale_shape"))?;

    Ok(Event {
        seq: seq_source.next(),
        wall_ts,
        mono_ts: clock.mono_ms(),
        feed: FeedKind::Whale,
        kind: EventKind::WhaleTrade,
        token_id: Some(token_id),
        payload: EventPayload::WhaleTrade {
            whale_address,
            signature,
            from_token,
            to_token,
            amount,
            side,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_tuple(side: &str) -> Value {
        // 20-element array matching the canonical layout up through index 19.
        let mut v: Vec<Value> = (0..20).map(|_| Value::Null).collect();
        v[0] = serde_json::json!(1_700_000_000_000i64);
        v[1] = serde_json::json!("WhaleWallet111");
        v[2] = serde_json::json!("Sig111");
        v[4] = serde_json::json!("SOL");
        v[5] = serde_json::json!("TOKEN_MINT_1");
        v[9] = serde_json::json!(1234.5);
        v[13] = serde_json::json!(side);
        v[18] = serde_json::json!("Example Token");
        v[19] = serde_json::json!("EXT");
        Value::Array(v)
    }

    #[test]
    fn accepts_well_formed_buy_tuple() {
        let clock = Clock::new();
        let seq = SeqSource::new();
        let event = normalize(&full_tuple("buy"), &clock, &seq).unwrap();
        assert_eq!(event.token_id.unwrap().as_str(), "TOKEN_MINT_1");
    }

    #[test]
    fn accepts_well_formed_sell_tuple_using_from_token() {
        let clock = Clock::new();
        let seq = SeqSource::new();
        let event = normalize(&full_tuple("sell"), &clock, &seq).unwrap();
        assert_eq!(event.token_id.unwrap().as_str(), "SOL");
    }

    #[test]
    fn rejects_missing_required_index() {
        let clock = Clock::new();
        let seq = SeqSource::new();
        let mut tuple = full_tuple("buy");
        tuple.as_array_mut().unwrap()[9] = Value::Null;
        let err = normalize(&tuple, &clock, &seq).unwrap_err();
        assert_eq!(err.0, "whale_shape");
    }

    #[test]
    fn rejects_non_array_payload() {
        let clock = Clock::new();
        let seq = SeqSource::new();
        let raw = serde_json::json!({"not": "an array"});
        assert!(normalize(&raw, &clock, &seq).is_err());
    }

    #[test]
    fn rejects_invalid_side() {
        let clock = Clock::new();
        let seq = SeqSource::new();
        let tuple = full_tuple("hold");
        assert!(normalize(&tuple, &clock, &seq).is_err());
    }
}
