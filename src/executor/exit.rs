// =============================================================================
// Exit evaluation — fixed-priority order per open position
// =============================================================================
//
// Grounded on `exit/triple_barrier.rs::BarrierState::evaluate`'s fixed
// check-order idiom (time barrier, then profit locks, then stop), adapted
// to the spec's five-reason order: TakeProfit, StopLoss, TimeLimit,
// Deterioration, ManualClose. First match wins; the function is pure so
// the caller owns when to act on the result.
// =============================================================================

use crate::types::{ExitReason, Position};
use chrono::{DateTime, Utc};

/// A position open longer than this, with a recomputed composite below 25,
/// exits with `Deterioration`.
pub const DETERIORATION_MIN_HOLD: chrono::Duration = chrono::Duration::hours(4);
pub const DETERIORATION_SCORE_THRESHOLD: f64 = 25.0;

/// Evaluates the fixed exit order for `position` at `now`. `latest_composite`
/// is the most recent Opportunity composite the Analyzer produced for this
/// token, if any. `forced_reason` carries `ManualClose`/`RiskForced` when a
/// control command has already put the position into `Closing`, so a
/// synthesized tick still resolves the exit even with no genuine price move.
pub fn evaluate_exit(
    position: &Position,
    now: DateTime<Utc>,
    latest_composite: Option<f64>,
    forced_reason: Option<ExitReason>,
) -> Option<ExitReason> {
    if let Some(price) = position.current_price {
        if price >= position.take_profit_price {
            return Some(ExitReason::TakeProfit);
        }
        if price <= position.stop_price {
            return Some(ExitReason::StopLoss);
        }
    }

    if now >= position.max_hold_deadline {
        return Some(ExitReason::TimeLimit);
    }

    if let Some(composite) = latest_composite {
        if composite < DETERIORATION_SCORE_THRESHOLD && now - position.opened_at > DETERIORATION_MIN_HOLD {
            return Some(ExitReason::Deterioration);
        }
    }

    forced_reason
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PositionStatus, TokenId};
    use uuid::Uuid;

    fn base_position() -> Position {
        Position {
            id: Uuid::new_v4(),
            token_id: TokenId::new("T1").unwrap(),
            symbol: None,
            entry_price: 1.0,
            entry_quote: 5.0,
            opened_at: Utc::now(),
            status: PositionStatus::Open,
            current_price: Some(1.0),
            unrealized_pnl_quote: Some(0.0),
            return_pct: Some(0.0),
            stop_price: 0.85,
            take_profit_price: 1.5,
            max_hold_deadline: Utc::now() + chrono::Duration::hours(8),
            last_tick_wall_ms: None,
            price_spike: false,
        }
    }

    #[test]
    fn take_profit_wins_over_every_other_condition() {
        let mut pos = base_position();
        pos.current_price = Some(1.55);
        pos.max_hold_deadline = Utc::now() - chrono::Duration::seconds(1);
        let reason = evaluate_exit(&pos, Utc::now(), Some(10.0), Some(ExitReason::ManualClose));
        assert_eq!(reason, Some(ExitReason::TakeProfit));
    }

    #[test]
    fn stop_loss_triggers_below_stop_price() {
        let mut pos = base_position();
        pos.current_price = Some(0.80);
        assert_eq!(evaluate_exit(&pos, Utc::now(), None, None), Some(ExitReason::StopLoss));
    }

    #[test]
    fn time_limit_triggers_past_deadline() {
        let mut pos = base_position();
        pos.max_hold_deadline = Utc::now() - chrono::Duration::seconds(1);
        assert_eq!(evaluate_exit(&pos, Utc::now(), None, None), Some(ExitReason::TimeLimit));
    }

    #[test]
    fn deterioration_requires_both_low_score_and_long_hold() {
        let mut pos = base_position();
        pos.opened_at = Utc::now() - chrono::Duration::hours(5);
        assert_eq!(evaluate_exit(&pos, Utc::now(), Some(10.0), None), Some(ExitReason::Deterioration));

        let mut recent = base_position();
        recent.opened_at = Utc::now() - chrono::Duration::minutes(10);
        assert_eq!(evaluate_exit(&recent, Utc::now(), Some(10.0), None), None);
    }

    #[test]
    fn forced_reason_only_applies_when_nothing_else_matches() {
        let pos = base_position();
        assert_eq!(evaluate_exit(&pos, Utc::now(), None, Some(ExitReason::ManualClose)), Some(ExitReason::ManualClose));
    }
}
