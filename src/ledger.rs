// =============================================================================
// Outcome Ledger — append-only ring of ClosedTrade
// =============================================================================
//
// Grounded on `market_data/candle_buffer.rs::CandleBuffer`'s
// `VecDeque`-trimmed-to-a-max-length ring, and on `app_state.rs`'s
// `push_error`/`push_decision` push-then-trim idiom. The Paper Executor is
// the sole writer (§4.6); every other subsystem only ever reads a snapshot.
// =============================================================================

use crate::types::ClosedTrade;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::VecDeque;
use tracing::info;

pub const DEFAULT_CAPACITY: usize = 10_000;

/// Aggregate stats over a window of closed trades, returned by `summary`.
#[derive(Debug, Clone, Default)]
pub struct LedgerSummary {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub realized_pnl_quote: f64,
    pub profit_factor: f64,
}

pub struct OutcomeLedger {
    trades: RwLock<VecDeque<ClosedTrade>>,
    capacity: usize,
}

impl OutcomeLedger {
    pub fn new(capacity: usize) -> Self {
        Self { trades: RwLock::new(VecDeque::with_capacity(capacity.min(1024))), capacity }
    }

    /// Appends a closed trade, trimming the oldest entry if at capacity.
    pub fn record(&self, trade: ClosedTrade) {
        let mut trades = self.trades.write();
        trades.push_back(trade);
        while trades.len() > self.capacity {
            trades.pop_front();
        }
        info!(len = trades.len(), "closed trade recorded to ledger");
    }

    /// Returns the most recent `n` closed trades, newest last.
    pub fn recent(&self, n: usize) -> Vec<ClosedTrade> {
        let trades = self.trades.read();
        let skip = trades.len().saturating_sub(n);
        trades.iter().skip(skip).cloned().collect()
    }

    /// Aggregates every trade closed at or after `since`.
    pub fn summary(&self, since: DateTime<Utc>) -> LedgerSummary {
        let trades = self.trades.read();
        let window: Vec<&ClosedTrade> = trades.iter().filter(|t| t.closed_at >= since).collect();
        if window.is_empty() {
            return LedgerSummary::default();
        }

        let total_trades = window.len();
        let wins = window.iter().filter(|t| t.realized_pnl_quote > 0.0).count();
        let losses = total_trades - wins;
        let realized_pnl_quote: f64 = window.iter().map(|t| t.realized_pnl_quote).sum();
        let gross_profit: f64 = window.iter().map(|t| t.realized_pnl_quote).filter(|&p| p > 0.0).sum();
        let gross_loss: f64 = window.iter().map(|t| t.realized_pnl_quote).filter(|&p| p < 0.0).map(f64::abs).sum();
        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        LedgerSummary {
            total_trades,
            wins,
            losses,
            win_rate: wins as f64 / total_trades as f64,
            realized_pnl_quote,
            profit_factor,
        }
    }

    pub fn len(&self) -> usize {
        self.trades.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OutcomeLedger {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExitReason, TokenId};
    use uuid::Uuid;

    fn trade(pnl: f64, closed_at: DateTime<Utc>) -> ClosedTrade {
        ClosedTrade {
            position_id: Uuid::new_v4(),
            token_id: TokenId::new("T1").unwrap(),
            entry_price: 1.0,
            exit_price: 1.0 + pnl / 5.0,
            opened_at: closed_at - chrono::Duration::minutes(10),
            closed_at,
            duration_ms: 600_000,
            realized_pnl_quote: pnl,
            return_pct: pnl / 5.0,
            exit_reason: ExitReason::TakeProfit,
        }
    }

    #[test]
    fn ring_trims_to_capacity() {
        let ledger = OutcomeLedger::new(3);
        for i in 0..5 {
            ledger.record(trade(1.0, Utc::now() + chrono::Duration::seconds(i)));
        }
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn recent_returns_newest_last() {
        let ledger = OutcomeLedger::new(10);
        let t0 = Utc::now();
        ledger.record(trade(1.0, t0));
        ledger.record(trade(2.0, t0 + chrono::Duration::seconds(1)));
        let recent = ledger.recent(1);
        assert_eq!(recent.len(), 1);
        assert!((recent[0].realized_pnl_quote - 2.0).abs() < 1e-9);
    }

    #[test]
    fn summary_computes_win_rate_and_profit_factor() {
        let ledger = OutcomeLedger::new(10);
        let now = Utc::now();
        ledger.record(trade(5.0, now));
        ledger.record(trade(-2.0, now));
        let summary = ledger.summary(now - chrono::Duration::minutes(1));
        assert_eq!(summary.total_trades, 2);
        assert_eq!(summary.wins, 1);
        assert_eq!(summary.losses, 1);
        assert!((summary.win_rate - 0.5).abs() < 1e-9);
        assert!((summary.profit_factor - 2.5).abs() < 1e-9);
    }

    #[test]
    fn summary_excludes_trades_before_window() {
        let ledger = OutcomeLedger::new(10);
        let now = Utc::now();
        ledger.record(trade(5.0, now - chrono::Duration::hours(2)));
        ledger.record(trade(3.0, now));
        let summary = ledger.summary(now - chrono::Duration::minutes(5));
        assert_eq!(summary.total_trades, 1);
        assert!((summary.realized_pnl_quote - 3.0).abs() < 1e-9);
    }
}
