// =============================================================================
// Paper Executor & Position Tracker
// =============================================================================
//
// Grounded on `execution.rs::ExecutionEngine`'s intent-to-position pipeline
// and `position_engine.rs::PositionManager`'s price-driven exit scanning,
// combined with `exit/monitor.rs::run_exit_monitor`'s per-tick evaluate-then-
// act loop. Position state is owned exclusively here (design note 9); the
// Risk Manager only ever sees it through the `PortfolioView` snapshot
// handed back by `portfolio_view`.
// =============================================================================

pub mod exit;
pub mod position;

use crate::clock::Clock;
use crate::risk::PortfolioView;
use crate::token_cache::TokenCache;
use crate::types::{ClosedTrade, ExitReason, Opportunity, Position, PositionId, PositionStatus, Price, TokenId, TradeIntent};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use position::PositionBook;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_STOP_LOSS_PCT: f64 = 0.15;
pub const DEFAULT_TAKE_PROFIT_PCT: f64 = 0.50;
pub const DEFAULT_MAX_HOLD_MS: i64 = 8 * 60 * 60 * 1000;
pub const MAX_HOLD_CAP_MS: i64 = 24 * 60 * 60 * 1000;
pub const DEFAULT_TICK_FRESH_WINDOW: Duration = Duration::from_secs(5);
pub const DEFAULT_DEFER_WAIT: Duration = Duration::from_secs(3);
pub const DEFAULT_PRICE_SPIKE_PCT: f64 = 0.50;
pub const DEFAULT_FORCE_CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub initial_capital: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub max_hold_ms: i64,
    pub fee_bps: u32,
    pub tick_fresh_window: Duration,
    pub defer_wait: Duration,
    pub price_spike_pct: f64,
    pub force_close_grace: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100.0,
            stop_loss_pct: DEFAULT_STOP_LOSS_PCT,
            take_profit_pct: DEFAULT_TAKE_PROFIT_PCT,
            max_hold_ms: DEFAULT_MAX_HOLD_MS,
            fee_bps: 0,
            tick_fresh_window: DEFAULT_TICK_FRESH_WINDOW,
            defer_wait: DEFAULT_DEFER_WAIT,
            price_spike_pct: DEFAULT_PRICE_SPIKE_PCT,
            force_close_grace: DEFAULT_FORCE_CLOSE_GRACE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpenOutcome {
    Opened(PositionId),
    Ignored,
    Rejected,
}

struct TickInfo {
    price: Price,
    wall_ms: i64,
    received_at: Instant,
}

struct Accounting {
    cash: f64,
    realized_pnl_total: f64,
    daily_pnl: f64,
    weekly_pnl: f64,
    peak_equity: f64,
    current_date: String,
    current_week: (i32, u32),
}

pub struct PaperExecutor {
    config: ExecutorConfig,
    clock: Arc<Clock>,
    token_cache: Arc<TokenCache>,
    book: PositionBook,
    accounting: RwLock<Accounting>,
    latest_ticks: DashMap<TokenId, TickInfo>,
    latest_composite: DashMap<TokenId, f64>,
    pending_force_close: DashMap<PositionId, ExitReason>,
    closed_tx: mpsc::Sender<ClosedTrade>,
}

impl PaperExecutor {
    pub fn new(config: ExecutorConfig, clock: Arc<Clock>, token_cache: Arc<TokenCache>, closed_tx: mpsc::Sender<ClosedTrade>) -> Arc<Self> {
        let now = Utc::now();
        let week = now.iso_week();
        Arc::new(Self {
            accounting: RwLock::new(Accounting {
                cash: config.initial_capital,
                realized_pnl_total: 0.0,
                daily_pnl: 0.0,
                weekly_pnl: 0.0,
                peak_equity: config.initial_capital,
                current_date: now.format("%Y-%m-%d").to_string(),
                current_week: (week.year(), week.week()),
            }),
            config,
            clock,
            token_cache,
            book: PositionBook::new(),
            latest_ticks: DashMap::new(),
            latest_composite: DashMap::new(),
            pending_force_close: DashMap::new(),
            closed_tx,
        })
    }

    pub fn on_opportunity(&self, opportunity: &Opportunity) {
        self.latest_composite.insert(opportunity.token_id.clone(), opportunity.scores.composite);
    }

    /// Handles an approved TradeIntent. `fallback_price` is the producing
    /// Opportunity's `market_price`, used when no fresh tick exists.
    pub async fn handle_trade_intent(self: &Arc<Self>, intent: TradeIntent, fallback_price: Option<Price>) -> OpenOutcome {
        if self.book.has_open_for(&intent.token_id) {
            return OpenOutcome::Ignored;
        }

        let entry_price = match self.resolve_entry_price(&intent.token_id, fallback_price).await {
            Some(p) => p,
            None => {
                warn!(token_id = %intent.token_id, "no_price: no tick available within defer window");
                return OpenOutcome::Rejected;
            }
        };

        self.open_position(intent, entry_price)
    }

    async fn resolve_entry_price(&self, token_id: &TokenId, fallback: Option<Price>) -> Option<Price> {
        if let Some(tick) = self.latest_ticks.get(token_id) {
            if tick.received_at.elapsed() <= self.config.tick_fresh_window {
                return Some(tick.price);
            }
        }
        if let Some(price) = fallback {
            return Some(price);
        }
        let deadline = Instant::now() + self.config.defer_wait;
        while Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if let Some(tick) = self.latest_ticks.get(token_id) {
                return Some(tick.price);
            }
        }
        None
    }

    fn open_position(&self, intent: TradeIntent, entry_price: Price) -> OpenOutcome {
        {
            let mut acc = self.accounting.write();
            if acc.cash < intent.notional_quote {
                return OpenOutcome::Rejected;
            }
            acc.cash -= intent.notional_quote;
        }

        let now = Utc::now();
        let stop_price = entry_price * (1.0 - self.config.stop_loss_pct);
        let take_profit_price = entry_price * (1.0 + self.config.take_profit_pct);
        let max_hold_ms = self.config.max_hold_ms.min(MAX_HOLD_CAP_MS);

        let position = Position {
            id: Uuid::new_v4(),
            token_id: intent.token_id.clone(),
            symbol: None,
            entry_price,
            entry_quote: intent.notional_quote,
            opened_at: now,
            status: PositionStatus::Open,
            current_price: Some(entry_price),
            unrealized_pnl_quote: Some(0.0),
            return_pct: Some(0.0),
            stop_price,
            take_profit_price,
            max_hold_deadline: now + chrono::Duration::milliseconds(max_hold_ms),
            last_tick_wall_ms: None,
            price_spike: false,
        };
        let id = position.id;
        self.token_cache.mark_has_open_position(&intent.token_id, true);
        info!(token_id = %intent.token_id, entry_price, stop_price, take_profit_price, "position opened");
        self.book.insert(position);
        OpenOutcome::Opened(id)
    }

    /// Feeds a PriceTick to the tracker: updates mark-to-market for any
    /// open position on this token and evaluates the fixed exit order.
    pub fn on_price_tick(self: &Arc<Self>, token_id: &TokenId, price: Price, wall_ms: i64) {
        let stale = self.latest_ticks.get(token_id).map(|t| wall_ms < t.wall_ms).unwrap_or(false);
        if stale {
            return;
        }

        let spike = self
            .latest_ticks
            .get(token_id)
            .map(|t| {
                let dt_ms = (wall_ms - t.wall_ms).abs();
                t.price > 0.0 && dt_ms <= 1_000 && ((price - t.price).abs() / t.price) > self.config.price_spike_pct
            })
            .unwrap_or(false);
        if spike {
            warn!(token_id = %token_id, price, "price_spike detected, marking and continuing");
        }

        self.latest_ticks.insert(token_id.clone(), TickInfo { price, wall_ms, received_at: Instant::now() });
        self.token_cache.apply_price(token_id, price, self.clock.now());

        let updated = self.book.mutate_for_token(token_id, |pos| {
            pos.price_spike = spike;
            pos.last_tick_wall_ms = Some(wall_ms);
            pos.current_price = Some(price);
            if pos.entry_price > 0.0 {
                pos.return_pct = Some(price / pos.entry_price - 1.0);
                pos.unrealized_pnl_quote = Some(pos.entry_quote * (price / pos.entry_price - 1.0));
            }
            pos.clone()
        });

        let Some(position) = updated else { return };
        let latest_composite = self.latest_composite.get(token_id).map(|c| *c);
        let forced_reason = self.pending_force_close.get(&position.id).map(|r| *r);

        if let Some(reason) = exit::evaluate_exit(&position, Utc::now(), latest_composite, forced_reason) {
            self.finalize_close(position.id, reason, price);
        }
    }

    /// Immediately transitions a Position to `Closing`; the next tick (or
    /// a synthesized one after `force_close_grace`) finalizes the close.
    pub fn force_close(self: &Arc<Self>, position_id: PositionId, reason: ExitReason) -> bool {
        if !self.book.mark_closing(position_id) {
            return false;
        }
        self.pending_force_close.insert(position_id, reason);
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.config.force_close_grace).await;
            this.finalize_if_still_closing(position_id);
        });
        true
    }

    fn finalize_if_still_closing(self: &Arc<Self>, position_id: PositionId) {
        if let Some(position) = self.book.get(position_id) {
            if position.status == PositionStatus::Closing {
                let price = position.current_price.unwrap_or(position.entry_price);
                let reason = self.pending_force_close.get(&position_id).map(|r| *r).unwrap_or(ExitReason::ManualClose);
                self.finalize_close(position_id, reason, price);
            }
        }
    }

    fn finalize_close(self: &Arc<Self>, position_id: PositionId, reason: ExitReason, exit_price: Price) {
        self.maybe_reset_periods();
        let Some(position) = self.book.remove(position_id) else { return };

        let return_pct = if position.entry_price > 0.0 { exit_price / position.entry_price - 1.0 } else { 0.0 };
        let gross_return = position.entry_quote * (1.0 + return_pct);
        let fee = gross_return * (self.config.fee_bps as f64 / 10_000.0);
        let credited = gross_return - fee;
        let realized_pnl = credited - position.entry_quote;

        {
            let mut acc = self.accounting.write();
            acc.cash += credited;
            acc.realized_pnl_total += realized_pnl;
            acc.daily_pnl += realized_pnl;
            acc.weekly_pnl += realized_pnl;
            let nav = acc.cash + self.unrealized_total();
            if nav > acc.peak_equity {
                acc.peak_equity = nav;
            }
        }

        self.token_cache.mark_has_open_position(&position.token_id, false);
        self.pending_force_close.remove(&position_id);

        let closed_at = Utc::now();
        let closed = ClosedTrade {
            position_id,
            token_id: position.token_id.clone(),
            entry_price: position.entry_price,
            exit_price,
            opened_at: position.opened_at,
            closed_at,
            duration_ms: (closed_at - position.opened_at).num_milliseconds(),
            realized_pnl_quote: realized_pnl,
            return_pct,
            exit_reason: reason,
        };
        info!(token_id = %closed.token_id, exit_reason = %reason, realized_pnl, return_pct, "position closed");

        let tx = self.closed_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(closed).await;
        });
    }

    fn unrealized_total(&self) -> f64 {
        self.book.snapshot().iter().map(|p| p.unrealized_pnl_quote.unwrap_or(0.0)).sum()
    }

    fn maybe_reset_periods(&self) {
        let now = Utc::now();
        let today = now.format("%Y-%m-%d").to_string();
        let week = now.iso_week();
        let week_key = (week.year(), week.week());
        let mut acc = self.accounting.write();
        if acc.current_date != today {
            acc.daily_pnl = 0.0;
            acc.current_date = today;
        }
        if acc.current_week != week_key {
            acc.weekly_pnl = 0.0;
            acc.current_week = week_key;
        }
    }

    pub fn portfolio_view(&self) -> PortfolioView {
        let acc = self.accounting.read();
        let nav = acc.cash + self.unrealized_total();
        let drawdown_pct = if acc.peak_equity > 0.0 { ((acc.peak_equity - nav) / acc.peak_equity * 100.0).max(0.0) } else { 0.0 };
        let daily_pnl_pct = if self.config.initial_capital > 0.0 { acc.daily_pnl / self.config.initial_capital * 100.0 } else { 0.0 };
        PortfolioView {
            nav,
            cash_reserve: acc.cash,
            open_positions: self.book.open_count(),
            daily_pnl_pct,
            drawdown_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TokenId;
    use tokio::sync::mpsc::channel;

    fn make_executor(config: ExecutorConfig) -> (Arc<PaperExecutor>, mpsc::Receiver<ClosedTrade>) {
        let clock = Arc::new(Clock::new());
        let cache = Arc::new(TokenCache::new(1024));
        let (tx, rx) = channel(16);
        (PaperExecutor::new(config, clock, cache, tx), rx)
    }

    fn intent(token: &str, notional: f64) -> TradeIntent {
        TradeIntent::new(
            TokenId::new(token).unwrap(),
            notional,
            500,
            "risk_approved",
            crate::types::OpportunityRef { composite: 82.0, confidence: 0.8, recommendation: crate::types::Recommendation::StrongBuy },
        )
    }

    #[tokio::test]
    async fn opens_with_fresh_tick_and_exits_on_take_profit() {
        let (executor, mut rx) = make_executor(ExecutorConfig::default());
        let token = TokenId::new("T1").unwrap();
        executor.on_price_tick(&token, 1.00, 1_500);

        let outcome = executor.handle_trade_intent(intent("T1", 5.0), None).await;
        assert!(matches!(outcome, OpenOutcome::Opened(_)));

        executor.on_price_tick(&token, 1.20, 2_000);
        executor.on_price_tick(&token, 1.55, 2_500);

        let closed = rx.recv().await.expect("closed trade");
        assert_eq!(closed.exit_reason, ExitReason::TakeProfit);
        assert!((closed.return_pct - 0.55).abs() < 1e-9);
    }

    #[tokio::test]
    async fn rejects_open_with_no_price_available() {
        let mut config = ExecutorConfig::default();
        config.defer_wait = Duration::from_millis(50);
        let (executor, _rx) = make_executor(config);

        let outcome = executor.handle_trade_intent(intent("T2", 5.0), None).await;
        assert_eq!(outcome, OpenOutcome::Rejected);
    }

    #[tokio::test]
    async fn stale_tick_is_ignored() {
        let (executor, _rx) = make_executor(ExecutorConfig::default());
        let token = TokenId::new("T3").unwrap();
        executor.on_price_tick(&token, 1.0, 5_000);
        executor.on_price_tick(&token, 2.0, 1_000);
        assert!(!executor.book.mutate_for_token(&token, |p| p.current_price).is_some());
    }

    #[tokio::test]
    async fn second_open_for_same_token_is_ignored_without_averaging() {
        let (executor, _rx) = make_executor(ExecutorConfig::default());
        let token = TokenId::new("T4").unwrap();
        executor.on_price_tick(&token, 1.0, 1_000);
        let first = executor.handle_trade_intent(intent("T4", 5.0), None).await;
        assert!(matches!(first, OpenOutcome::Opened(_)));
        let second = executor.handle_trade_intent(intent("T4", 5.0), None).await;
        assert_eq!(second, OpenOutcome::Ignored);
    }

    #[tokio::test]
    async fn force_close_finalizes_after_grace_period_without_a_tick() {
        let mut config = ExecutorConfig::default();
        config.force_close_grace = Duration::from_millis(50);
        let (executor, mut rx) = make_executor(config);
        let token = TokenId::new("T5").unwrap();
        executor.on_price_tick(&token, 1.0, 1_000);
        let outcome = executor.handle_trade_intent(intent("T5", 5.0), None).await;
        let OpenOutcome::Opened(id) = outcome else { panic!("expected open") };

        executor.force_close(id, ExitReason::RiskForced);
        let closed = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("closed within timeout")
            .expect("channel open");
        assert_eq!(closed.exit_reason, ExitReason::RiskForced);
    }
}
