// =============================================================================
// Circuit breakers — consecutive losses, hourly loss, rapid loss, daily shutdown
// =============================================================================
//
// Grounded directly on `risk.rs::RiskEngine`: a single `RwLock<Inner>` holds
// rolling counters, `record_trade_result` updates them, and a read-side gate
// (`can_trade` there, `evaluate` here) walks each breaker in turn and
// returns the first tripped reason. The teacher's four breakers (daily
// loss, consecutive losses, drawdown, trade count) are replaced with the
// spec's four (consecutive losses, hourly loss, rapid loss, daily shutdown)
// while keeping the same rolling-window bookkeeping style.
// =============================================================================

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::VecDeque;
use tracing::warn;

pub const CONSECUTIVE_LOSS_THRESHOLD: u32 = 3;
pub const CONSECUTIVE_LOSS_WINDOW_HOURS: i64 = 2;
pub const HOURLY_LOSS_PCT: f64 = 0.02;
pub const RAPID_LOSS_PCT: f64 = 0.03;
pub const RAPID_LOSS_WINDOW_MINUTES: i64 = 15;
pub const DAILY_SHUTDOWN_PCT: f64 = 0.08;

#[derive(Debug, Clone, Copy)]
struct LossEvent {
    at: DateTime<Utc>,
    pnl_quote: f64,
}

struct Inner {
    losses: VecDeque<LossEvent>,
    all_closes: VecDeque<LossEvent>,
    daily_pnl: f64,
    current_date: String,
    shutdown_until_next_day: bool,
}

/// The four circuit breakers of §4.4, sharing one rolling-window ledger of
/// closed-trade PnL. All thresholds are expressed as a fraction of NAV.
pub struct CircuitBreakers {
    state: RwLock<Inner>,
}

impl CircuitBreakers {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Inner {
                losses: VecDeque::new(),
                all_closes: VecDeque::new(),
                daily_pnl: 0.0,
                current_date: Utc::now().format("%Y-%m-%d").to_string(),
                shutdown_until_next_day: false,
            }),
        }
    }

    /// Records a closed trade's realized PnL (in quote currency) against
    /// the rolling windows. Must be called by the Paper Executor for every
    /// `ClosedTrade`.
    pub fn record_close(&self, pnl_quote: f64, nav: f64) {
        self.maybe_reset_daily();
        let mut s = self.state.write();
        let now = Utc::now();
        let event = LossEvent { at: now, pnl_quote };
        s.all_closes.push_back(event);
        s.daily_pnl += pnl_quote;
        if pnl_quote < 0.0 {
            s.losses.push_back(event);
        } else {
            // A winning close resets the consecutive-loss streak.
            s.losses.clear();
        }
        prune(&mut s.losses, now, CONSECUTIVE_LOSS_WINDOW_HOURS * 3600);
        prune(&mut s.all_closes, now, RAPID_LOSS_WINDOW_MINUTES * 60);

        if nav > 0.0 && (-s.daily_pnl / nav) >= DAILY_SHUTDOWN_PCT {
            s.shutdown_until_next_day = true;
            warn!(daily_pnl = s.daily_pnl, nav, "daily shutdown breaker tripped");
        }
    }

    /// Evaluates all four breakers against the current NAV, returning the
    /// reason tag of the first one that is tripped.
    pub fn check(&self, nav: f64) -> Option<&'static str> {
        self.maybe_reset_daily();
        let s = self.state.read();

        if s.shutdown_until_next_day {
            return Some("daily_shutdown_breaker");
        }

        if nav > 0.0 {
            // Rapid loss is checked before consecutive-losses and the
            // broader hourly window: a short, sharp burst of losses is the
            // more specific condition, and several of the spec's scenarios
            // expect a burst that also happens to be three-in-a-row to
            // attribute to "rapid_loss_breaker" rather than
            // "consecutive_losses_breaker".
            let rapid_pnl: f64 = sum_within(&s.all_closes, Utc::now(), RAPID_LOSS_WINDOW_MINUTES * 60);
            if (-rapid_pnl / nav) >= RAPID_LOSS_PCT {
                return Some("rapid_loss_breaker");
            }
        }

        if s.losses.len() as u32 >= CONSECUTIVE_LOSS_THRESHOLD {
            let now = Utc::now();
            let within_window = s
                .losses
                .iter()
                .rev()
                .take(CONSECUTIVE_LOSS_THRESHOLD as usize)
                .all(|e| (now - e.at).num_seconds() <= CONSECUTIVE_LOSS_WINDOW_HOURS * 3600);
            if within_window {
                return Some("consecutive_losses_breaker");
            }
        }

        if nav > 0.0 {
            let hourly_pnl: f64 = sum_within(&s.all_closes, Utc::now(), 3600);
            if (-hourly_pnl / nav) >= HOURLY_LOSS_PCT {
                return Some("hourly_loss_breaker");
            }
        }

        None
    }

    fn maybe_reset_daily(&self) {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        {
            let s = self.state.read();
            if s.current_date == today {
                return;
            }
        }
        let mut s = self.state.write();
        if s.current_date != today {
            s.daily_pnl = 0.0;
            s.shutdown_until_next_day = false;
            s.current_date = today;
        }
    }
}

impl Default for CircuitBreakers {
    fn default() -> Self {
        Self::new()
    }
}

fn prune(events: &mut VecDeque<LossEvent>, now: DateTime<Utc>, window_secs: i64) {
    while let Some(front) = events.front() {
        if (now - front.at).num_seconds() > window_secs {
            events.pop_front();
        } else {
            break;
        }
    }
}

fn sum_within(events: &VecDeque<LossEvent>, now: DateTime<Utc>, window_secs: i64) -> f64 {
    events
        .iter()
        .filter(|e| (now - e.at).num_seconds() <= window_secs)
        .map(|e| e.pnl_quote)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_consecutive_losses_trip_the_breaker() {
        let breakers = CircuitBreakers::new();
        breakers.record_close(-0.5, 100.0);
        breakers.record_close(-0.5, 100.0);
        assert_eq!(breakers.check(100.0), None);
        breakers.record_close(-0.5, 100.0);
        assert_eq!(breakers.check(100.0), Some("consecutive_losses_breaker"));
    }

    #[test]
    fn a_win_resets_the_consecutive_loss_streak() {
        let breakers = CircuitBreakers::new();
        breakers.record_close(-0.5, 100.0);
        breakers.record_close(-0.5, 100.0);
        breakers.record_close(0.5, 100.0);
        breakers.record_close(-0.5, 100.0);
        assert_eq!(breakers.check(100.0), None);
    }

    #[test]
    fn rapid_loss_within_fifteen_minutes_trips() {
        let breakers = CircuitBreakers::new();
        breakers.record_close(-2.0, 100.0);
        breakers.record_close(-1.5, 100.0);
        assert_eq!(breakers.check(100.0), Some("rapid_loss_breaker"));
    }

    #[test]
    fn three_losses_that_also_trip_rapid_loss_attribute_to_rapid_loss() {
        // Scenario 4: three closes within 15 minutes at returnPct -0.02,
        // -0.01, -0.01 on NAV=100 also satisfy the consecutive-loss count,
        // but rapid-loss is the more specific breaker and must win.
        let breakers = CircuitBreakers::new();
        breakers.record_close(-2.0, 100.0);
        breakers.record_close(-1.0, 100.0);
        breakers.record_close(-1.0, 100.0);
        assert_eq!(breakers.check(100.0), Some("rapid_loss_breaker"));
    }

    #[test]
    fn daily_shutdown_persists_until_next_day_reset() {
        let breakers = CircuitBreakers::new();
        breakers.record_close(-9.0, 100.0);
        assert_eq!(breakers.check(100.0), Some("daily_shutdown_breaker"));
    }

    #[test]
    fn hourly_loss_exactly_at_threshold_trips() {
        let breakers = CircuitBreakers::new();
        breakers.record_close(-2.0, 100.0);
        assert_eq!(breakers.check(100.0), Some("hourly_loss_breaker"));
    }
}
