// =============================================================================
// Risk Manager — gates Opportunity -> TradeIntent
// =============================================================================
//
// Grounded on `risk.rs::RiskEngine`'s read-then-decide shape: `evaluate`
// assembles a `RiskContext`-equivalent from its arguments, walks hard
// blockers first (breakers, hard security flags, liquidity), then sizes
// and scores the candidate, mirroring the teacher's "breaker check, then
// allow" two-stage gate but generalized into the spec's five-step
// algorithm.
// =============================================================================

pub mod breakers;
pub mod sizing;

use crate::types::{Opportunity, OpportunityRef, Recommendation, SecurityInfo, TokenId, TradeIntent};
use breakers::CircuitBreakers;
use dashmap::DashMap;
use sizing::{candidate_notional, composite_risk_score, PortfolioLimits, RiskComponents, SizingTier, SlippagePreset, TokenLimits, COMPOSITE_RISK_REJECT_THRESHOLD};
use std::time::{Duration, Instant};

pub const TIE_BREAK_WINDOW: Duration = Duration::from_millis(1_000);
pub const OPEN_FAILURE_COOLDOWN: Duration = Duration::from_secs(5 * 60);
pub const ASSESSMENT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Read-only snapshot of portfolio state the Paper Executor owns. Passed
/// by value into `evaluate` per design note 9's "shared RiskContext
/// snapshot" re-architecture.
#[derive(Debug, Clone)]
pub struct PortfolioView {
    pub nav: f64,
    pub cash_reserve: f64,
    pub open_positions: usize,
    pub daily_pnl_pct: f64,
    pub drawdown_pct: f64,
}

#[derive(Debug, Clone)]
pub enum RiskDecision {
    Approved(TradeIntent),
    Rejected { reasons: Vec<String> },
    /// A later same-token Opportunity arrived within the tie-break window
    /// without strictly beating the composite already acted on; per §4.4
    /// it is silently ignored rather than rejected.
    Ignored,
}

pub struct RiskManager {
    breakers: CircuitBreakers,
    portfolio_limits: PortfolioLimits,
    token_limits: TokenLimits,
    open_failures: DashMap<TokenId, Instant>,
    tie_break: DashMap<TokenId, (Instant, f64)>,
    assessment_cache: DashMap<TokenId, Instant>,
    allow_risky_emission: bool,
}

impl RiskManager {
    pub fn new(portfolio_limits: PortfolioLimits, token_limits: TokenLimits, allow_risky_emission: bool) -> Self {
        Self {
            breakers: CircuitBreakers::new(),
            portfolio_limits,
            token_limits,
            open_failures: DashMap::new(),
            tie_break: DashMap::new(),
            assessment_cache: DashMap::new(),
            allow_risky_emission,
        }
    }

    pub fn record_closed_trade(&self, pnl_quote: f64, nav: f64) {
        self.breakers.record_close(pnl_quote, nav);
    }

    /// Called by the Paper Executor when opening a position for an
    /// approved TradeIntent fails; the Risk Manager will not re-approve
    /// the same token within the cooldown window.
    pub fn record_open_failure(&self, token_id: &TokenId) {
        self.open_failures.insert(token_id.clone(), Instant::now());
    }

    pub fn evaluate(
        &self,
        opportunity: &Opportunity,
        portfolio: &PortfolioView,
        token_age_secs: i64,
        security: Option<&SecurityInfo>,
        token_liquidity: Option<f64>,
    ) -> RiskDecision {
        if let Some(decision) = self.check_tie_break(opportunity) {
            return decision;
        }

        if let Some(failed_at) = self.open_failures.get(&opportunity.token_id) {
            if failed_at.elapsed() < OPEN_FAILURE_COOLDOWN {
                return RiskDecision::Rejected { reasons: vec!["recent_open_failure".to_string()] };
            }
        }

        let mut reasons = Vec::new();

        let posture_allowed = matches!(opportunity.recommendation, Recommendation::StrongBuy | Recommendation::Buy | Recommendation::Watch)
            || (self.allow_risky_emission && opportunity.recommendation == Recommendation::Risky);
        if !posture_allowed {
            reasons.push("recommendation_below_threshold".to_string());
        }

        if let Some(reason) = self.breakers.check(portfolio.nav) {
            reasons.push(reason.to_string());
        }

        let hard_flag = security.map(|s| s.freeze_authority_present.unwrap_or(false)).unwrap_or(false)
            || opportunity.recommendation == Recommendation::Avoid && opportunity.reasons.iter().any(|r| r == "freeze_authority" || r == "rug_pull" || r == "honeypot");
        if hard_flag {
            reasons.push("hard_security_flag".to_string());
        }

        if let Some(liquidity) = token_liquidity {
            if liquidity < self.token_limits.min_liquidity_quote {
                reasons.push("low_liquidity".to_string());
            }
        }

        if portfolio.open_positions >= self.portfolio_limits.max_open_positions {
            reasons.push("max_positions".to_string());
        }

        if !reasons.is_empty() {
            return RiskDecision::Rejected { reasons };
        }

        let tier = SizingTier::classify(token_age_secs, opportunity.scores.composite, opportunity.confidence);
        let notional = candidate_notional(portfolio.nav, portfolio.cash_reserve, tier, &self.portfolio_limits);
        if notional <= 0.0 {
            return RiskDecision::Rejected { reasons: vec!["insufficient_cash".to_string()] };
        }

        let components = RiskComponents {
            portfolio_risk: portfolio_risk(portfolio, &self.portfolio_limits),
            token_risk: token_risk(security, token_liquidity, &self.token_limits),
            position_risk: position_risk(portfolio, &self.portfolio_limits),
            market_risk: market_risk(opportunity),
        };
        let composite = composite_risk_score(&components);
        if composite > COMPOSITE_RISK_REJECT_THRESHOLD {
            return RiskDecision::Rejected { reasons: vec!["composite_risk_too_high".to_string()] };
        }

        self.assessment_cache.insert(opportunity.token_id.clone(), Instant::now());

        let slippage = slippage_preset_for(notional);
        let intent = TradeIntent::new(
            opportunity.token_id.clone(),
            notional,
            slippage.max_bps(),
            "risk_approved",
            OpportunityRef {
                composite: opportunity.scores.composite,
                confidence: opportunity.confidence,
                recommendation: opportunity.recommendation,
            },
        );
        RiskDecision::Approved(intent)
    }

    fn check_tie_break(&self, opportunity: &Opportunity) -> Option<RiskDecision> {
        let now = Instant::now();
        let mut ignore = false;
        self.tie_break
            .entry(opportunity.token_id.clone())
            .and_modify(|(at, composite)| {
                if at.elapsed() < TIE_BREAK_WINDOW && opportunity.scores.composite <= *composite {
                    ignore = true;
                } else {
                    *at = now;
                    *composite = opportunity.scores.composite;
                }
            })
            .or_insert((now, opportunity.scores.composite));
        if ignore {
            Some(RiskDecision::Ignored)
        } else {
            None
        }
    }
}

fn portfolio_risk(p: &PortfolioView, limits: &PortfolioLimits) -> f64 {
    let drawdown_ratio = (p.drawdown_pct / limits.max_drawdown_pct).clamp(0.0, 1.0);
    let daily_loss_ratio = ((-p.daily_pnl_pct).max(0.0) / limits.max_daily_loss_pct).clamp(0.0, 1.0);
    ((drawdown_ratio + daily_loss_ratio) / 2.0) * 10.0
}

fn token_risk(security: Option<&SecurityInfo>, liquidity: Option<f64>, limits: &TokenLimits) -> f64 {
    let mut risk = match security {
        Some(s) => {
            let mut r = s.top_holder_concentration_percent.unwrap_or(0.0) / limits.max_top10_holdings_pct * 5.0;
            if s.mint_authority_present.unwrap_or(false) {
                r += 2.0;
            }
            r
        }
        None => 5.0,
    };
    let liquidity_ratio = liquidity
        .map(|l| (limits.min_liquidity_quote / l.max(1.0)).clamp(0.0, 1.0))
        .unwrap_or(1.0);
    risk += liquidity_ratio * 3.0;
    risk.clamp(0.0, 10.0)
}

fn position_risk(p: &PortfolioView, limits: &PortfolioLimits) -> f64 {
    (p.open_positions as f64 / limits.max_open_positions as f64 * 10.0).clamp(0.0, 10.0)
}

fn market_risk(opportunity: &Opportunity) -> f64 {
    ((100.0 - opportunity.scores.market) / 10.0).clamp(0.0, 10.0)
}

fn slippage_preset_for(notional: f64) -> SlippagePreset {
    if notional < 1.0 {
        SlippagePreset::Small
    } else if notional < 10.0 {
        SlippagePreset::Medium
    } else {
        SlippagePreset::Large
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, Timestamp};
    use crate::types::{Confidence, SubScores};

    fn portfolio() -> PortfolioView {
        PortfolioView { nav: 100.0, cash_reserve: 80.0, open_positions: 1, daily_pnl_pct: 0.0, drawdown_pct: 0.0 }
    }

    fn opportunity(token: &str, composite: f64, confidence: Confidence, recommendation: Recommendation) -> Opportunity {
        let clock = Clock::new();
        Opportunity {
            token_id: TokenId::new(token).unwrap(),
            symbol: None,
            scores: SubScores { technical: 50.0, fundamental: 70.0, security: 90.0, neural: None, market: 70.0, whale: None, social: None, composite },
            confidence,
            recommendation,
            reasons: vec![],
            analysis_ms: 5,
            produced_at: Timestamp::now(&clock),
            market_price: Some(1.0),
        }
    }

    #[test]
    fn liquidity_exactly_at_threshold_is_accepted() {
        let rm = RiskManager::new(PortfolioLimits::default(), TokenLimits { min_liquidity_quote: 5_000.0, ..Default::default() }, false);
        let opp = opportunity("T1", 82.0, 0.8, Recommendation::StrongBuy);
        let security = SecurityInfo { mint_authority_present: Some(false), freeze_authority_present: Some(false), lp_burned_percent: Some(95.0), top_holder_concentration_percent: Some(40.0) };
        let decision = rm.evaluate(&opp, &portfolio(), 7200, Some(&security), Some(5_000.0));
        assert!(matches!(decision, RiskDecision::Approved(_)));
    }

    #[test]
    fn liquidity_below_threshold_by_one_unit_is_rejected() {
        let rm = RiskManager::new(PortfolioLimits::default(), TokenLimits { min_liquidity_quote: 5_000.0, ..Default::default() }, false);
        let opp = opportunity("T1", 82.0, 0.8, Recommendation::StrongBuy);
        let security = SecurityInfo { mint_authority_present: Some(false), freeze_authority_present: Some(false), lp_burned_percent: Some(95.0), top_holder_concentration_percent: Some(40.0) };
        let decision = rm.evaluate(&opp, &portfolio(), 7200, Some(&security), Some(4_999.0));
        match decision {
            RiskDecision::Rejected { reasons } => assert!(reasons.contains(&"low_liquidity".to_string())),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn hard_security_flag_rejects_with_reason() {
        let rm = RiskManager::new(PortfolioLimits::default(), TokenLimits::default(), false);
        let opp = opportunity("T2", 40.0, 0.5, Recommendation::Avoid);
        let security = SecurityInfo { mint_authority_present: Some(false), freeze_authority_present: Some(true), lp_burned_percent: Some(10.0), top_holder_concentration_percent: Some(80.0) };
        let decision = rm.evaluate(&opp, &portfolio(), 60, Some(&security), Some(50_000.0));
        match decision {
            RiskDecision::Rejected { reasons } => assert!(reasons.contains(&"hard_security_flag".to_string())),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn max_open_positions_reached_rejects_next_intent() {
        let limits = PortfolioLimits { max_open_positions: 1, ..Default::default() };
        let rm = RiskManager::new(limits, TokenLimits::default(), false);
        let opp = opportunity("T3", 82.0, 0.8, Recommendation::StrongBuy);
        let security = SecurityInfo { mint_authority_present: Some(false), freeze_authority_present: Some(false), lp_burned_percent: Some(95.0), top_holder_concentration_percent: Some(40.0) };
        let full_portfolio = PortfolioView { open_positions: 1, ..portfolio() };
        let decision = rm.evaluate(&opp, &full_portfolio, 7200, Some(&security), Some(50_000.0));
        match decision {
            RiskDecision::Rejected { reasons } => assert!(reasons.contains(&"max_positions".to_string())),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn later_opportunity_within_one_second_is_ignored_unless_strictly_greater() {
        let rm = RiskManager::new(PortfolioLimits::default(), TokenLimits::default(), false);
        let security = SecurityInfo { mint_authority_present: Some(false), freeze_authority_present: Some(false), lp_burned_percent: Some(95.0), top_holder_concentration_percent: Some(40.0) };
        let first = opportunity("T4", 70.0, 0.8, Recommendation::Buy);
        let _ = rm.evaluate(&first, &portfolio(), 7200, Some(&security), Some(50_000.0));

        let equal = opportunity("T4", 70.0, 0.8, Recommendation::Buy);
        assert!(matches!(rm.evaluate(&equal, &portfolio(), 7200, Some(&security), Some(50_000.0)), RiskDecision::Ignored));

        let higher = opportunity("T4", 76.0, 0.8, Recommendation::Buy);
        assert!(!matches!(rm.evaluate(&higher, &portfolio(), 7200, Some(&security), Some(50_000.0)), RiskDecision::Ignored));
    }

    #[test]
    fn hold_recommendation_is_rejected_without_sizing() {
        let rm = RiskManager::new(PortfolioLimits::default(), TokenLimits::default(), false);
        let security = SecurityInfo { mint_authority_present: Some(false), freeze_authority_present: Some(false), lp_burned_percent: Some(95.0), top_holder_concentration_percent: Some(40.0) };
        let opp = opportunity("T6", 50.0, 0.6, Recommendation::Hold);
        let decision = rm.evaluate(&opp, &portfolio(), 7200, Some(&security), Some(50_000.0));
        match decision {
            RiskDecision::Rejected { reasons } => assert!(reasons.contains(&"recommendation_below_threshold".to_string())),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn risky_recommendation_is_approved_when_explicitly_allowed() {
        let rm = RiskManager::new(PortfolioLimits::default(), TokenLimits::default(), true);
        let security = SecurityInfo { mint_authority_present: Some(false), freeze_authority_present: Some(false), lp_burned_percent: Some(95.0), top_holder_concentration_percent: Some(40.0) };
        let opp = opportunity("T7", 82.0, 0.8, Recommendation::Risky);
        let decision = rm.evaluate(&opp, &portfolio(), 7200, Some(&security), Some(50_000.0));
        assert!(matches!(decision, RiskDecision::Approved(_)));
    }

    #[test]
    fn open_failure_blocks_reapproval_within_cooldown() {
        let rm = RiskManager::new(PortfolioLimits::default(), TokenLimits::default(), false);
        let security = SecurityInfo { mint_authority_present: Some(false), freeze_authority_present: Some(false), lp_burned_percent: Some(95.0), top_holder_concentration_percent: Some(40.0) };
        let opp = opportunity("T5", 82.0, 0.8, Recommendation::StrongBuy);
        rm.record_open_failure(&opp.token_id);
        let decision = rm.evaluate(&opp, &portfolio(), 7200, Some(&security), Some(50_000.0));
        match decision {
            RiskDecision::Rejected { reasons } => assert!(reasons.contains(&"recent_open_failure".to_string())),
            other => panic!("expected rejection, got {other:?}"),
        }
    }
}
