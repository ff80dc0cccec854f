// =============================================================================
// Position sizing, portfolio limits, and composite risk score
// =============================================================================
//
// Grounded on `risk.rs::RiskEngine`'s percentage-of-capital style (every
// limit expressed as a fraction of NAV, computed fresh from a snapshot)
// and `signals/weighted_score.rs`'s weighted-sum idiom, reused here for
// the composite risk score's four weighted components.
// =============================================================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioLimits {
    pub max_daily_loss_pct: f64,
    pub max_weekly_loss_pct: f64,
    pub max_drawdown_pct: f64,
    pub min_cash_reserve_pct: f64,
    pub max_single_position_pct: f64,
    pub max_correlated_exposure_pct: f64,
    pub max_open_positions: usize,
}

impl Default for PortfolioLimits {
    fn default() -> Self {
        Self {
            max_daily_loss_pct: 5.0,
            max_weekly_loss_pct: 15.0,
            max_drawdown_pct: 20.0,
            min_cash_reserve_pct: 20.0,
            max_single_position_pct: 10.0,
            max_correlated_exposure_pct: 25.0,
            max_open_positions: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenLimits {
    pub min_liquidity_quote: f64,
    pub max_dev_holdings_pct: f64,
    pub max_top10_holdings_pct: f64,
    pub max_bundler_pct: f64,
    pub min_holder_count: u32,
    pub min_age_sec: i64,
    pub max_price_impact_pct: f64,
}

impl Default for TokenLimits {
    fn default() -> Self {
        Self {
            min_liquidity_quote: 5_000.0,
            max_dev_holdings_pct: 5.0,
            max_top10_holdings_pct: 70.0,
            max_bundler_pct: 30.0,
            min_holder_count: 20,
            min_age_sec: 1_800,
            max_price_impact_pct: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlippagePreset {
    Small,
    Medium,
    Large,
}

impl SlippagePreset {
    pub fn max_bps(self) -> u32 {
        match self {
            Self::Small => 500,
            Self::Medium => 500,
            Self::Large => 2_000,
        }
    }
}

/// Position sizing tier, selected by token age and opportunity quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingTier {
    New,
    Established,
    HighConfidence,
}

impl SizingTier {
    /// Classifies a candidate per §4.4's dynamic sizing table: a
    /// high-confidence signal overrides age-based tiering.
    pub fn classify(token_age_secs: i64, composite: f64, confidence: f64) -> Self {
        if composite >= 80.0 && confidence >= 0.85 {
            Self::HighConfidence
        } else if token_age_secs > 86_400 {
            Self::Established
        } else {
            Self::New
        }
    }

    pub fn max_nav_pct(self) -> f64 {
        match self {
            Self::New => 1.0,
            Self::Established => 3.0,
            Self::HighConfidence => 5.0,
        }
    }
}

/// Components feeding the composite risk score, each already normalized to
/// `[0, 10]` by the caller.
pub struct RiskComponents {
    pub portfolio_risk: f64,
    pub token_risk: f64,
    pub position_risk: f64,
    pub market_risk: f64,
}

pub const COMPOSITE_RISK_REJECT_THRESHOLD: f64 = 7.0;

/// Composite risk score = 0.30 portfolio + 0.35 token + 0.20 position + 0.15 market.
pub fn composite_risk_score(c: &RiskComponents) -> f64 {
    (0.30 * c.portfolio_risk + 0.35 * c.token_risk + 0.20 * c.position_risk + 0.15 * c.market_risk).clamp(0.0, 10.0)
}

/// Candidate notional, clamped by the sizing tier's NAV percentage, the
/// portfolio's max-single-position limit, and available cash.
pub fn candidate_notional(nav: f64, available_cash: f64, tier: SizingTier, portfolio: &PortfolioLimits) -> f64 {
    let tier_cap = nav * (tier.max_nav_pct() / 100.0);
    let portfolio_cap = nav * (portfolio.max_single_position_pct / 100.0);
    tier_cap.min(portfolio_cap).min(available_cash).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_confidence_overrides_age_tiering() {
        let tier = SizingTier::classify(60, 82.0, 0.9);
        assert_eq!(tier, SizingTier::HighConfidence);
        assert_eq!(tier.max_nav_pct(), 5.0);
    }

    #[test]
    fn new_token_capped_at_one_percent_nav() {
        let tier = SizingTier::classify(60, 50.0, 0.5);
        assert_eq!(tier, SizingTier::New);
        assert_eq!(tier.max_nav_pct(), 1.0);
    }

    #[test]
    fn composite_risk_score_rejects_above_seven() {
        let components = RiskComponents { portfolio_risk: 9.0, token_risk: 9.0, position_risk: 9.0, market_risk: 9.0 };
        assert!(composite_risk_score(&components) > COMPOSITE_RISK_REJECT_THRESHOLD);
    }

    #[test]
    fn candidate_notional_respects_portfolio_cap_over_tier_cap() {
        let portfolio = PortfolioLimits { max_single_position_pct: 2.0, ..Default::default() };
        let notional = candidate_notional(100.0, 100.0, SizingTier::HighConfidence, &portfolio);
        assert!((notional - 2.0).abs() < 1e-9);
    }

    #[test]
    fn candidate_notional_respects_available_cash() {
        let portfolio = PortfolioLimits::default();
        let notional = candidate_notional(100.0, 0.5, SizingTier::HighConfidence, &portfolio);
        assert!((notional - 0.5).abs() < 1e-9);
    }
}
