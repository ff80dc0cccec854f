// =============================================================================
// Composite scoring — weighted sub-score average, confidence, recommendation
// =============================================================================
//
// Grounded on `signals/weighted_score.rs::WeightedScorer`: a named weight map
// applied to named signal contributions, summed into a composite and mapped
// to a decision through a threshold. Generalized here from a single BUY/SELL
// score to the full sub-score set and renormalization-over-available-inputs
// the spec requires, with confidence and recommendation layered on top in
// the style of `risk.rs::compute_risk_mode`'s tiered if/else-if ladder.
// =============================================================================

use crate::types::{Recommendation, RiskLevel, Score, SubScores};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub technical: f64,
    pub fundamental: f64,
    pub security: f64,
    pub neural: f64,
    pub market: f64,
    pub whale: f64,
    pub other: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            technical: 0.14,
            fundamental: 0.14,
            security: 0.18,
            neural: 0.14,
            market: 0.10,
            whale: 0.10,
            other: 0.20,
        }
    }
}

/// One named sub-score input, possibly missing.
pub struct NamedScore {
    pub name: &'static str,
    pub weight: f64,
    pub value: Option<Score>,
}

/// Computes the composite score: a weighted average over sub-scores where a
/// missing input contributes a neutral 50 at its full weight rather than
/// being dropped from the denominator, so one missing input cannot inflate
/// the weight of the ones that are present. Returns the composite plus the
/// reasons accumulated for missing inputs (`"missing_<name>"`).
pub fn composite_score(inputs: &[NamedScore]) -> (Score, Vec<String>) {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    let mut reasons = Vec::new();

    for input in inputs {
        match input.value {
            Some(v) => {
                weighted_sum += v * input.weight;
                weight_total += input.weight;
            }
            None => {
                // Missing inputs contribute a neutral 50 at full weight so
                // the composite reflects "unknown, assume average" rather
                // than being silently dropped from the denominator.
                weighted_sum += 50.0 * input.weight;
                weight_total += input.weight;
                reasons.push(format!("missing_{}", input.name));
            }
        }
    }

    let composite = if weight_total > 0.0 { weighted_sum / weight_total } else { 50.0 };
    (composite.clamp(0.0, 100.0), reasons)
}

pub fn default_named_scores(scores: &SubScores, weights: &ScoreWeights) -> Vec<NamedScore> {
    vec![
        NamedScore { name: "technical", weight: weights.technical, value: Some(scores.technical) },
        NamedScore { name: "fundamental", weight: weights.fundamental, value: Some(scores.fundamental) },
        NamedScore { name: "security", weight: weights.security, value: Some(scores.security) },
        NamedScore { name: "neural", weight: weights.neural, value: scores.neural },
        NamedScore { name: "market", weight: weights.market, value: Some(scores.market) },
        NamedScore { name: "whale", weight: weights.whale, value: scores.whale },
        NamedScore { name: "social", weight: weights.other, value: scores.social },
    ]
}

/// Confidence: base 0.5 with bonuses, clamped to [0.1, 0.95].
pub fn confidence(
    security_present_and_fresh: bool,
    neural_present: bool,
    market_present: bool,
    signal_count: usize,
    sub_score_variance: f64,
) -> f64 {
    let mut c = 0.5;
    if security_present_and_fresh {
        c += 0.15;
    }
    if neural_present {
        c += 0.10;
    }
    if market_present {
        c += 0.10;
    }
    if signal_count >= 4 {
        c += 0.10;
    }
    if sub_score_variance < 400.0 {
        c += 0.10;
    }
    c.clamp(0.1, 0.95)
}

/// Population variance of the available sub-scores (ignores missing ones).
pub fn sub_score_variance(values: &[Score]) -> f64 {
    if values.is_empty() {
        return f64::MAX;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

/// Strict recommendation thresholds per spec §4.3. `hard_flag` forces Avoid
/// regardless of score.
pub fn recommend(composite: Score, confidence: f64, risk: RiskLevel, hard_flag: bool) -> Recommendation {
    if hard_flag {
        return Recommendation::Avoid;
    }
    if composite >= 80.0 && risk < RiskLevel::High && confidence >= 0.75 {
        Recommendation::StrongBuy
    } else if composite >= 65.0 && risk <= RiskLevel::Medium {
        Recommendation::Buy
    } else if composite >= 50.0 {
        Recommendation::Watch
    } else if composite >= 30.0 {
        Recommendation::Risky
    } else {
        Recommendation::Avoid
    }
}
