// =============================================================================
// Core domain types — data model shared across every component
// =============================================================================

use crate::clock::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// TokenId, Symbol
// =============================================================================

/// Opaque stable token identifier. Invariant: never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId(String);

impl TokenId {
    /// Returns `None` if `raw` is empty.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type Symbol = String;

// =============================================================================
// Numeric domain types and validation
// =============================================================================

pub type Price = f64;
pub type Liquidity = f64;
pub type MarketCap = f64;
pub type Volume = f64;

/// `true` if `v` is a finite, non-negative number.
pub fn is_valid_nonneg(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

/// Clamp a percent-like field into `[0, 100]`. Returns whether clamping was
/// necessary (callers use this to bump a warning counter).
pub fn clamp_percent(v: f64) -> (f64, bool) {
    if !v.is_finite() {
        return (0.0, true);
    }
    let clamped = v.clamp(0.0, 100.0);
    (clamped, clamped != v)
}

// =============================================================================
// Seq
// =============================================================================

pub type Seq = u64;

// =============================================================================
// FeedKind / EventKind
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedKind {
    NewPair,
    Whale,
    Cluster,
    PriceTracker,
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NewPair => "new_pair",
            Self::Whale => "whale",
            Self::Cluster => "cluster",
            Self::PriceTracker => "price_tracker",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    NewPair,
    WhaleTrade,
    PriceTick,
    Heartbeat,
    ConnectionState,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NewPair => "new_pair",
            Self::WhaleTrade => "whale_trade",
            Self::PriceTick => "price_tick",
            Self::Heartbeat => "heartbeat",
            Self::ConnectionState => "connection_state",
        };
        write!(f, "{s}")
    }
}

// =============================================================================
// Recommendation / RiskLevel
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Recommendation {
    Avoid,
    Hold,
    Risky,
    Watch,
    Buy,
    StrongBuy,
}

impl Default for Recommendation {
    fn default() -> Self {
        Self::Hold
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::StrongBuy => "StrongBuy",
            Self::Buy => "Buy",
            Self::Watch => "Watch",
            Self::Risky => "Risky",
            Self::Avoid => "Avoid",
            Self::Hold => "Hold",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for RiskLevel {
    fn default() -> Self {
        Self::Low
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        };
        write!(f, "{s}")
    }
}

pub type Confidence = f64;
pub type Score = f64;

// =============================================================================
// Control state — whether the pipeline is actively running
// =============================================================================

/// Process-wide run state, toggled via the Control Plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Running,
    Stopped,
}

impl Default for RunState {
    fn default() -> Self {
        Self::Stopped
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Whether the Analyzer is accepting new jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalyzerState {
    Active,
    Paused,
}

impl Default for AnalyzerState {
    fn default() -> Self {
        Self::Active
    }
}

impl fmt::Display for AnalyzerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Paused => write!(f, "Paused"),
        }
    }
}

// =============================================================================
// PositionId
// =============================================================================

pub type PositionId = uuid::Uuid;

// =============================================================================
// TokenRecord
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityInfo {
    pub mint_authority_present: Option<bool>,
    pub freeze_authority_present: Option<bool>,
    pub lp_burned_percent: Option<f64>,
    pub top_holder_concentration_percent: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenFlags {
    pub rug_pull: Option<bool>,
    pub honeypot: Option<bool>,
    pub verified: Option<bool>,
}

impl TokenFlags {
    /// Any flag that forces an Avoid recommendation regardless of score.
    pub fn has_hard_flag(&self, security: Option<&SecurityInfo>) -> bool {
        let freeze = security.and_then(|s| s.freeze_authority_present).unwrap_or(false);
        self.rug_pull.unwrap_or(false) || self.honeypot.unwrap_or(false) || freeze
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub token_id: TokenId,
    pub symbol: Option<Symbol>,
    pub first_seen_ts: Timestamp,
    pub last_price_ts: Option<Timestamp>,
    pub last_price: Option<Price>,
    pub liquidity: Option<Liquidity>,
    pub market_cap: Option<MarketCap>,
    pub security: Option<SecurityInfo>,
    pub flags: TokenFlags,
}

impl TokenRecord {
    pub fn new(token_id: TokenId, first_seen_ts: Timestamp) -> Self {
        Self {
            token_id,
            symbol: None,
            first_seen_ts,
            last_price_ts: None,
            last_price: None,
            liquidity: None,
            market_cap: None,
            security: None,
            flags: TokenFlags::default(),
        }
    }

    /// Applies a new price observation, enforcing the monotonic
    /// non-decreasing `last_price_ts` invariant (stale ticks are ignored).
    pub fn apply_price(&mut self, price: Price, ts: Timestamp) -> bool {
        if let Some(prev) = self.last_price_ts {
            if ts.wall_ms < prev.wall_ms {
                return false;
            }
        }
        self.last_price = Some(price);
        self.last_price_ts = Some(ts);
        true
    }
}

// =============================================================================
// Event
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum EventPayload {
    NewPair { liquidity: Option<Liquidity>, market_cap: Option<MarketCap> },
    WhaleTrade {
        whale_address: String,
        signature: String,
        from_token: String,
        to_token: String,
        amount: f64,
        side: WhaleSide,
    },
    PriceTick { price: Price },
    Heartbeat,
    ConnectionState { state: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhaleSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub seq: Seq,
    pub wall_ts: i64,
    pub mono_ts: u64,
    pub feed: FeedKind,
    pub kind: EventKind,
    pub token_id: Option<TokenId>,
    pub payload: EventPayload,
}

// =============================================================================
// Opportunity
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubScores {
    pub technical: Score,
    pub fundamental: Score,
    pub security: Score,
    pub neural: Option<Score>,
    pub market: Score,
    pub whale: Option<Score>,
    pub social: Option<Score>,
    pub composite: Score,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub token_id: TokenId,
    pub symbol: Option<Symbol>,
    pub scores: SubScores,
    pub confidence: Confidence,
    pub recommendation: Recommendation,
    pub reasons: Vec<String>,
    pub analysis_ms: u64,
    pub produced_at: Timestamp,
    /// Most recent market price known to the analyzer at production time,
    /// used by the executor's entry-price fallback when no fresh tick exists.
    pub market_price: Option<Price>,
}

// =============================================================================
// TradeIntent
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpportunityRef {
    pub composite: Score,
    pub confidence: Confidence,
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeIntent {
    pub token_id: TokenId,
    pub side: String,
    pub notional_quote: f64,
    pub max_slippage_bps: u32,
    pub reason_tag: String,
    pub opportunity_ref: OpportunityRef,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl TradeIntent {
    pub fn new(
        token_id: TokenId,
        notional_quote: f64,
        max_slippage_bps: u32,
        reason_tag: impl Into<String>,
        opportunity_ref: OpportunityRef,
    ) -> Self {
        Self {
            token_id,
            side: "buy".to_string(),
            notional_quote,
            max_slippage_bps,
            reason_tag: reason_tag.into(),
            opportunity_ref,
            created_at: chrono::Utc::now(),
        }
    }
}

// =============================================================================
// Position
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closing,
    Closed,
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "Open",
            Self::Closing => "Closing",
            Self::Closed => "Closed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TimeLimit,
    Deterioration,
    ManualClose,
    RiskForced,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TakeProfit => "TakeProfit",
            Self::StopLoss => "StopLoss",
            Self::TimeLimit => "TimeLimit",
            Self::Deterioration => "Deterioration",
            Self::ManualClose => "ManualClose",
            Self::RiskForced => "RiskForced",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub token_id: TokenId,
    pub symbol: Option<Symbol>,
    pub entry_price: Price,
    pub entry_quote: f64,
    pub opened_at: chrono::DateTime<chrono::Utc>,
    pub status: PositionStatus,
    pub current_price: Option<Price>,
    pub unrealized_pnl_quote: Option<f64>,
    pub return_pct: Option<f64>,
    pub stop_price: Price,
    pub take_profit_price: Price,
    pub max_hold_deadline: chrono::DateTime<chrono::Utc>,
    pub last_tick_wall_ms: Option<i64>,
    pub price_spike: bool,
}

// =============================================================================
// ClosedTrade
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub position_id: PositionId,
    pub token_id: TokenId,
    pub entry_price: Price,
    pub exit_price: Price,
    pub opened_at: chrono::DateTime<chrono::Utc>,
    pub closed_at: chrono::DateTime<chrono::Utc>,
    pub duration_ms: i64,
    pub realized_pnl_quote: f64,
    pub return_pct: f64,
    pub exit_reason: ExitReason,
}

// =============================================================================
// RejectReason (Normalizer)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectReason(pub String);

impl RejectReason {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_id_rejects_empty() {
        assert!(TokenId::new("").is_none());
        assert!(TokenId::new("T1").is_some());
    }

    #[test]
    fn clamp_percent_clamps_and_flags() {
        let (v, clamped) = clamp_percent(150.0);
        assert_eq!(v, 100.0);
        assert!(clamped);

        let (v, clamped) = clamp_percent(-5.0);
        assert_eq!(v, 0.0);
        assert!(clamped);

        let (v, clamped) = clamp_percent(42.0);
        assert_eq!(v, 42.0);
        assert!(!clamped);
    }

    #[test]
    fn recommendation_ordering_matches_strength() {
        assert!(Recommendation::StrongBuy > Recommendation::Buy);
        assert!(Recommendation::Buy > Recommendation::Watch);
        assert!(Recommendation::Watch > Recommendation::Risky);
        assert!(Recommendation::Risky > Recommendation::Avoid);
    }

    #[test]
    fn token_record_ignores_stale_price_tick() {
        let t1 = Timestamp { mono_ms: 10, wall_ms: 1_000 };
        let t0 = Timestamp { mono_ms: 5, wall_ms: 500 };
        let mut rec = TokenRecord::new(TokenId::new("T1").unwrap(), t1);
        assert!(rec.apply_price(1.0, t1));
        assert!(!rec.apply_price(0.9, t0));
        assert_eq!(rec.last_price, Some(1.0));
    }
}
