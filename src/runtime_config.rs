// =============================================================================
// Runtime Configuration — Hot-reloadable engine settings with atomic save
// =============================================================================
//
// Central configuration hub: every tunable named across spec.md §4 (pool
// size, TTLs, composite weights, portfolio/token limits, sizing, backoff,
// cooldown) lives here instead of scattered module-local constants, so the
// engine can be reconfigured without a rebuild.
//
// Persistence uses the same atomic tmp+rename pattern the teacher's
// `runtime_config.rs` established. Every field carries `#[serde(default =
// "...")]` so that adding new fields never breaks loading an older config
// file.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analyzer::scoring::ScoreWeights;
use crate::executor::{DEFAULT_MAX_HOLD_MS, DEFAULT_TAKE_PROFIT_PCT, MAX_HOLD_CAP_MS};
use crate::risk::sizing::{PortfolioLimits, TokenLimits};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_analyzer_pool_size() -> usize {
    crate::analyzer::DEFAULT_POOL_SIZE
}

fn default_max_analysis_age_secs() -> u64 {
    60
}

fn default_soft_timeout_secs() -> u64 {
    15
}

fn default_security_ttl_secs() -> u64 {
    3_600
}

fn default_market_ttl_secs() -> u64 {
    60
}

fn default_price_ttl_secs() -> u64 {
    300
}

fn default_cooldown_window_secs() -> u64 {
    300
}

fn default_cooldown_preempt_delta() -> f64 {
    5.0
}

fn default_rate_limiter_capacity() -> u32 {
    10
}

fn default_rate_limiter_refill_secs() -> u64 {
    1
}

fn default_initial_capital() -> f64 {
    1_000.0
}

fn default_stop_loss_pct() -> f64 {
    crate::executor::DEFAULT_STOP_LOSS_PCT
}

fn default_take_profit_pct() -> f64 {
    DEFAULT_TAKE_PROFIT_PCT
}

fn default_max_hold_secs() -> i64 {
    DEFAULT_MAX_HOLD_MS / 1_000
}

fn default_max_hold_cap_secs() -> i64 {
    MAX_HOLD_CAP_MS / 1_000
}

fn default_fee_bps() -> u32 {
    0
}

fn default_token_cache_max_entries() -> usize {
    crate::token_cache::DEFAULT_MAX_ENTRIES
}

fn default_ledger_capacity() -> usize {
    crate::ledger::DEFAULT_CAPACITY
}

fn default_backoff_base_secs() -> f64 {
    1.0
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_backoff_cap_secs() -> f64 {
    60.0
}

fn default_backoff_jitter() -> f64 {
    0.25
}

fn default_backoff_healthy_uptime_secs() -> f64 {
    60.0
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_heartbeat_dead_multiplier() -> u32 {
    2
}

fn default_dedup_window_secs() -> u64 {
    30
}

fn default_dedup_capacity() -> usize {
    10_000
}

fn default_queue_capacity() -> usize {
    1_024
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration. Every field has a serde default so that
/// older JSON files missing new fields still deserialize correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Analyzer Pipeline ---------------------------------------------------
    #[serde(default = "default_analyzer_pool_size")]
    pub analyzer_pool_size: usize,
    #[serde(default = "default_max_analysis_age_secs")]
    pub analyzer_max_analysis_age_secs: u64,
    #[serde(default = "default_soft_timeout_secs")]
    pub analyzer_soft_timeout_secs: u64,
    #[serde(default)]
    pub score_weights: ScoreWeights,
    #[serde(default = "default_security_ttl_secs")]
    pub security_ttl_secs: u64,
    #[serde(default = "default_market_ttl_secs")]
    pub market_ttl_secs: u64,
    #[serde(default = "default_price_ttl_secs")]
    pub price_ttl_secs: u64,
    #[serde(default = "default_cooldown_window_secs")]
    pub cooldown_window_secs: u64,
    #[serde(default = "default_cooldown_preempt_delta")]
    pub cooldown_preempt_delta: f64,
    #[serde(default = "default_rate_limiter_capacity")]
    pub rate_limiter_capacity: u32,
    #[serde(default = "default_rate_limiter_refill_secs")]
    pub rate_limiter_refill_secs: u64,

    // --- Risk Manager ---------------------------------------------------------
    #[serde(default)]
    pub portfolio_limits: PortfolioLimits,
    #[serde(default)]
    pub token_limits: TokenLimits,
    /// When `true`, a `Risky` recommendation is eligible for sizing instead
    /// of being rejected outright alongside `Avoid`/`Hold`. Defaults to
    /// `false`, matching the Buy/StrongBuy/Watch-or-above posture §9 asks
    /// for by default.
    #[serde(default)]
    pub allow_risky_emission: bool,

    // --- Paper Executor ---------------------------------------------------------
    #[serde(default = "default_initial_capital")]
    pub initial_capital: f64,
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
    #[serde(default = "default_max_hold_secs")]
    pub max_hold_secs: i64,
    #[serde(default = "default_max_hold_cap_secs")]
    pub max_hold_cap_secs: i64,
    #[serde(default = "default_fee_bps")]
    pub fee_bps: u32,

    // --- Token Cache / Outcome Ledger -------------------------------------------
    #[serde(default = "default_token_cache_max_entries")]
    pub token_cache_max_entries: usize,
    #[serde(default = "default_ledger_capacity")]
    pub ledger_capacity: usize,

    // --- Shared Connection Fabric -----------------------------------------------
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: f64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: f64,
    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,
    #[serde(default = "default_backoff_healthy_uptime_secs")]
    pub backoff_healthy_uptime_secs: f64,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_heartbeat_dead_multiplier")]
    pub heartbeat_dead_multiplier: u32,
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    // --- Feeds -------------------------------------------------------------------
    /// Logical feed URLs; empty entries are skipped at startup with a warning
    /// rather than treated as fatal (the engine degrades to the feeds it can
    /// actually reach, per §7's "errors are local by default").
    #[serde(default)]
    pub new_pair_feed_url: String,
    #[serde(default)]
    pub whale_feed_url: String,
    #[serde(default)]
    pub cluster_feed_url: String,
    #[serde(default)]
    pub price_tracker_feed_url: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            analyzer_pool_size: default_analyzer_pool_size(),
            analyzer_max_analysis_age_secs: default_max_analysis_age_secs(),
            analyzer_soft_timeout_secs: default_soft_timeout_secs(),
            score_weights: ScoreWeights::default(),
            security_ttl_secs: default_security_ttl_secs(),
            market_ttl_secs: default_market_ttl_secs(),
            price_ttl_secs: default_price_ttl_secs(),
            cooldown_window_secs: default_cooldown_window_secs(),
            cooldown_preempt_delta: default_cooldown_preempt_delta(),
            rate_limiter_capacity: default_rate_limiter_capacity(),
            rate_limiter_refill_secs: default_rate_limiter_refill_secs(),

            portfolio_limits: PortfolioLimits::default(),
            token_limits: TokenLimits::default(),
            allow_risky_emission: false,

            initial_capital: default_initial_capital(),
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
            max_hold_secs: default_max_hold_secs(),
            max_hold_cap_secs: default_max_hold_cap_secs(),
            fee_bps: default_fee_bps(),

            token_cache_max_entries: default_token_cache_max_entries(),
            ledger_capacity: default_ledger_capacity(),

            backoff_base_secs: default_backoff_base_secs(),
            backoff_factor: default_backoff_factor(),
            backoff_cap_secs: default_backoff_cap_secs(),
            backoff_jitter: default_backoff_jitter(),
            backoff_healthy_uptime_secs: default_backoff_healthy_uptime_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            heartbeat_dead_multiplier: default_heartbeat_dead_multiplier(),
            dedup_window_secs: default_dedup_window_secs(),
            dedup_capacity: default_dedup_capacity(),
            queue_capacity: default_queue_capacity(),

            new_pair_feed_url: String::new(),
            whale_feed_url: String::new(),
            cluster_feed_url: String::new(),
            price_tracker_feed_url: String::new(),
        }
    }
}

impl RuntimeConfig {
    /// Loads configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content).with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(path = %path.display(), analyzer_pool_size = config.analyzer_pool_size, "runtime config loaded");

        Ok(config)
    }

    /// Persists the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self).context("failed to serialize runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content).with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path).with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.analyzer_pool_size, 4);
        assert_eq!(cfg.analyzer_soft_timeout_secs, 15);
        assert_eq!(cfg.security_ttl_secs, 3_600);
        assert_eq!(cfg.market_ttl_secs, 60);
        assert_eq!(cfg.price_ttl_secs, 300);
        assert!((cfg.stop_loss_pct - 0.15).abs() < f64::EPSILON);
        assert!((cfg.take_profit_pct - 0.50).abs() < f64::EPSILON);
        assert_eq!(cfg.max_hold_secs, 8 * 60 * 60);
        assert_eq!(cfg.max_hold_cap_secs, 24 * 60 * 60);
        assert_eq!(cfg.portfolio_limits.max_open_positions, 10);
        assert_eq!(cfg.token_limits.min_holder_count, 20);
    }

    #[test]
    fn deserialize_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.analyzer_pool_size, 4);
        assert_eq!(cfg.token_cache_max_entries, crate::token_cache::DEFAULT_MAX_ENTRIES);
        assert_eq!(cfg.ledger_capacity, crate::ledger::DEFAULT_CAPACITY);
    }

    #[test]
    fn deserialize_partial_json_fills_defaults() {
        let json = r#"{ "analyzer_pool_size": 8, "initial_capital": 5000.0 }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.analyzer_pool_size, 8);
        assert!((cfg.initial_capital - 5000.0).abs() < f64::EPSILON);
        assert_eq!(cfg.analyzer_soft_timeout_secs, 15);
        assert_eq!(cfg.rate_limiter_capacity, 10);
    }

    #[test]
    fn roundtrip_serialization() {
        let cfg = RuntimeConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.analyzer_pool_size, cfg2.analyzer_pool_size);
        assert!((cfg.initial_capital - cfg2.initial_capital).abs() < f64::EPSILON);
        assert_eq!(cfg.portfolio_limits.max_open_positions, cfg2.portfolio_limits.max_open_positions);
    }

    #[test]
    fn atomic_save_and_load_round_trip() {
        let dir = std::env::temp_dir().join(format!("nova-pulse-config-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("runtime_config.json");

        let mut cfg = RuntimeConfig::default();
        cfg.analyzer_pool_size = 6;
        cfg.save(&path).unwrap();

        let loaded = RuntimeConfig::load(&path).unwrap();
        assert_eq!(loaded.analyzer_pool_size, 6);

        std::fs::remove_dir_all(&dir).ok();
    }
}
