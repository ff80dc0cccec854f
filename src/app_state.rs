// =============================================================================
// Central Application State
// =============================================================================
//
// The single source of truth for the engine. Every subsystem owns its own
// interior mutability (DashMap shards, parking_lot locks, atomics);
// `AppState` only holds the `Arc`s that tie them together, mirroring the
// teacher's `AppState` (one `Arc<RwLock<RuntimeConfig>>` plus one field per
// subsystem engine) generalized to this crate's nine components.
// =============================================================================

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::analyzer::snapshots::SnapshotProvider;
use crate::analyzer::{Analyzer, AnalyzerConfig};
use crate::clock::{Clock, SeqSource};
use crate::control::{channel as control_channel, ControlReceiver, ControlSender};
use crate::executor::{ExecutorConfig, PaperExecutor};
use crate::ledger::OutcomeLedger;
use crate::risk::RiskManager;
use crate::runtime_config::RuntimeConfig;
use crate::scf::SharedConnectionFabric;
use crate::token_cache::TokenCache;
use crate::types::{ClosedTrade, Opportunity};

/// Central application state shared across every async task via
/// `Arc<AppState>`.
pub struct AppState {
    pub clock: Arc<Clock>,
    pub seq_source: Arc<SeqSource>,
    pub token_cache: Arc<TokenCache>,
    pub fabric: Arc<SharedConnectionFabric>,
    pub analyzer: Arc<Analyzer>,
    pub risk_manager: Arc<RiskManager>,
    pub executor: Arc<PaperExecutor>,
    pub ledger: Arc<OutcomeLedger>,
    pub control_sender: ControlSender,

    /// Opportunities the Analyzer emits; `main.rs` fans them out to the
    /// Risk Manager and the Paper Executor's Deterioration tracker.
    pub opportunity_rx: parking_lot::Mutex<Option<mpsc::Receiver<Opportunity>>>,
    /// Closed trades the Paper Executor emits; `main.rs` fans them into the
    /// Outcome Ledger and back into the Risk Manager's breaker accounting.
    pub closed_trade_rx: parking_lot::Mutex<Option<mpsc::Receiver<ClosedTrade>>>,
}

impl AppState {
    /// Constructs every subsystem from `config` and wires the channels
    /// between them. Returns the state plus the `ControlReceiver` half the
    /// caller drives in its own control-plane task.
    pub fn new(config: &RuntimeConfig) -> (Arc<Self>, ControlReceiver) {
        let clock = Arc::new(Clock::new());
        let seq_source = Arc::new(SeqSource::new());
        let token_cache = Arc::new(TokenCache::new(config.token_cache_max_entries));
        let fabric = Arc::new(SharedConnectionFabric::new());

        let (opportunity_tx, opportunity_rx) = mpsc::channel(1024);
        let analyzer_config = AnalyzerConfig {
            pool_size: config.analyzer_pool_size,
            max_analysis_age: std::time::Duration::from_secs(config.analyzer_max_analysis_age_secs),
            soft_timeout: std::time::Duration::from_secs(config.analyzer_soft_timeout_secs),
            weights: config.score_weights.clone(),
        };
        let limiter = Arc::new(crate::analyzer::ratelimit::ProviderRateLimiter::new(
            config.rate_limiter_capacity,
            std::time::Duration::from_secs(config.rate_limiter_refill_secs),
        ));
        limiter.spawn_refill_loop();
        let analyzer = Analyzer::new(analyzer_config, token_cache.clone(), limiter, no_snapshot_provider(), clock.clone(), opportunity_tx);

        let risk_manager = Arc::new(RiskManager::new(config.portfolio_limits.clone(), config.token_limits.clone(), config.allow_risky_emission));

        let (closed_trade_tx, closed_trade_rx) = mpsc::channel(1024);
        let executor_config = ExecutorConfig {
            initial_capital: config.initial_capital,
            stop_loss_pct: config.stop_loss_pct,
            take_profit_pct: config.take_profit_pct,
            max_hold_ms: config.max_hold_secs * 1_000,
            fee_bps: config.fee_bps,
            ..ExecutorConfig::default()
        };
        let executor = PaperExecutor::new(executor_config, clock.clone(), token_cache.clone(), closed_trade_tx);

        let ledger = Arc::new(OutcomeLedger::new(config.ledger_capacity));
        let (control_sender, control_receiver) = control_channel();

        let state = Arc::new(Self {
            clock,
            seq_source,
            token_cache,
            fabric,
            analyzer,
            risk_manager,
            executor,
            ledger,
            control_sender,
            opportunity_rx: parking_lot::Mutex::new(Some(opportunity_rx)),
            closed_trade_rx: parking_lot::Mutex::new(Some(closed_trade_rx)),
        });

        (state, control_receiver)
    }

    /// Takes ownership of the Opportunity receiver; panics if called twice.
    pub fn take_opportunity_rx(&self) -> mpsc::Receiver<Opportunity> {
        self.opportunity_rx.lock().take().expect("opportunity_rx already taken")
    }

    /// Takes ownership of the ClosedTrade receiver; panics if called twice.
    pub fn take_closed_trade_rx(&self) -> mpsc::Receiver<ClosedTrade> {
        self.closed_trade_rx.lock().take().expect("closed_trade_rx already taken")
    }
}

/// No security/market snapshot provider is wired by default; every fetch
/// degrades to cached/absent values with `"degraded_inputs"`, matching
/// §4.3's capability-set design (missing providers degrade, never crash).
fn no_snapshot_provider() -> Option<Arc<dyn SnapshotProvider>> {
    None
}
