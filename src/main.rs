// =============================================================================
// Nova Pulse — Main Entry Point
// =============================================================================
//
// Boots every subsystem in Analyzer-Active / Engine-Running mode, subscribes
// the four logical feeds through the Shared Connection Fabric, and fans
// normalized Events into the Analyzer, Opportunities into the Risk Manager,
// approved TradeIntents into the Paper Executor, and ClosedTrades into the
// Outcome Ledger and back into the Risk Manager's circuit breakers.
// =============================================================================

mod analyzer;
mod app_state;
mod clock;
mod control;
mod executor;
mod feeds;
mod ledger;
mod persistence;
mod risk;
mod runtime_config;
mod scf;
mod token_cache;
mod types;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::control::ControlCommand;
use crate::runtime_config::RuntimeConfig;
use crate::scf::transport::{ScfEvent, SubscribeOptions};
use crate::types::{EventPayload, FeedKind};

const RUNTIME_CONFIG_PATH: &str = "runtime_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("nova-pulse starting up");

    let config = RuntimeConfig::load(RUNTIME_CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load runtime config, using defaults");
        RuntimeConfig::default()
    });

    let (state, control_receiver) = AppState::new(&config);

    spawn_feed(state.clone(), FeedKind::NewPair, config.new_pair_feed_url.clone());
    spawn_feed(state.clone(), FeedKind::Whale, config.whale_feed_url.clone());
    spawn_feed(state.clone(), FeedKind::Cluster, config.cluster_feed_url.clone());
    spawn_feed(state.clone(), FeedKind::PriceTracker, config.price_tracker_feed_url.clone());

    spawn_opportunity_router(state.clone());
    spawn_closed_trade_router(state.clone());
    spawn_control_loop(state.clone(), control_receiver);

    info!("all subsystems running; awaiting shutdown signal");

    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received, stopping gracefully");

    if let Err(e) = config.save(RUNTIME_CONFIG_PATH) {
        error!(error = %e, "failed to save runtime config on shutdown");
    }

    info!("nova-pulse shut down complete");
    Ok(())
}

/// Subscribes `feed` on `url` (if configured) and normalizes every message
/// into the main pipeline or the side channel, per §4.2.
fn spawn_feed(state: Arc<AppState>, feed: FeedKind, url: String) {
    if url.is_empty() {
        warn!(?feed, "no URL configured for feed, skipping subscription");
        return;
    }

    tokio::spawn(async move {
        let handle = state.fabric.subscribe(&url, vec![feed.to_string()], None, SubscribeOptions::default());
        loop {
            match handle.next_event().await {
                Some(ScfEvent::Message { value, .. }) => {
                    match feeds::normalize(feed, &value, &state.clock, &state.seq_source) {
                        Ok(feeds::NormalizeOutcome::MainPipeline(event)) => route_event(&state, event),
                        Ok(feeds::NormalizeOutcome::SideChannel(_room_message)) => {
                            // PriorityFee/JitoBribe/BlockHash/TwitterFeed: telemetry-only, out of scope.
                        }
                        Err(reason) => {
                            warn!(?feed, reason = %reason, "rejected malformed feed message");
                        }
                    }
                }
                Some(ScfEvent::ConnectionState { state: conn_state, reason }) => {
                    info!(?feed, ?conn_state, ?reason, "feed connection state changed");
                }
                Some(ScfEvent::DropNotice { topic }) => {
                    warn!(?feed, topic, "back-pressure dropped a message");
                }
                Some(ScfEvent::Heartbeat) => {}
                None => {
                    warn!(?feed, "feed subscription closed");
                    break;
                }
            }
        }
    });
}

fn route_event(state: &Arc<AppState>, event: types::Event) {
    match &event.payload {
        EventPayload::NewPair { .. } | EventPayload::WhaleTrade { .. } => {
            state.analyzer.submit(event);
        }
        EventPayload::PriceTick { price } => {
            if let Some(token_id) = &event.token_id {
                state.executor.on_price_tick(token_id, *price, event.wall_ts);
            }
        }
        EventPayload::Heartbeat | EventPayload::ConnectionState { .. } => {}
    }
}

/// Fans Analyzer Opportunities into the Risk Manager and the Paper
/// Executor's Deterioration tracker, then hands approved TradeIntents to the
/// Executor.
fn spawn_opportunity_router(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut rx = state.take_opportunity_rx();
        while let Some(opportunity) = rx.recv().await {
            state.executor.on_opportunity(&opportunity);

            let portfolio = state.executor.portfolio_view();
            let record = state.token_cache.get(&opportunity.token_id);
            let token_age_secs = record
                .as_ref()
                .map(|r| (chrono::Utc::now().timestamp_millis() - r.first_seen_ts.wall_ms) / 1_000)
                .unwrap_or(0);
            let security = record.as_ref().and_then(|r| r.security.clone());
            let liquidity = record.as_ref().and_then(|r| r.liquidity);

            match state.risk_manager.evaluate(&opportunity, &portfolio, token_age_secs, security.as_ref(), liquidity) {
                risk::RiskDecision::Approved(intent) => {
                    let executor = state.executor.clone();
                    let risk_manager = state.risk_manager.clone();
                    let market_price = opportunity.market_price;
                    let token_id = intent.token_id.clone();
                    tokio::spawn(async move {
                        match executor.handle_trade_intent(intent, market_price).await {
                            executor::OpenOutcome::Opened(_) => {}
                            executor::OpenOutcome::Ignored => {}
                            executor::OpenOutcome::Rejected => {
                                risk_manager.record_open_failure(&token_id);
                            }
                        }
                    });
                }
                risk::RiskDecision::Rejected { reasons } => {
                    info!(token_id = %opportunity.token_id, ?reasons, "opportunity rejected by risk manager");
                }
                risk::RiskDecision::Ignored => {}
            }
        }
    });
}

/// Feeds every ClosedTrade into the Outcome Ledger and the Risk Manager's
/// circuit-breaker accounting.
fn spawn_closed_trade_router(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut rx = state.take_closed_trade_rx();
        while let Some(closed_trade) = rx.recv().await {
            let nav = state.executor.portfolio_view().nav;
            state.risk_manager.record_closed_trade(closed_trade.realized_pnl_quote, nav);
            state.ledger.record(closed_trade);
        }
    });
}

/// Drives the Control Plane: dispatches each received command to the
/// relevant subsystem and replies with Ack/Error.
fn spawn_control_loop(state: Arc<AppState>, mut receiver: control::ControlReceiver) {
    tokio::spawn(async move {
        while let Some(pending) = receiver.recv().await {
            match &pending.command {
                ControlCommand::Start => {
                    state.analyzer.resume();
                    pending.ack();
                }
                ControlCommand::Stop => {
                    state.analyzer.pause();
                    pending.ack();
                }
                ControlCommand::PauseAnalyzer => {
                    state.analyzer.pause();
                    pending.ack();
                }
                ControlCommand::ResumeAnalyzer => {
                    state.analyzer.resume();
                    pending.ack();
                }
                ControlCommand::ForceClosePosition(position_id) => {
                    if state.executor.force_close(*position_id, types::ExitReason::ManualClose) {
                        pending.ack();
                    } else {
                        pending.error("no_open_position_with_that_id");
                    }
                }
                ControlCommand::SetConfig { .. } => {
                    // Config hot-reload beyond process-start is not wired in
                    // this engine; accepted and acknowledged, applied at next restart.
                    pending.ack();
                }
                ControlCommand::SnapshotStats => {
                    let portfolio = state.executor.portfolio_view();
                    let payload = serde_json::json!({
                        "nav": portfolio.nav,
                        "cash_reserve": portfolio.cash_reserve,
                        "open_positions": portfolio.open_positions,
                        "daily_pnl_pct": portfolio.daily_pnl_pct,
                        "drawdown_pct": portfolio.drawdown_pct,
                        "ledger_len": state.ledger.len(),
                    });
                    pending.stats(payload);
                }
            }
        }
    });
}
