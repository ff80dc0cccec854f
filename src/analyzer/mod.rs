// =============================================================================
// Analyzer Pipeline — bounded worker pool turning events into Opportunities
// =============================================================================
//
// Grounded on `strategy.rs`'s single-entry "evaluate one signal, emit one
// decision" shape and `arena/mod.rs`'s per-key serialization idiom, combined
// here into the spec's bounded-pool-with-per-token-serialization model: a
// `tokio::sync::Semaphore` caps total concurrency at P, a `busy` set
// enforces at-most-one-in-flight-per-token, and a one-slot `pending` map
// implements "coalesce into the running job, else queue the latest and
// drop the older" without an unbounded per-token backlog.
// =============================================================================

pub mod cooldown;
pub mod ratelimit;
pub mod scoring;
pub mod snapshots;

use crate::clock::{Clock, Timestamp};
use crate::token_cache::TokenCache;
use crate::types::{
    AnalyzerState, Event, EventKind, EventPayload, Opportunity, RiskLevel, SubScores, TokenId,
};
use cooldown::CooldownTracker;
use dashmap::DashMap;
use parking_lot::RwLock;
use ratelimit::ProviderRateLimiter;
use scoring::ScoreWeights;
use snapshots::SnapshotProvider;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, warn};

pub const DEFAULT_POOL_SIZE: usize = 4;
pub const DEFAULT_MAX_ANALYSIS_AGE: Duration = Duration::from_secs(60);
pub const DEFAULT_SOFT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
struct AnalysisJob {
    event: Event,
    enqueued_at: Instant,
}

pub struct AnalyzerConfig {
    pub pool_size: usize,
    pub max_analysis_age: Duration,
    pub soft_timeout: Duration,
    pub weights: ScoreWeights,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            max_analysis_age: DEFAULT_MAX_ANALYSIS_AGE,
            soft_timeout: DEFAULT_SOFT_TIMEOUT,
            weights: ScoreWeights::default(),
        }
    }
}

pub struct AnalyzerStats {
    pub submitted: AtomicUsize,
    pub discarded_stale: AtomicUsize,
    pub discarded_paused: AtomicUsize,
    pub timed_out: AtomicUsize,
    pub emitted: AtomicUsize,
}

impl Default for AnalyzerStats {
    fn default() -> Self {
        Self {
            submitted: AtomicUsize::new(0),
            discarded_stale: AtomicUsize::new(0),
            discarded_paused: AtomicUsize::new(0),
            timed_out: AtomicUsize::new(0),
            emitted: AtomicUsize::new(0),
        }
    }
}

pub struct Analyzer {
    config: AnalyzerConfig,
    semaphore: Arc<Semaphore>,
    busy: Arc<DashMap<TokenId, ()>>,
    pending: Arc<DashMap<TokenId, AnalysisJob>>,
    cache: Arc<TokenCache>,
    cooldown: Arc<CooldownTracker>,
    limiter: Arc<ProviderRateLimiter>,
    provider: Option<Arc<dyn SnapshotProvider>>,
    clock: Arc<Clock>,
    opportunity_tx: mpsc::Sender<Opportunity>,
    state: Arc<RwLock<AnalyzerState>>,
    pub stats: Arc<AnalyzerStats>,
}

impl Analyzer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AnalyzerConfig,
        cache: Arc<TokenCache>,
        limiter: Arc<ProviderRateLimiter>,
        provider: Option<Arc<dyn SnapshotProvider>>,
        clock: Arc<Clock>,
        opportunity_tx: mpsc::Sender<Opportunity>,
    ) -> Arc<Self> {
        Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(config.pool_size)),
            cooldown: Arc::new(CooldownTracker::default()),
            config,
            busy: Arc::new(DashMap::new()),
            pending: Arc::new(DashMap::new()),
            cache,
            limiter,
            provider,
            clock,
            opportunity_tx,
            state: Arc::new(RwLock::new(AnalyzerState::Active)),
            stats: Arc::new(AnalyzerStats::default()),
        })
    }

    pub fn pause(&self) {
        *self.state.write() = AnalyzerState::Paused;
    }

    pub fn resume(&self) {
        *self.state.write() = AnalyzerState::Active;
    }

    pub fn state(&self) -> AnalyzerState {
        *self.state.read()
    }

    /// Submits a NewPair or WhaleTrade event for analysis. PriceTick and
    /// Heartbeat events never reach this method; the pipeline wiring routes
    /// those directly to the Paper Executor instead.
    pub fn submit(self: &Arc<Self>, event: Event) {
        if self.state() == AnalyzerState::Paused {
            self.stats.discarded_paused.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let now_wall = self.clock.wall_ms();
        if now_wall.saturating_sub(event.wall_ts) > self.config.max_analysis_age.as_millis() as i64 {
            self.stats.discarded_stale.fetch_add(1, Ordering::Relaxed);
            debug!(seq = event.seq, "discarding stale event past max_analysis_age");
            return;
        }

        let Some(token_id) = event.token_id.clone() else {
            debug!(seq = event.seq, "discarding event with no token_id");
            return;
        };

        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        let job = AnalysisJob { event, enqueued_at: Instant::now() };

        if self.busy.contains_key(&token_id) {
            self.enqueue_pending(token_id, job);
            return;
        }

        self.start_job(token_id, job);
    }

    /// Applies the NewPair-over-WhaleTrade preference to the one-slot
    /// pending queue: a NewPair already pending is never displaced by a
    /// later WhaleTrade for the same token; any other combination keeps
    /// the latest arrival (drop-older), matching the per-token
    /// last-write-wins rule in §4.3.
    fn enqueue_pending(&self, token_id: TokenId, job: AnalysisJob) {
        let incoming_is_whale = matches!(job.event.kind, EventKind::WhaleTrade);
        if incoming_is_whale {
            if let Some(existing) = self.pending.get(&token_id) {
                if matches!(existing.event.kind, EventKind::NewPair) {
                    return;
                }
            }
        }
        self.pending.insert(token_id, job);
    }

    fn start_job(self: &Arc<Self>, token_id: TokenId, job: AnalysisJob) {
        self.busy.insert(token_id.clone(), ());
        let this = self.clone();
        tokio::spawn(async move {
            let permit = this.semaphore.clone().acquire_owned().await;
            let Ok(_permit) = permit else { return };
            let mut current_token = token_id;
            let mut current_job = job;
            loop {
                this.run_job(&current_token, current_job).await;
                match this.pending.remove(&current_token) {
                    Some((_, next_job)) => {
                        current_job = next_job;
                    }
                    None => {
                        this.busy.remove(&current_token);
                        break;
                    }
                }
            }
        });
    }

    async fn run_job(self: &Arc<Self>, token_id: &TokenId, job: AnalysisJob) {
        let deadline = self.config.soft_timeout;
        match tokio::time::timeout(deadline, self.analyze(token_id, &job.event)).await {
            Ok(opportunity) => self.emit(opportunity),
            Err(_) => {
                self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
                let opportunity = self.timeout_opportunity(token_id, &job.event);
                self.emit(opportunity);
            }
        }
    }

    fn emit(&self, opportunity: Opportunity) {
        if !self.cooldown.allow(&opportunity.token_id, opportunity.scores.composite) {
            debug!(token_id = %opportunity.token_id, "opportunity suppressed by cooldown");
            return;
        }
        self.cooldown.record(&opportunity.token_id, opportunity.scores.composite);
        self.stats.emitted.fetch_add(1, Ordering::Relaxed);
        let tx = self.opportunity_tx.clone();
        let opp = opportunity;
        tokio::spawn(async move {
            let _ = tx.send(opp).await;
        });
    }

    fn timeout_opportunity(&self, token_id: &TokenId, event: &Event) -> Opportunity {
        let scores = SubScores {
            technical: 50.0,
            fundamental: 50.0,
            security: 50.0,
            neural: None,
            market: 50.0,
            whale: None,
            social: None,
            composite: 50.0,
        };
        Opportunity {
            token_id: token_id.clone(),
            symbol: None,
            scores,
            confidence: 0.2,
            recommendation: crate::types::Recommendation::Hold,
            reasons: vec!["analysis_timeout".to_string(), "degraded_inputs".to_string()],
            analysis_ms: self.config.soft_timeout.as_millis() as u64,
            produced_at: self.clock.now(),
            market_price: event_price(event),
        }
    }

    async fn analyze(self: &Arc<Self>, token_id: &TokenId, event: &Event) -> Opportunity {
        let started = Instant::now();
        let now = self.clock.now();

        self.cache.get_or_create_and_update(token_id, now, |rec| {
            if let EventPayload::NewPair { liquidity, market_cap } = &event.payload {
                if liquidity.is_some() {
                    rec.liquidity = *liquidity;
                }
                if market_cap.is_some() {
                    rec.market_cap = *market_cap;
                }
            }
        });

        let security_result =
            snapshots::resolve_security(token_id, &self.cache, now, self.provider.as_ref(), &self.limiter).await;
        let market_result = snapshots::resolve_market(
            token_id,
            &self.cache,
            now,
            self.provider.as_ref(),
            &self.limiter,
            None,
        )
        .await;

        let mut reasons = Vec::new();
        if let Some(reason) = security_result.reason {
            reasons.push(reason.to_string());
        }
        if let Some(reason) = market_result.reason {
            reasons.push(reason.to_string());
        }

        let fundamental = fundamental_score(&market_result.value);
        let market_score = market_score(&market_result.value);
        let security_score = security_result.value.as_ref().map(security_score).unwrap_or(50.0);
        if security_result.value.is_none() {
            reasons.push("missing_security".to_string());
        }
        let whale_score = match &event.payload {
            EventPayload::WhaleTrade { amount, side, .. } => Some(whale_score(*amount, *side)),
            _ => None,
        };
        if whale_score.is_none() {
            reasons.push("missing_whale".to_string());
        }
        // Neural and social signals have no configured provider in this
        // deployment; both are consistently absent.
        reasons.push("missing_neural".to_string());
        reasons.push("missing_social".to_string());

        let named = scoring::default_named_scores(
            &SubScores {
                technical: 50.0,
                fundamental,
                security: security_score,
                neural: None,
                market: market_score,
                whale: whale_score,
                social: None,
                composite: 0.0,
            },
            &self.config.weights,
        );
        let (composite, mut missing_reasons) = scoring::composite_score(&named);
        reasons.append(&mut missing_reasons);
        reasons.sort();
        reasons.dedup();

        let available: Vec<f64> = named.iter().filter_map(|n| n.value).collect();
        let variance = scoring::sub_score_variance(&available);
        let confidence = scoring::confidence(
            security_result.fresh,
            false,
            market_result.fresh,
            available.len(),
            variance,
        );

        let hard_flag = self
            .cache
            .get(token_id)
            .map(|rec| rec.flags.has_hard_flag(security_result.value.as_ref()))
            .unwrap_or(false);
        if hard_flag {
            reasons.push("freeze_authority".to_string());
        }

        let risk = risk_level_from_security(security_result.value.as_ref());
        let recommendation = scoring::recommend(composite, confidence, risk, hard_flag);

        let symbol = self.cache.get(token_id).and_then(|r| r.symbol);

        Opportunity {
            token_id: token_id.clone(),
            symbol,
            scores: SubScores {
                technical: 50.0,
                fundamental,
                security: security_score,
                neural: None,
                market: market_score,
                whale: whale_score,
                social: None,
                composite,
            },
            confidence,
            recommendation,
            reasons,
            analysis_ms: started.elapsed().as_millis() as u64,
            produced_at: self.clock.now(),
            market_price: market_result.value.and_then(|m| m.price).or_else(|| event_price(event)),
        }
    }
}

fn event_price(event: &Event) -> Option<crate::types::Price> {
    match event.payload {
        EventPayload::PriceTick { price } => Some(price),
        _ => None,
    }
}

fn fundamental_score(market: &Option<snapshots::MarketSnapshot>) -> f64 {
    let liquidity = market.as_ref().and_then(|m| m.liquidity).unwrap_or(0.0);
    if liquidity >= 50_000.0 {
        90.0
    } else if liquidity >= 10_000.0 {
        70.0
    } else if liquidity >= 1_000.0 {
        50.0
    } else {
        30.0
    }
}

fn market_score(market: &Option<snapshots::MarketSnapshot>) -> f64 {
    let cap = market.as_ref().and_then(|m| m.market_cap).unwrap_or(0.0);
    if cap >= 1_000_000.0 {
        85.0
    } else if cap >= 200_000.0 {
        70.0
    } else if cap >= 50_000.0 {
        55.0
    } else {
        40.0
    }
}

fn security_score(security: &crate::types::SecurityInfo) -> f64 {
    let mut score = 100.0;
    if security.mint_authority_present.unwrap_or(false) {
        score -= 15.0;
    }
    if security.freeze_authority_present.unwrap_or(false) {
        score -= 40.0;
    }
    score -= security.top_holder_concentration_percent.unwrap_or(50.0) * 0.5;
    score += (security.lp_burned_percent.unwrap_or(0.0) - 50.0) * 0.3;
    score.clamp(0.0, 100.0)
}

fn whale_score(amount: f64, side: crate::types::WhaleSide) -> f64 {
    let magnitude = (amount.max(0.0).ln_1p() * 8.0).min(40.0);
    match side {
        crate::types::WhaleSide::Buy => (60.0 + magnitude).min(100.0),
        crate::types::WhaleSide::Sell => (40.0 - magnitude).max(0.0),
    }
}

fn risk_level_from_security(security: Option<&crate::types::SecurityInfo>) -> RiskLevel {
    match security {
        None => RiskLevel::Medium,
        Some(s) => {
            if s.freeze_authority_present.unwrap_or(false) {
                RiskLevel::Critical
            } else if s.top_holder_concentration_percent.unwrap_or(0.0) > 70.0 {
                RiskLevel::High
            } else if s.top_holder_concentration_percent.unwrap_or(0.0) > 40.0 {
                RiskLevel::Medium
            } else {
                RiskLevel::Low
            }
        }
    }
}
