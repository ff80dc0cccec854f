// =============================================================================
// Normalizer — raw feed payloads -> typed domain Events
// =============================================================================
//
// Grounded on `market_data/trade_stream.rs::parse_agg_trade` and
// `market_data/candle_buffer.rs::parse_kline_message_single`'s shape of
// "parse raw JSON, pull out the fields we need, reject with a reason if they
// don't fit" — generalized to return a typed `RejectReason` instead of an
// `anyhow::Error`, since malformed feed messages are data, not failures.
// =============================================================================

pub mod cluster;
pub mod new_pair;
pub mod price_tracker;
pub mod whale;

use crate::clock::Clock;
use crate::types::{Event, FeedKind, RejectReason};
use serde_json::Value;

/// What a normalized message should do next. Every feed except Cluster
/// always yields `MainPipeline`; Cluster routes non-PriceTick rooms to the
/// side channel instead (see §4.2: "Only PriceTick enters the main
/// pipeline; the rest are exposed on a side channel for risk/telemetry").
pub enum NormalizeOutcome {
    MainPipeline(Event),
    SideChannel(cluster::RoomMessage),
}

/// Top-level Normalizer entry point: `normalize(feed, raw) -> Result<Event, RejectReason>`,
/// generalized to `NormalizeOutcome` to express the Cluster feed's side-channel split.
pub fn normalize(
    feed: FeedKind,
    raw: &Value,
    clock: &Clock,
    seq_source: &crate::clock::SeqSource,
) -> Result<NormalizeOutcome, RejectReason> {
    match feed {
        FeedKind::NewPair => new_pair::normalize(raw, clock, seq_source).map(NormalizeOutcome::MainPipeline),
        FeedKind::Whale => whale::normalize(raw, clock, seq_source).map(NormalizeOutcome::MainPipeline),
        FeedKind::Cluster => cluster::normalize(raw, clock, seq_source),
        FeedKind::PriceTracker => price_tracker::normalize(raw, clock, seq_source).map(NormalizeOutcome::MainPipeline),
    }
}

/// Rejects non-finite/negative numeric fields used by price/liquidity/volume.
pub(crate) fn require_nonneg(v: f64, field: &str) -> Result<f64, RejectReason> {
    if crate::types::is_valid_nonneg(v) {
        Ok(v)
    } else {
        Err(RejectReason::new(format!("invalid_{field}")))
    }
}
