// =============================================================================
// Transport actor — one tokio task per URL, shared by every subscriber
// =============================================================================
//
// Grounded on `market_data/trade_stream.rs::run_trade_stream` and
// `market_data/candle_buffer.rs::run_kline_stream`'s connect/read-loop shape
// (`connect_async`, matching `Some(Ok(Message::Text))` / `Some(Err)` / `None`,
// `.context(...)`-wrapped errors) — generalized from one task per symbol
// into one task per URL multiplexing many logical topics, with real
// reconnect backoff/jitter and heartbeat tracking instead of a flat sleep.
// =============================================================================

use super::auth::{AccessToken, AuthFailureTracker, AuthProvider};
use super::backoff::{Backoff, BackoffPolicy};
use super::dedup::{ContentKey, DedupCache};
use super::queue::{BoundedQueue, Criticality};
use anyhow::Context;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnState {
    Idle,
    Connecting,
    Open,
    Degraded,
    Closing,
    Closed,
    Fatal,
}

#[derive(Debug, Clone)]
pub enum ScfEvent {
    ConnectionState { state: ConnState, reason: Option<String> },
    Message { topic: String, seq: u64, wall_ts: i64, value: serde_json::Value },
    DropNotice { topic: String },
    Heartbeat,
}

impl Criticality for ScfEvent {
    fn is_critical(&self) -> bool {
        matches!(self, ScfEvent::ConnectionState { .. } | ScfEvent::Heartbeat)
    }
}

#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    pub heartbeat_interval: Duration,
    pub backoff: BackoffPolicy,
    pub max_queued: usize,
    pub dedup_window: Duration,
    pub dedup_capacity: usize,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            backoff: BackoffPolicy::default(),
            max_queued: 1024,
            dedup_window: super::dedup::DEFAULT_WINDOW,
            dedup_capacity: super::dedup::DEFAULT_CAPACITY,
        }
    }
}

pub struct Subscriber {
    pub id: u64,
    pub topics: Vec<String>,
    pub queue: Arc<BoundedQueue<ScfEvent>>,
}

pub struct TransportShared {
    pub url: String,
    pub subscribers: DashMap<u64, Subscriber>,
    pub refcount: AtomicU64,
    pub seq: AtomicU64,
    pub dedup: DedupCache,
    pub auth: Arc<dyn AuthProvider>,
    pub auth_failures: AuthFailureTracker,
    pub state: RwLock<ConnState>,
    pub options: SubscribeOptions,
    pub shutdown: tokio::sync::Notify,
    pub shutting_down: std::sync::atomic::AtomicBool,
}

impl TransportShared {
    pub fn new(url: String, auth: Arc<dyn AuthProvider>, options: SubscribeOptions) -> Arc<Self> {
        Arc::new(Self {
            url,
            subscribers: DashMap::new(),
            refcount: AtomicU64::new(0),
            seq: AtomicU64::new(0),
            dedup: DedupCache::new(options.dedup_window, options.dedup_capacity),
            auth,
            auth_failures: AuthFailureTracker::new(),
            state: RwLock::new(ConnState::Idle),
            options,
            shutdown: tokio::sync::Notify::new(),
            shutting_down: std::sync::atomic::AtomicBool::new(false),
        })
    }

    async fn broadcast(&self, event: ScfEvent, topic_filter: Option<&str>) {
        for entry in self.subscribers.iter() {
            if let Some(topic) = topic_filter {
                if !entry.topics.iter().any(|t| t == topic) {
                    continue;
                }
            }
            if !entry.queue.push(event.clone()) {
                debug!(topic = topic_filter.unwrap_or("*"), "subscriber queue saturated, message dropped");
            }
        }
    }

    async fn set_state(&self, state: ConnState, reason: Option<String>) {
        *self.state.write().await = state.clone();
        self.broadcast(ScfEvent::ConnectionState { state, reason }, None).await;
    }
}

/// Runs the reconnect-and-read loop for one transport until the fabric
/// tears it down (refcount hits zero). Never returns an `Err`: every
/// failure is handled internally via backoff/reconnect, matching the
/// "errors are local by default" propagation policy.
pub async fn run_transport(shared: Arc<TransportShared>) {
    let mut backoff = Backoff::new(shared.options.backoff.clone());

    loop {
        if shared.shutting_down.load(Ordering::SeqCst) {
            shared.set_state(ConnState::Closed, None).await;
            return;
        }

        shared.set_state(ConnState::Connecting, None).await;
        let connected_since = Instant::now();
        match connect_and_pump(&shared).await {
            Ok(()) => {
                // Graceful close requested (refcount hit zero while open).
                shared.set_state(ConnState::Closed, None).await;
                return;
            }
            Err(e) => {
                if connected_since.elapsed() >= shared.options.backoff.healthy_uptime {
                    backoff.reset();
                }
                warn!(url = %shared.url, error = %e, "transport connection failed, will retry");
                shared.set_state(ConnState::Connecting, Some(e.to_string())).await;
            }
        }

        let delay = backoff.next_delay();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shared.shutdown.notified() => {
                shared.set_state(ConnState::Closed, None).await;
                return;
            }
        }
    }
}

async fn connect_and_pump(shared: &Arc<TransportShared>) -> anyhow::Result<()> {
    let access: AccessToken = shared.auth.current_access();
    let url = if access.token.is_empty() {
        shared.url.clone()
    } else {
        format!("{}?token={}", shared.url, access.token)
    };

    let (ws_stream, _resp) = tokio_tungstenite::connect_async(&url)
        .await
        .context("failed to establish websocket connection")?;
    let (mut write, mut read) = ws_stream.split();

    shared.set_state(ConnState::Open, None).await;
    let mut last_traffic = Instant::now();
    let mut heartbeat = tokio::time::interval(shared.options.heartbeat_interval);
    heartbeat.tick().await; // first tick fires immediately

    loop {
        if shared.shutting_down.load(Ordering::SeqCst) && shared.refcount.load(Ordering::SeqCst) == 0 {
            let _ = write.send(WsMessage::Close(None)).await;
            return Ok(());
        }

        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        last_traffic = Instant::now();
                        handle_text_message(shared, &text).await;
                    }
                    Some(Ok(WsMessage::Ping(payload))) => {
                        last_traffic = Instant::now();
                        let _ = write.send(WsMessage::Pong(payload)).await;
                    }
                    Some(Ok(WsMessage::Pong(_))) => {
                        last_traffic = Instant::now();
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        return Err(anyhow::anyhow!("server closed connection"));
                    }
                    Some(Ok(_)) => {
                        last_traffic = Instant::now();
                    }
                    Some(Err(e)) => {
                        return Err(anyhow::anyhow!("websocket read error: {e}"));
                    }
                    None => {
                        return Err(anyhow::anyhow!("websocket stream ended"));
                    }
                }
            }
            _ = heartbeat.tick() => {
                let dead_threshold = shared.options.heartbeat_interval * 2;
                if last_traffic.elapsed() > dead_threshold {
                    return Err(anyhow::anyhow!("no server traffic for {:?}, declaring connection dead", last_traffic.elapsed()));
                }
                if last_traffic.elapsed() > shared.options.heartbeat_interval && last_traffic.elapsed() <= dead_threshold {
                    shared.set_state(ConnState::Degraded, Some("heartbeat late".into())).await;
                }
                if write.send(WsMessage::Ping(vec![])).await.is_err() {
                    return Err(anyhow::anyhow!("failed to send heartbeat ping"));
                }
                shared.broadcast(ScfEvent::Heartbeat, None).await;
            }
            _ = shared.shutdown.notified() => {
                let _ = write.send(WsMessage::Close(None)).await;
                return Ok(());
            }
        }
    }
}

async fn handle_text_message(shared: &Arc<TransportShared>, text: &str) {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "dropping malformed SCF payload");
            return;
        }
    };

    let topic = value
        .get("room")
        .and_then(|r| r.as_str())
        .or_else(|| value.get("topic").and_then(|t| t.as_str()))
        .unwrap_or("default")
        .to_string();

    let stable = value.to_string();
    let key = ContentKey::compute(&shared.url, &topic, &[stable.as_str()]);
    if !shared.dedup.check_and_record(key) {
        return;
    }

    let seq = shared.seq.fetch_add(1, Ordering::Relaxed);
    let wall_ts = chrono::Utc::now().timestamp_millis();
    shared
        .broadcast(ScfEvent::Message { topic: topic.clone(), seq, wall_ts, value }, Some(&topic))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scf_event_criticality() {
        let conn = ScfEvent::ConnectionState { state: ConnState::Open, reason: None };
        let hb = ScfEvent::Heartbeat;
        let msg = ScfEvent::Message { topic: "x".into(), seq: 0, wall_ts: 0, value: serde_json::Value::Null };
        assert!(conn.is_critical());
        assert!(hb.is_critical());
        assert!(!msg.is_critical());
    }
}
