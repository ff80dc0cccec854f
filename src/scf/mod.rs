// =============================================================================
// Shared Connection Fabric (SCF)
// =============================================================================
//
// Public contract: `subscribe(url, topics, auth, options) -> handle`,
// `close(handle)`, `events(handle)`. One transport per URL, multiplexed
// locally across logical subscribers sharing it.
// =============================================================================

pub mod auth;
pub mod backoff;
pub mod dedup;
pub mod queue;
pub mod transport;

use auth::{AuthProvider, NoAuth};
use dashmap::DashMap;
use queue::BoundedQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use transport::{ConnState, ScfEvent, Subscriber, SubscribeOptions, TransportShared};

/// A live subscription. Dropping a handle without calling `close` leaves the
/// underlying transport referenced — callers must call `fabric.close(handle)`
/// explicitly, matching the explicit-ownership design note (no singletons,
/// no implicit teardown via `Drop` that could race a reconnect).
pub struct Handle {
    pub url: String,
    pub subscriber_id: u64,
    queue: Arc<BoundedQueue<ScfEvent>>,
}

impl Handle {
    /// Awaits the next event for this subscription; `None` once closed.
    pub async fn next_event(&self) -> Option<ScfEvent> {
        self.queue.pop().await
    }

    pub fn dropped_count(&self) -> u64 {
        self.queue.dropped_count()
    }
}

/// Multiplexes a small set of persistent outbound subscriptions, one
/// transport task per URL, shared across any number of logical subscribers.
pub struct SharedConnectionFabric {
    transports: DashMap<String, Arc<TransportShared>>,
    next_subscriber_id: AtomicU64,
}

impl SharedConnectionFabric {
    pub fn new() -> Self {
        Self { transports: DashMap::new(), next_subscriber_id: AtomicU64::new(1) }
    }

    /// Subscribes to `topics` on `url`, sharing the underlying transport
    /// with any other subscriber already attached to the same URL.
    pub fn subscribe(
        &self,
        url: &str,
        topics: Vec<String>,
        auth: Option<Arc<dyn AuthProvider>>,
        options: SubscribeOptions,
    ) -> Handle {
        let auth = auth.unwrap_or_else(|| Arc::new(NoAuth));
        let shared = self
            .transports
            .entry(url.to_string())
            .or_insert_with(|| {
                let shared = TransportShared::new(url.to_string(), auth.clone(), options.clone());
                let task_shared = shared.clone();
                tokio::spawn(async move {
                    transport::run_transport(task_shared).await;
                });
                shared
            })
            .clone();

        shared.refcount.fetch_add(1, Ordering::SeqCst);
        let subscriber_id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        let queue = BoundedQueue::new(shared.options.max_queued);
        shared.subscribers.insert(
            subscriber_id,
            Subscriber { id: subscriber_id, topics, queue: queue.clone() },
        );

        Handle { url: url.to_string(), subscriber_id, queue }
    }

    /// Releases a subscriber; tears down the underlying transport once its
    /// refcount reaches zero.
    pub fn close(&self, handle: Handle) {
        if let Some(shared) = self.transports.get(&handle.url) {
            shared.subscribers.remove(&handle.subscriber_id);
            handle.queue.close();
            let remaining = shared.refcount.fetch_sub(1, Ordering::SeqCst) - 1;
            if remaining == 0 {
                shared.shutting_down.store(true, Ordering::SeqCst);
                shared.shutdown.notify_waiters();
            }
        }
    }

    pub fn connection_state(&self, url: &str) -> Option<ConnState> {
        self.transports.get(url).map(|t| {
            // Best-effort synchronous peek: state is only ever written via
            // `set_state`, so a stale read here is acceptable for stats.
            t.state.try_read().map(|s| s.clone()).unwrap_or(ConnState::Idle)
        })
    }
}

impl Default for SharedConnectionFabric {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_without_connecting_builds_a_handle() {
        // Constructing the fabric and registering intent to subscribe must
        // not require an actual network connection to succeed; the task is
        // spawned but this test does not drive the runtime far enough to
        // dial out.
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let fabric = SharedConnectionFabric::new();
            let handle = fabric.subscribe(
                "wss://example.invalid/feed",
                vec!["new_pairs".to_string()],
                None,
                SubscribeOptions::default(),
            );
            assert_eq!(handle.url, "wss://example.invalid/feed");
            fabric.close(handle);
        });
    }
}
