// =============================================================================
// Auth provider rotation — credential refresh with AuthStalled escalation
// =============================================================================

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::warn;

/// Current access credentials plus an expiry hint, as returned by an
/// `AuthProvider`.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: Option<Instant>,
}

/// A callable returning current credentials and an expiry hint. Feeds that
/// require auth supply one of these to `subscribe`.
pub trait AuthProvider: Send + Sync {
    fn current_access(&self) -> AccessToken;
    fn refresh(&self) -> AccessToken;
}

/// No-op provider for feeds that require no authentication.
pub struct NoAuth;

impl AuthProvider for NoAuth {
    fn current_access(&self) -> AccessToken {
        AccessToken { token: String::new(), expires_at: None }
    }

    fn refresh(&self) -> AccessToken {
        self.current_access()
    }
}

const MAX_FAILURES: usize = 3;
const FAILURE_WINDOW: Duration = Duration::from_secs(60);

/// Tracks auth-refresh failures for a single handle and determines when the
/// handle should be marked `AuthStalled`.
pub struct AuthFailureTracker {
    failures: Mutex<VecDeque<Instant>>,
    stalled: std::sync::atomic::AtomicBool,
}

impl AuthFailureTracker {
    pub fn new() -> Self {
        Self {
            failures: Mutex::new(VecDeque::new()),
            stalled: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Records a failed refresh attempt. Returns `true` if this failure
    /// pushed the handle into `AuthStalled`.
    pub fn record_failure(&self) -> bool {
        let now = Instant::now();
        let mut failures = self.failures.lock();
        failures.push_back(now);
        while let Some(front) = failures.front() {
            if now.duration_since(*front) > FAILURE_WINDOW {
                failures.pop_front();
            } else {
                break;
            }
        }
        if failures.len() >= MAX_FAILURES {
            self.stalled.store(true, std::sync::atomic::Ordering::SeqCst);
            warn!(failures = failures.len(), "auth provider exceeded failure budget, marking AuthStalled");
            true
        } else {
            false
        }
    }

    pub fn record_success(&self) {
        self.failures.lock().clear();
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Operator action: clears the stalled state and failure history.
    pub fn clear(&self) {
        self.stalled.store(false, std::sync::atomic::Ordering::SeqCst);
        self.failures.lock().clear();
    }
}

impl Default for AuthFailureTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stalls_after_three_failures_in_window() {
        let tracker = AuthFailureTracker::new();
        assert!(!tracker.record_failure());
        assert!(!tracker.record_failure());
        assert!(tracker.record_failure());
        assert!(tracker.is_stalled());
    }

    #[test]
    fn success_clears_failure_history() {
        let tracker = AuthFailureTracker::new();
        tracker.record_failure();
        tracker.record_failure();
        tracker.record_success();
        assert!(!tracker.record_failure());
        assert!(!tracker.is_stalled());
    }

    #[test]
    fn operator_clear_resets_stall() {
        let tracker = AuthFailureTracker::new();
        for _ in 0..3 {
            tracker.record_failure();
        }
        assert!(tracker.is_stalled());
        tracker.clear();
        assert!(!tracker.is_stalled());
    }
}
