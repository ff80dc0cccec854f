// =============================================================================
// Reconnect backoff — exponential with jitter
// =============================================================================
//
// base 1s, factor 2, cap 60s, jitter +/-25%. Resets to the base delay after
// `healthy_uptime` of continuous connectivity. Hand-rolled rather than
// pulled from a `backoff` crate: no repo in the corpus declares one as a
// dependency, while `rand` (used here for jitter) is common across the pack.
// =============================================================================

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub factor: f64,
    pub cap: Duration,
    pub jitter: f64,
    pub healthy_uptime: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            factor: 2.0,
            cap: Duration::from_secs(60),
            jitter: 0.25,
            healthy_uptime: Duration::from_secs(60),
        }
    }
}

/// Per-connection backoff state: tracks the current attempt count and
/// whether enough healthy uptime has elapsed to reset it.
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Returns the delay to wait before the next reconnect attempt, then
    /// advances internal state.
    pub fn next_delay(&mut self) -> Duration {
        let raw_secs = self.policy.base.as_secs_f64() * self.policy.factor.powi(self.attempt as i32);
        let capped = raw_secs.min(self.policy.cap.as_secs_f64());
        self.attempt = self.attempt.saturating_add(1);

        let jitter_frac = rand::thread_rng().gen_range(-self.policy.jitter..=self.policy.jitter);
        let jittered = (capped * (1.0 + jitter_frac)).max(0.0);
        Duration::from_secs_f64(jittered)
    }

    /// Called after `healthy_uptime` of uninterrupted connectivity has been
    /// observed; resets the attempt counter back to the base delay.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn healthy_uptime(&self) -> Duration {
        self.policy.healthy_uptime
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_and_cap() {
        let mut b = Backoff::new(BackoffPolicy::default());
        let mut prev = Duration::from_secs(0);
        for _ in 0..10 {
            let d = b.next_delay();
            // allow jitter: compare against the unjittered lower bound loosely
            assert!(d <= Duration::from_secs(75));
            prev = d;
        }
        let _ = prev;
    }

    #[test]
    fn reset_restarts_from_base() {
        let mut b = Backoff::new(BackoffPolicy::default());
        for _ in 0..5 {
            b.next_delay();
        }
        b.reset();
        // First delay after reset should be near the base (1s +/-25%).
        let d = b.next_delay();
        assert!(d <= Duration::from_millis(1_300));
    }
}
