// =============================================================================
// Per-TokenId cooldown — bounds Opportunity emission frequency
// =============================================================================

use crate::types::{Score, TokenId};
use dashmap::DashMap;
use std::time::{Duration, Instant};

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_PREEMPT_DELTA: Score = 5.0;

struct Entry {
    last_emitted_at: Instant,
    last_composite: Score,
}

pub struct CooldownTracker {
    entries: DashMap<TokenId, Entry>,
    window: Duration,
    preempt_delta: Score,
}

impl CooldownTracker {
    pub fn new(window: Duration, preempt_delta: Score) -> Self {
        Self { entries: DashMap::new(), window, preempt_delta }
    }

    /// Returns `true` if emitting an Opportunity with `composite` for
    /// `token_id` right now is allowed: either the cooldown window has
    /// elapsed, or `composite` pre-empts it by beating the last emission by
    /// at least `preempt_delta` points.
    pub fn allow(&self, token_id: &TokenId, composite: Score) -> bool {
        match self.entries.get(token_id) {
            None => true,
            Some(entry) => {
                entry.last_emitted_at.elapsed() >= self.window
                    || composite >= entry.last_composite + self.preempt_delta
            }
        }
    }

    pub fn record(&self, token_id: &TokenId, composite: Score) {
        self.entries.insert(
            token_id.clone(),
            Entry { last_emitted_at: Instant::now(), last_composite: composite },
        );
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_PREEMPT_DELTA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_emission_always_allowed() {
        let tracker = CooldownTracker::default();
        let id = TokenId::new("T1").unwrap();
        assert!(tracker.allow(&id, 50.0));
    }

    #[test]
    fn second_emission_within_window_blocked_unless_preempting() {
        let tracker = CooldownTracker::new(Duration::from_secs(300), 5.0);
        let id = TokenId::new("T1").unwrap();
        tracker.record(&id, 60.0);
        assert!(!tracker.allow(&id, 63.0));
        assert!(tracker.allow(&id, 65.0));
    }

    #[test]
    fn emission_allowed_after_window_elapses() {
        let tracker = CooldownTracker::new(Duration::from_millis(10), 5.0);
        let id = TokenId::new("T1").unwrap();
        tracker.record(&id, 60.0);
        std::thread::sleep(Duration::from_millis(15));
        assert!(tracker.allow(&id, 60.0));
    }
}
