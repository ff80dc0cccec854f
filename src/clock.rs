// =============================================================================
// Clock & Id — monotonic time, wall-clock time, and sequence numbers
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Monotonic + wall-clock timestamp pair carried on every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Timestamp {
    /// Milliseconds since process start.
    pub mono_ms: u64,
    /// Wall-clock milliseconds since the Unix epoch.
    pub wall_ms: i64,
}

impl Timestamp {
    pub fn now(clock: &Clock) -> Self {
        Self {
            mono_ms: clock.mono_ms(),
            wall_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Process-wide monotonic clock, anchored at construction time.
///
/// A single `Clock` is owned by `AppState` and shared via `Arc`; there is no
/// global/static clock, matching the "no singletons beyond the clock and
/// sequence source" design note.
pub struct Clock {
    start: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    pub fn mono_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn wall_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    pub fn now(&self) -> Timestamp {
        Timestamp { mono_ms: self.mono_ms(), wall_ms: self.wall_ms() }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Strictly-increasing per-process event sequence number source.
#[derive(Default)]
pub struct SeqSource {
    next: AtomicU64,
}

impl SeqSource {
    pub fn new() -> Self {
        Self { next: AtomicU64::new(0) }
    }

    /// Returns the next sequence number; the first call returns 0.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    pub fn current(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_strictly_increases() {
        let seq = SeqSource::new();
        let a = seq.next();
        let b = seq.next();
        let c = seq.next();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn clock_mono_never_decreases() {
        let clock = Clock::new();
        let a = clock.mono_ms();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = clock.mono_ms();
        assert!(b >= a);
    }
}
