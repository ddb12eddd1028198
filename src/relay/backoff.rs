//! Jittered exponential backoff between failed cycles

use rand::Rng;
use std::time::Duration;

/// Backoff state for the relay loop
///
/// Each failure sleeps `min(cap, current) + jitter` and doubles `current` up
/// to the cap. A successful cycle resets `current` to the floor.
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    cap: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(floor: Duration, cap: Duration) -> Self {
        let cap = cap.max(floor);
        Self {
            floor,
            cap,
            current: floor,
        }
    }

    /// Delay the next failure would produce, before jitter
    pub fn current(&self) -> Duration {
        self.current.min(self.cap)
    }

    /// Next delay with a random jitter in `[0, 1)` seconds
    pub fn next_delay(&mut self) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.0..1.0);
        self.next_delay_with_jitter(jitter)
    }

    /// Next delay with caller-supplied jitter, in seconds
    pub fn next_delay_with_jitter(&mut self, jitter_secs: f64) -> Duration {
        let base = self.current();
        self.current = self.current.saturating_mul(2).min(self.cap);
        base + Duration::from_secs_f64(jitter_secs.max(0.0))
    }

    pub fn reset(&mut self) {
        self.current = self.floor;
    }
}
