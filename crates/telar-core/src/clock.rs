#![forbid(unsafe_code)]

//! Host-driven monotonic time.
//!
//! The runtime never reads a wall clock. The host advances [`DeterministicClock`]
//! explicitly (from `requestAnimationFrame`, a timer, or a test), and every
//! cooldown, readiness poll and timeout is evaluated against it. Timestamps
//! are offsets from the runtime's construction.

use web_time::Duration;

/// Monotonic offset since the runtime started.
pub type Timestamp = Duration;

/// Deterministic monotonic clock controlled by the host.
#[derive(Debug, Default, Clone)]
pub struct DeterministicClock {
    now: Timestamp,
}

impl DeterministicClock {
    /// Create a clock starting at `0`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            now: Duration::ZERO,
        }
    }

    #[inline]
    #[must_use]
    pub const fn now(&self) -> Timestamp {
        self.now
    }

    /// Set current monotonic time. Going backwards is ignored.
    pub fn set(&mut self, now: Timestamp) {
        if now >= self.now {
            self.now = now;
        } else {
            tracing::debug!(?now, current = ?self.now, "ignoring backwards clock update");
        }
    }

    /// Advance monotonic time by `dt`.
    pub fn advance(&mut self, dt: Duration) {
        self.now = self.now.saturating_add(dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_and_set() {
        let mut clock = DeterministicClock::new();
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now(), Duration::from_millis(250));
        clock.set(Duration::from_secs(2));
        assert_eq!(clock.now(), Duration::from_secs(2));
    }

    #[test]
    fn never_goes_backwards() {
        let mut clock = DeterministicClock::new();
        clock.set(Duration::from_secs(3));
        clock.set(Duration::from_secs(1));
        assert_eq!(clock.now(), Duration::from_secs(3));
    }
}
