//! Monotonic time source.
//!
//! The state machine and the motion sequencer never read the system clock
//! directly. The server supplies a wall-clock implementation; tests use
//! [`ManualClock`], whose `sleep_ms` simply advances virtual time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic millisecond clock.
pub trait Clock: Send + Sync {
    /// Milliseconds since an arbitrary, fixed epoch.
    fn now_ms(&self) -> u64;

    /// Block the calling thread for `ms` milliseconds.
    fn sleep_ms(&self, ms: u64);
}

/// Virtual clock for deterministic tests and simulation.
///
/// Clones share the same time, so a test can keep one handle and hand the
/// other to the controller.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        ManualClock {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance_ms(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn advance_s(&self, seconds: u64) {
        self.advance_ms(seconds * 1000);
    }

    pub fn set_ms(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn sleep_ms(&self, ms: u64) {
        self.advance_ms(ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared() {
        let clock = ManualClock::new(500);
        let other = clock.clone();
        other.sleep_ms(250);
        assert_eq!(clock.now_ms(), 750);
        clock.advance_s(2);
        assert_eq!(other.now_ms(), 2750);
        clock.set_ms(0);
        assert_eq!(other.now_ms(), 0);
    }
}
