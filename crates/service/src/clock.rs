//! Time source abstraction.
//!
//! The forwarding database and the scavenger both reason about "how long ago
//! was this last seen", which over a real clock means a test has to either
//! sleep for real seconds or accept flakiness. [`Clock`] lets both subsystems
//! take their time source as a dependency instead of calling
//! [`std::time::Instant::now`] directly, so tests can fast-forward a
//! [`ManualClock`] instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A monotonic source of "now", expressed as a [`Duration`] since some
/// unspecified epoch that only needs to be consistent within one process.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// The real clock, backed by [`Instant`].
pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self { start: Instant::now() }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}

/// A clock a test can advance by hand, with no relation to wall-clock time.
#[derive(Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        self.now.fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.now.load(Ordering::SeqCst))
    }
}
