//! Clock abstraction and deadline waiting for the pacing loop.
//!
//! The transmitter never reads time directly. It asks a [`Clock`] for
//! [`Instant`]s and waits for deadlines through [`wait_until`], so the wait
//! strategy can move from a pure spin to sleep-then-spin without touching the
//! pacing logic, and tests can drive time by hand.

mod time;

pub use time::Instant;

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Source of monotonic time.
pub trait Clock {
    /// Current instant. Must never go backwards.
    fn now(&self) -> Instant;

    /// Blocks the calling thread for roughly `duration`.
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

/// Process-local monotonic clock backed by `minstant` (TSC where reliable,
/// the OS monotonic clock otherwise).
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: minstant::Instant,
}

impl MonotonicClock {
    /// Creates a clock whose origin is the moment of the call.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: minstant::Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        let nanos = self.origin.elapsed().as_nanos();
        Instant::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// How to wait for a send deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStrategy {
    /// Poll the clock in a tight loop. Burns one core, gives the best
    /// deadline accuracy.
    #[default]
    Spin,
    /// Sleep until `spin_window` before the deadline, then spin.
    Hybrid { spin_window: Duration },
}

/// Waits until `clock.now() >= deadline` and returns the instant observed.
#[inline]
pub fn wait_until<C: Clock + ?Sized>(clock: &C, deadline: Instant, strategy: WaitStrategy) -> Instant {
    if let WaitStrategy::Hybrid { spin_window } = strategy {
        loop {
            let remaining = deadline.saturating_duration_since(clock.now());
            if remaining <= spin_window {
                break;
            }
            clock.sleep(remaining - spin_window);
        }
    }

    loop {
        let now = clock.now();
        if now >= deadline {
            return now;
        }
        std::hint::spin_loop();
    }
}
