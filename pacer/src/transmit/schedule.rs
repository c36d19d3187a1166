//! Send schedule derived from the target rate.
//!
//! The schedule is never materialized. Record `k` is due at
//! `start + (k + 1) * interval`, computed from the anchor each time, so a
//! fractional interval (3 Hz is 333 333 333.3 ns) does not accumulate
//! rounding drift over a long run.

use std::fmt;
use std::time::Duration;

use crate::clock::Instant;

/// A send that completed later than the tolerance allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleDeviation {
    /// Index of the record whose deadline slipped.
    pub record: usize,
    /// How far past the deadline the wait ended.
    pub behind: Duration,
    /// Slip allowed before reporting.
    pub tolerance: Duration,
}

impl fmt::Display for ScheduleDeviation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "record {} behind schedule by {} ns (tolerance {} ns)",
            self.record,
            self.behind.as_nanos(),
            self.tolerance.as_nanos()
        )
    }
}

/// Deadlines for one transmission run.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    start: Instant,
    interval_ns: f64,
    tolerance: Duration,
}

impl Schedule {
    /// Anchors a schedule at `start`.
    ///
    /// `rate_hz` must be positive and finite; callers validate it through
    /// [`PacingConfig::validate`](crate::config::PacingConfig::validate).
    #[must_use]
    pub fn new(start: Instant, rate_hz: f64, tolerance_fraction: f64) -> Self {
        let interval_ns = 1e9 / rate_hz;
        Self {
            start,
            interval_ns,
            tolerance: nanos(interval_ns * tolerance_fraction),
        }
    }

    #[must_use]
    pub const fn start(&self) -> Instant {
        self.start
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        nanos(self.interval_ns)
    }

    #[must_use]
    pub const fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Instant by which record `index` must have gone out.
    #[must_use]
    pub fn deadline(&self, index: usize) -> Instant {
        self.start + nanos((index as f64 + 1.0) * self.interval_ns)
    }

    /// Compares the instant a wait ended against the deadline of `index`.
    #[must_use]
    pub fn deviation(&self, index: usize, reached: Instant) -> Option<ScheduleDeviation> {
        let behind = reached.saturating_duration_since(self.deadline(index));
        (behind > self.tolerance).then_some(ScheduleDeviation {
            record: index,
            behind,
            tolerance: self.tolerance,
        })
    }
}

fn nanos(ns: f64) -> Duration {
    // `as` saturates: NaN becomes 0, overflow becomes u64::MAX.
    Duration::from_nanos(ns.round() as u64)
}
