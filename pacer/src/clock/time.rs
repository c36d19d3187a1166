//! Monotonic instants on a nanosecond lattice.
//!
//! An [`Instant`] counts nanoseconds since an arbitrary origin chosen by the
//! clock that produced it. Instants from different clocks are not comparable.
//! Spans are plain [`std::time::Duration`]s.

use core::ops::{Add, Sub};
use std::time::Duration;

/// A point in time, in nanoseconds since the producing clock's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Instant(u64);

impl Instant {
    /// The clock origin.
    pub const ZERO: Self = Self(0);

    #[inline]
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    #[inline]
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Time elapsed from `earlier` to `self`, or zero if `earlier` is later.
    #[inline]
    #[must_use]
    pub const fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Instant {
    type Output = Self;

    /// Saturates at `u64::MAX` nanoseconds (about 584 years past the origin).
    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        let nanos = u64::try_from(rhs.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(nanos))
    }
}

impl Sub for Instant {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        self.saturating_duration_since(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_sub_are_inverse() {
        let start = Instant::from_nanos(1_000);
        let later = start + Duration::from_micros(3);
        assert_eq!(later.as_nanos(), 4_000);
        assert_eq!(later - start, Duration::from_micros(3));
    }

    #[test]
    fn sub_saturates_at_zero() {
        let a = Instant::from_nanos(10);
        let b = Instant::from_nanos(20);
        assert_eq!(a - b, Duration::ZERO);
    }

    #[test]
    fn add_saturates_at_max() {
        let end = Instant::from_nanos(u64::MAX - 1) + Duration::from_secs(1);
        assert_eq!(end.as_nanos(), u64::MAX);
    }
}
