//! Wall-Clock Timing
//!
//! Microsecond-resolution marks on the monotonic clock. Elapsed time between
//! two marks is never negative: if the clock ever appears to run backwards the
//! difference is clamped to zero.

use std::time::Duration;

/// A point on the monotonic clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Mark(std::time::Instant);

impl Mark {
    /// Capture the current instant
    #[inline(always)]
    pub fn now() -> Self {
        Self(std::time::Instant::now())
    }

    /// Microseconds from `self` to `end`, clamped to zero
    #[inline(always)]
    pub fn elapsed_until(&self, end: Mark) -> u64 {
        end.0
            .checked_duration_since(self.0)
            .map(duration_to_us)
            .unwrap_or(0)
    }

    /// Microseconds since this mark was taken
    #[inline(always)]
    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_until(Mark::now())
    }
}

/// Convert a duration to whole microseconds, saturating at `u64::MAX`
#[inline]
pub fn duration_to_us(duration: Duration) -> u64 {
    duration.as_micros().min(u64::MAX as u128) as u64
}

/// Timer for measuring one run of a workload
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Mark,
}

impl Timer {
    /// Start a new timer
    #[inline(always)]
    pub fn start() -> Self {
        Self { start: Mark::now() }
    }

    /// Elapsed microseconds since `start()`
    #[inline(always)]
    pub fn stop(&self) -> u64 {
        self.start.elapsed_us()
    }
}
