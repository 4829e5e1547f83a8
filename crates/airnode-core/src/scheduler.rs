//! Cycle cadence: jitter-compensated delays, the cycle counter and statistics

use embassy_time::Duration;

/// Delay until the next cycle so cycles start `interval` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextDelay {
    pub delay: Duration,
    /// How far the cycle overran its interval; `None` when on time.
    pub missed_by: Option<Duration>,
}

impl NextDelay {
    pub fn is_deadline_miss(&self) -> bool {
        self.missed_by.is_some()
    }
}

/// Compute the next delay after a cycle that took `elapsed`.
///
/// An overrun clamps the delay to zero so the next cycle starts immediately;
/// cycles are never skipped.
pub fn next_delay(interval: Duration, elapsed: Duration) -> NextDelay {
    match interval.checked_sub(elapsed) {
        Some(delay) => NextDelay {
            delay,
            missed_by: None,
        },
        None => NextDelay {
            delay: Duration::from_ticks(0),
            missed_by: elapsed.checked_sub(interval),
        },
    }
}

/// Counts measurement cycles up to the number that triggers a wireless session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleCounter {
    count: u16,
    limit: u16,
}

impl CycleCounter {
    pub const fn new(limit: u16) -> Self {
        Self { count: 0, limit }
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    /// Record a cycle. Returns `true` when the limit is reached, in which case
    /// the counter is back at zero.
    pub fn increment(&mut self) -> bool {
        self.count += 1;
        if self.count >= self.limit {
            self.count = 0;
            true
        } else {
            false
        }
    }
}

/// Running counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub cycles: u32,
    pub deadline_misses: u32,
    pub sensor_failures: u32,
    pub display_failures: u32,
    pub sessions_ok: u32,
    pub sessions_failed: u32,
}
