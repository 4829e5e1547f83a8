//! Time source and the one-shot delayed-work timer
//!
//! Timers here never fire on their own: they hold a deadline, and the event
//! loop asks them whether it has passed. That keeps every expiry on the same
//! execution context as the rest of the orchestrator.

use embassy_time::{Duration, Instant};
use thiserror_no_std::Error;

/// Longest delay a [`DelayedWork`] accepts.
pub const MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Monotonic time source.
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleStatus {
    /// The work was armed with the requested delay.
    Scheduled,
    /// The work was already pending; its deadline is unchanged.
    AlreadyQueued,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    #[error("Delay of {delay_ms} ms is longer than the 24 h limit")]
    DelayTooLong { delay_ms: u64 },
    #[error("Deadline does not fit in the clock range")]
    Overflow,
}

/// A re-armable one-shot timer.
pub trait WorkTimer {
    /// Arm the timer to expire `delay` after `now`.
    ///
    /// Arming a timer that is already pending is not an error; it returns
    /// [`ScheduleStatus::AlreadyQueued`] and keeps the existing deadline.
    fn schedule(&mut self, now: Instant, delay: Duration) -> Result<ScheduleStatus, TimerError>;

    /// Disarm the timer. Returns `true` if it was pending.
    fn cancel(&mut self) -> bool;

    /// The pending deadline, if armed.
    fn deadline(&self) -> Option<Instant>;

    /// Disarm and return `true` if the deadline has been reached.
    fn take_expired(&mut self, now: Instant) -> bool;

    fn is_pending(&self) -> bool {
        self.deadline().is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DelayedWork {
    deadline: Option<Instant>,
}

impl DelayedWork {
    pub const fn new() -> Self {
        Self { deadline: None }
    }

    /// Time left until the deadline, zero once it has passed.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.checked_duration_since(now).unwrap_or(Duration::MIN))
    }
}

impl WorkTimer for DelayedWork {
    fn schedule(&mut self, now: Instant, delay: Duration) -> Result<ScheduleStatus, TimerError> {
        if self.deadline.is_some() {
            return Ok(ScheduleStatus::AlreadyQueued);
        }
        if delay > MAX_DELAY {
            return Err(TimerError::DelayTooLong {
                delay_ms: delay.as_millis(),
            });
        }

        let deadline = now.checked_add(delay).ok_or(TimerError::Overflow)?;
        self.deadline = Some(deadline);
        Ok(ScheduleStatus::Scheduled)
    }

    fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn take_expired(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
