//! Shared error types and the best-effort execution helper

use thiserror_no_std::Error;

use crate::activity::ActivityState;
use crate::config::ConfigError;
use crate::events::IndicatorError;
use crate::measurements::AllocationError;
use crate::peripherals::{DisplayError, PeripheralError, SensorError};
use crate::timer::TimerError;
use crate::wireless::{LinkError, WirelessError};

/// Aggregate result of a best-effort sequence: how many steps failed and the
/// last failure seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Failures<E> {
    pub count: usize,
    pub last: E,
}

impl<E: core::fmt::Display> core::fmt::Display for Failures<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} step(s) failed, last: {}", self.count, self.last)
    }
}

/// Failures from one activity transition's power actions
pub type ActionErrors = Failures<PeripheralError>;

/// Run every step in order, even after failures, and combine the results.
///
/// Never stops early: a step that fails is recorded and the next one still
/// runs.
pub fn run_all<T, E>(
    steps: impl IntoIterator<Item = T>,
    mut run: impl FnMut(T) -> Result<(), E>,
) -> Result<(), Failures<E>> {
    let mut failures: Option<Failures<E>> = None;

    for step in steps {
        if let Err(e) = run(step) {
            let count = failures.as_ref().map_or(0, |f| f.count) + 1;
            failures = Some(Failures { count, last: e });
        }
    }

    match failures {
        Some(f) => Err(f),
        None => Ok(()),
    }
}

/// A subsystem failed to come up; the node stays in the error state.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    #[error("Invalid configuration: {0}")]
    Config(ConfigError),
    #[error("Event indicator init failed: {0}")]
    Indicator(IndicatorError),
    #[error("Display init failed: {0}")]
    Display(DisplayError),
    #[error("Wireless init failed: {0}")]
    Wireless(LinkError),
    #[error("Sensor init failed: {0}")]
    Sensors(SensorError),
    #[error("Measurement buffer allocation failed: {0}")]
    Buffers(AllocationError),
    #[error("Could not schedule the first cycle: {0}")]
    Schedule(TimerError),
    #[error("Orchestrator is already initialized")]
    AlreadyInitialized,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartError {
    #[error("Cannot start while {0:?}, the node must be idle")]
    NotIdle(ActivityState),
    #[error("Failed to enter pairing mode: {0}")]
    Pairing(WirelessError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn test_run_all_ok() {
        let mut seen = Vec::new();
        let result: Result<(), Failures<u8>> = run_all([1, 2, 3], |step| {
            seen.push(step);
            Ok(())
        });

        assert_eq!(result, Ok(()));
        assert_eq!(seen, [1, 2, 3]);
    }

    #[test]
    fn test_run_all_continues_after_failure() {
        let mut seen = Vec::new();
        let result = run_all([1, 2, 3, 4], |step| {
            seen.push(step);
            if step % 2 == 1 { Err(step) } else { Ok(()) }
        });

        assert_eq!(seen, [1, 2, 3, 4]);
        assert_eq!(result, Err(Failures { count: 2, last: 3 }));
    }
}
