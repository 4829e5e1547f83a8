//! Power-gated peripherals consumed by the orchestrator
//!
//! Sensor drivers, the display and external flash live outside this crate.
//! The orchestrator only needs to power them up and down ([`PowerGate`]),
//! read the sensors ([`SensorArray`]) and render a frame ([`Display`]).

mod display;
mod sensors;

pub use display::*;
pub use sensors::*;

use thiserror_no_std::Error;

/// Independently power-gated subsystems
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    /// External QSPI flash
    Flash,
    /// Every enabled environmental sensor
    Sensors,
    /// E-paper display
    Display,
}

impl Subsystem {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Flash => "flash",
            Self::Sensors => "sensors",
            Self::Display => "display",
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralError {
    #[error("Failed to resume {subsystem:?} (err {code})")]
    ResumeFailed { subsystem: Subsystem, code: i32 },
    #[error("Failed to suspend {subsystem:?} (err {code})")]
    SuspendFailed { subsystem: Subsystem, code: i32 },
    #[error("{subsystem:?} is not ready")]
    NotReady { subsystem: Subsystem },
}

/// A device that can be resumed and suspended.
///
/// Both operations must be idempotent: the activity state machine may
/// suspend a device that is already suspended.
pub trait PowerGate {
    fn activate(&mut self) -> Result<(), PeripheralError>;
    fn suspend(&mut self) -> Result<(), PeripheralError>;
}

/// Resolves a [`Subsystem`] to its power gate.
///
/// Returns `None` for subsystems that are not fitted on this build.
pub trait PowerControl {
    fn gate(&mut self, subsystem: Subsystem) -> Option<&mut dyn PowerGate>;
}

/// The power-gated peripherals of the node
pub struct Peripherals<S, D, F> {
    pub sensors: S,
    /// `None` when the display is disabled
    pub display: Option<D>,
    pub flash: F,
}

impl<S, D, F> PowerControl for Peripherals<S, D, F>
where
    S: SensorArray,
    D: Display,
    F: PowerGate,
{
    fn gate(&mut self, subsystem: Subsystem) -> Option<&mut dyn PowerGate> {
        match subsystem {
            Subsystem::Flash => Some(&mut self.flash),
            Subsystem::Sensors => Some(&mut self.sensors),
            Subsystem::Display => self.display.as_mut().map(|d| d as &mut dyn PowerGate),
        }
    }
}
