//! System activity (power) state machine
//!
//! Each state lists the power actions to run when it is entered and left.
//! [`ActivityStateMachine::enter`] is the only way to change state: it runs
//! the outgoing state's exit actions, then the incoming state's enter
//! actions, then switches state whether or not any action failed.

use log::{debug, info, warn};

use crate::error::{ActionErrors, run_all};
use crate::peripherals::{PeripheralError, PowerControl, Subsystem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityState {
    Uninitialized,
    Initializing,
    Measuring,
    Updating,
    Advertising,
    Idle,
    /// Terminal: nothing leaves this state automatically.
    Error,
}

/// A single power side effect of a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Activate(Subsystem),
    Suspend(Subsystem),
}

const SUSPEND_ALL: &[Action] = &[
    Action::Suspend(Subsystem::Flash),
    Action::Suspend(Subsystem::Sensors),
    Action::Suspend(Subsystem::Display),
];

impl ActivityState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Measuring => "measuring",
            Self::Updating => "updating",
            Self::Advertising => "advertising",
            Self::Idle => "idle",
            Self::Error => "error",
        }
    }

    pub const fn on_enter(self) -> &'static [Action] {
        match self {
            Self::Measuring => &[Action::Activate(Subsystem::Sensors)],
            Self::Updating => &[Action::Activate(Subsystem::Display)],
            Self::Error => SUSPEND_ALL,
            _ => &[],
        }
    }

    pub const fn on_exit(self) -> &'static [Action] {
        match self {
            Self::Initializing => SUSPEND_ALL,
            Self::Measuring => &[Action::Suspend(Subsystem::Sensors)],
            Self::Updating => &[Action::Suspend(Subsystem::Display)],
            _ => &[],
        }
    }
}

impl Action {
    /// Run the action. Subsystems that are not fitted are skipped.
    pub fn apply(self, power: &mut dyn PowerControl) -> Result<(), PeripheralError> {
        let (subsystem, activate) = match self {
            Self::Activate(subsystem) => (subsystem, true),
            Self::Suspend(subsystem) => (subsystem, false),
        };

        let Some(gate) = power.gate(subsystem) else {
            debug!("Skipping {:?}: {} not fitted", self, subsystem.label());
            return Ok(());
        };

        if activate { gate.activate() } else { gate.suspend() }
    }
}

#[derive(Debug)]
pub struct ActivityStateMachine {
    current: ActivityState,
}

impl Default for ActivityStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityStateMachine {
    pub const fn new() -> Self {
        Self {
            current: ActivityState::Uninitialized,
        }
    }

    pub fn current(&self) -> ActivityState {
        self.current
    }

    /// Transition to `next`.
    ///
    /// Every exit and enter action is attempted; failures are logged and
    /// returned but the state always becomes `next`.
    pub fn enter(
        &mut self,
        next: ActivityState,
        power: &mut dyn PowerControl,
    ) -> Result<(), ActionErrors> {
        let previous = self.current;
        let actions = previous.on_exit().iter().chain(next.on_enter()).copied();

        let result = run_all(actions, |action| {
            action.apply(power).inspect_err(|e| warn!("{:?} failed: {}", action, e))
        });

        self.current = next;
        info!("Activity: {} -> {}", previous.label(), next.label());

        if let Err(failures) = &result {
            warn!(
                "Entering {} with {} failed power action(s)",
                next.label(),
                failures.count
            );
        }
        result
    }
}
