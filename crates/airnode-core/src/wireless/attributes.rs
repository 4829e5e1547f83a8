use thiserror_no_std::Error;

use crate::measurements::{VARIABLE_COUNT, Variable};

/// A value was outside its physical range and has been clamped.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("{value} is out of range for {variable:?}, clamped to {clamped}")]
pub struct OutOfRange {
    pub variable: Variable,
    pub value: f32,
    pub clamped: f32,
}

/// Values published to the central.
pub trait AttributeStore {
    /// Publish `value`. Out-of-range values are clamped and still published.
    fn set(&mut self, variable: Variable, value: f32) -> Result<(), OutOfRange>;

    fn get(&self, variable: Variable) -> f32;
}

/// Physical range and fixed-point scale of a published value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttributeFormat {
    pub min: f32,
    pub max: f32,
    /// Stored value = physical value × scale
    pub scale: f32,
}

impl AttributeFormat {
    pub const fn of(variable: Variable) -> Self {
        let (min, max, scale) = match variable {
            Variable::Temperature => (0.0, 1000.0, 100.0),
            Variable::Humidity => (0.0, 100.0, 100.0),
            Variable::Pressure => (0.0, 200_000.0, 0.01),
            Variable::Co2 => (0.0, 10_000.0, 10.0),
            Variable::VocIndex => (0.0, 500.0, 10.0),
            Variable::BatteryLevel => (0.0, 100.0, 1.0),
        };
        Self { min, max, scale }
    }

    fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            self.min
        } else {
            value.clamp(self.min, self.max)
        }
    }
}

/// Attribute store keeping each value as a scaled integer, the way the
/// environmental sensing characteristics encode them.
#[derive(Debug, Clone, Default)]
pub struct ScaledAttributes {
    raw: [u32; VARIABLE_COUNT],
}

impl ScaledAttributes {
    pub const fn new() -> Self {
        Self {
            raw: [0; VARIABLE_COUNT],
        }
    }

    /// The encoded value as it would be sent over the air.
    pub fn raw(&self, variable: Variable) -> u32 {
        self.raw[variable.index()]
    }
}

impl AttributeStore for ScaledAttributes {
    fn set(&mut self, variable: Variable, value: f32) -> Result<(), OutOfRange> {
        let format = AttributeFormat::of(variable);
        let clamped = format.clamp(value);

        // Round to nearest; both bounds are non-negative.
        self.raw[variable.index()] = (clamped * format.scale + 0.5) as u32;

        if clamped == value {
            Ok(())
        } else {
            Err(OutOfRange {
                variable,
                value,
                clamped,
            })
        }
    }

    fn get(&self, variable: Variable) -> f32 {
        self.raw[variable.index()] as f32 / AttributeFormat::of(variable).scale
    }
}
