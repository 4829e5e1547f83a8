//! Rolling measurement window shared by the display and the wireless payload.

mod buffer;

pub use buffer::MeasurementBuffer;

use thiserror_no_std::Error;

/// Value pushed into a buffer when the sensor feeding it failed to read.
///
/// The display treats this as "n/a".
pub const ERROR_SENTINEL: f32 = -1.0;

/// Number of tracked variables
pub const VARIABLE_COUNT: usize = 6;

/// A physical quantity tracked by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variable {
    /// Battery charge in percent
    BatteryLevel,
    /// Ambient temperature in °C
    Temperature,
    /// Relative humidity in %
    Humidity,
    /// Barometric pressure in Pa
    Pressure,
    /// CO2 concentration in ppm
    Co2,
    /// VOC index (0-500)
    VocIndex,
}

impl Variable {
    /// All variables in buffer order.
    pub const ALL: [Variable; VARIABLE_COUNT] = [
        Variable::BatteryLevel,
        Variable::Temperature,
        Variable::Humidity,
        Variable::Pressure,
        Variable::Co2,
        Variable::VocIndex,
    ];

    pub const fn index(self) -> usize {
        match self {
            Self::BatteryLevel => 0,
            Self::Temperature => 1,
            Self::Humidity => 2,
            Self::Pressure => 3,
            Self::Co2 => 4,
            Self::VocIndex => 5,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::BatteryLevel => "battery level",
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Pressure => "pressure",
            Self::Co2 => "CO2 concentration",
            Self::VocIndex => "VOC index",
        }
    }

    pub const fn unit(self) -> &'static str {
        match self {
            Self::BatteryLevel | Self::Humidity => "%",
            Self::Temperature => "°C",
            Self::Pressure => "Pa",
            Self::Co2 => "ppm",
            Self::VocIndex => "",
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationError {
    #[error("Measurement buffers need a capacity of at least one sample")]
    ZeroCapacity,
    #[error("Could not reserve {requested} measurement slots")]
    OutOfMemory { requested: usize },
}

/// One [`MeasurementBuffer`] per [`Variable`], all with the same capacity.
#[derive(Debug, Clone)]
pub struct MeasurementBuffers {
    buffers: [MeasurementBuffer; VARIABLE_COUNT],
}

impl MeasurementBuffers {
    /// Allocate every buffer with `capacity` slots.
    pub fn with_capacity(capacity: usize) -> Result<Self, AllocationError> {
        Ok(Self {
            buffers: [
                MeasurementBuffer::with_capacity(capacity)?,
                MeasurementBuffer::with_capacity(capacity)?,
                MeasurementBuffer::with_capacity(capacity)?,
                MeasurementBuffer::with_capacity(capacity)?,
                MeasurementBuffer::with_capacity(capacity)?,
                MeasurementBuffer::with_capacity(capacity)?,
            ],
        })
    }

    pub fn push(&mut self, variable: Variable, value: f32) {
        self.buffers[variable.index()].push(value);
    }

    /// Record a failed read for every variable a sensor feeds.
    pub fn push_failure(&mut self, variables: &[Variable]) {
        for &variable in variables {
            self.push(variable, ERROR_SENTINEL);
        }
    }

    pub fn mean(&self, variable: Variable) -> f32 {
        self.buffers[variable.index()].mean()
    }

    pub fn latest(&self, variable: Variable) -> f32 {
        self.buffers[variable.index()].latest()
    }

    /// Latest value, or `None` if the last read of that variable failed.
    pub fn latest_valid(&self, variable: Variable) -> Option<f32> {
        let value = self.latest(variable);
        (value != ERROR_SENTINEL).then_some(value)
    }

    pub fn buffer(&self, variable: Variable) -> &MeasurementBuffer {
        &self.buffers[variable.index()]
    }

    pub fn capacity(&self) -> usize {
        self.buffers[0].capacity()
    }
}
