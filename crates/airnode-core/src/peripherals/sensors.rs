use log::{debug, error};
use thiserror_no_std::Error;

use super::PowerGate;
use crate::measurements::{MeasurementBuffers, Variable};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: failed to {operation} ({details})")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: initialization failed ({details})")]
    InitializationFailed {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: timed out while trying to {operation}")]
    Timeout {
        sensor: &'static str,
        operation: &'static str,
    },
}

/// Trait for sensor reading data structures.
/// Provides compile-time guarantees about the number of values and their conversion to arrays.
pub trait SensorReadings<const COUNT: usize> {
    /// Convert the readings into a fixed-size array, ordered like [`Sensor::VARIABLES`].
    fn to_array(self) -> [f32; COUNT];
}

/// Trait for sensors that produce typed readings.
pub trait Sensor<const COUNT: usize> {
    /// The type of readings this sensor produces.
    type Readings: SensorReadings<COUNT>;

    /// Name used in logs
    const NAME: &'static str;

    /// The buffers this sensor feeds, in the order of [`SensorReadings::to_array`].
    const VARIABLES: [Variable; COUNT];

    /// Read the sensor and return typed readings.
    fn read(&mut self) -> impl Future<Output = Result<Self::Readings, SensorError>>;
}

/// Read `sensor` and push its values into their buffers.
///
/// On failure every variable the sensor feeds receives the error sentinel, so
/// all buffers keep advancing together.
pub async fn read_into<S, const COUNT: usize>(
    sensor: &mut S,
    buffers: &mut MeasurementBuffers,
) -> Result<(), SensorError>
where
    S: Sensor<COUNT>,
{
    match sensor.read().await {
        Ok(readings) => {
            for (variable, value) in S::VARIABLES.into_iter().zip(readings.to_array()) {
                debug!("{}: {} = {}{}", S::NAME, variable.label(), value, variable.unit());
                buffers.push(variable, value);
            }
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            buffers.push_failure(&S::VARIABLES);
            Err(e)
        }
    }
}

/// Every enabled sensor on the node, including the battery monitor.
pub trait SensorArray: PowerGate {
    /// Check that every sensor is present and configure it.
    fn init(&mut self) -> Result<(), SensorError>;

    /// Read every enabled sensor into `buffers`.
    ///
    /// Implementations must attempt every sensor even after one fails, and
    /// report the last failure.
    fn read_all(
        &mut self,
        buffers: &mut MeasurementBuffers,
    ) -> impl Future<Output = Result<(), SensorError>>;
}
