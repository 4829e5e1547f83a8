use core::fmt::Write as _;

use thiserror_no_std::Error;

use super::PowerGate;
use crate::measurements::{MeasurementBuffers, Variable};
use crate::metrics::AirQuality;

/// A full e-paper refresh is forced every this many renders to clear ghosting.
pub const FULL_REFRESH_EVERY: u8 = 10;

/// Short formatted value for one display field
pub type Label = heapless::String<16>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayError {
    #[error("Display device is not ready")]
    NotReady,
    #[error("Display render failed: {details}")]
    RenderFailed { details: &'static str },
}

/// Values shown on the display after a measurement.
///
/// Fields are `None` when the latest read of that variable failed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayFrame {
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub co2: Option<f32>,
    pub battery: Option<f32>,
    pub air_quality: AirQuality,
    /// Redraw the whole panel instead of a partial update
    pub full_refresh: bool,
}

impl DisplayFrame {
    /// Build a frame from the latest value of each buffer.
    pub fn from_latest(buffers: &MeasurementBuffers, full_refresh: bool) -> Self {
        Self {
            temperature: buffers.latest_valid(Variable::Temperature),
            humidity: buffers.latest_valid(Variable::Humidity),
            co2: buffers.latest_valid(Variable::Co2),
            battery: buffers.latest_valid(Variable::BatteryLevel),
            air_quality: AirQuality::from_voc_index(buffers.latest(Variable::VocIndex)),
            full_refresh,
        }
    }

    /// Temperature with one decimal, e.g. `21.4°C`
    pub fn temperature_label(&self) -> Label {
        format_label(self.temperature, |label, v| write!(label, "{:.1}°C", v))
    }

    /// Humidity as whole percent, e.g. `45%`
    pub fn humidity_label(&self) -> Label {
        format_label(self.humidity, |label, v| write!(label, "{}%", v as i32))
    }

    /// CO2 in whole ppm
    pub fn co2_label(&self) -> Label {
        format_label(self.co2, |label, v| write!(label, "{}", v as i32))
    }

    /// Battery as whole percent
    pub fn battery_label(&self) -> Label {
        format_label(self.battery, |label, v| write!(label, "{}%", v as i32))
    }
}

fn format_label(
    value: Option<f32>,
    format: impl FnOnce(&mut Label, f32) -> core::fmt::Result,
) -> Label {
    let mut label = Label::new();
    let written = match value {
        Some(v) => format(&mut label, v),
        None => label.write_str("n/a"),
    };
    if written.is_err() {
        label.clear();
        let _ = label.write_str("?");
    }
    label
}

/// Counts renders and decides when the next one must be a full refresh.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshPolicy {
    renders: u8,
}

impl RefreshPolicy {
    /// Register a render; returns `true` if it must be a full refresh.
    pub fn next(&mut self) -> bool {
        self.renders += 1;
        if self.renders >= FULL_REFRESH_EVERY {
            self.renders = 0;
            true
        } else {
            false
        }
    }
}

/// The node's display.
pub trait Display: PowerGate {
    fn init(&mut self) -> Result<(), DisplayError>;

    /// Draw `frame`. The display is powered (via [`PowerGate::activate`]) before this is called.
    fn render(&mut self, frame: &DisplayFrame) -> Result<(), DisplayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurements::ERROR_SENTINEL;

    #[test]
    fn test_frame_uses_latest_values() {
        let mut buffers = MeasurementBuffers::with_capacity(3).unwrap();
        buffers.push(Variable::Temperature, 19.0);
        buffers.push(Variable::Temperature, 21.3);
        buffers.push(Variable::Humidity, 48.7);
        buffers.push(Variable::Co2, ERROR_SENTINEL);
        buffers.push(Variable::VocIndex, 150.0);
        buffers.push(Variable::BatteryLevel, 87.0);

        let frame = DisplayFrame::from_latest(&buffers, false);

        assert_eq!(frame.temperature, Some(21.3));
        assert_eq!(frame.co2, None);
        assert_eq!(frame.air_quality, AirQuality::Fair);
        assert_eq!(frame.humidity_label().as_str(), "48%");
        assert_eq!(frame.co2_label().as_str(), "n/a");
        assert_eq!(frame.battery_label().as_str(), "87%");
        assert_eq!(frame.temperature_label().as_str(), "21.3°C");
    }

    #[test]
    fn test_full_refresh_every_tenth_render() {
        let mut policy = RefreshPolicy::default();
        let refreshes: usize = (0..30).filter(|_| policy.next()).count();
        assert_eq!(refreshes, 3);

        let mut policy = RefreshPolicy::default();
        for _ in 0..9 {
            assert!(!policy.next());
        }
        assert!(policy.next());
    }
}
