//! Air quality assessment for sensor data
//!
//! Maps the VOC index reported by the gas sensor onto the coarse levels shown
//! on the display.

/// Air quality level derived from the VOC index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AirQuality {
    /// VOC index 0-79
    Excellent,
    /// VOC index 80-119
    Good,
    /// VOC index 120-199
    Fair,
    /// VOC index 200-299
    Inferior,
    /// VOC index 300-500
    Poor,
    /// Outside the sensor's 0-500 range (including failed reads)
    Unknown,
}

impl AirQuality {
    /// Assess air quality for a VOC index reading.
    ///
    /// The index is truncated to an integer first, matching how the gas index
    /// algorithm reports it.
    pub fn from_voc_index(voc_index: f32) -> Self {
        if !voc_index.is_finite() {
            return Self::Unknown;
        }

        match voc_index as i32 {
            0..=79 => Self::Excellent,
            80..=119 => Self::Good,
            120..=199 => Self::Fair,
            200..=299 => Self::Inferior,
            300..=500 => Self::Poor,
            _ => Self::Unknown,
        }
    }

    /// Get the display label for this level
    pub const fn label(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Inferior => "Inferior",
            Self::Poor => "Poor",
            Self::Unknown => "Unknown",
        }
    }
}
