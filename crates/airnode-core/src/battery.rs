//! Battery charge estimation
//!
//! The battery monitor collaborator samples the divided cell voltage; these
//! helpers turn that reading into the percentage stored in the
//! [`Variable::BatteryLevel`](crate::measurements::Variable::BatteryLevel)
//! buffer.

use thiserror_no_std::Error;

/// Li-ion discharge curve as (millivolts, percent), highest voltage first.
///
/// An estimate; tune per cell.
pub const DISCHARGE_CURVE: [(u16, f32); 11] = [
    (4200, 100.0),
    (4060, 90.0),
    (4030, 80.0),
    (3920, 70.0),
    (3830, 60.0),
    (3750, 50.0),
    (3670, 40.0),
    (3550, 30.0),
    (3460, 20.0),
    (3270, 10.0),
    (3060, 0.0),
];

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryError {
    #[error("Voltage divider resistor R2 must be non-zero")]
    InvalidDivider,
}

/// Convert a cell voltage to a charge percentage.
///
/// Voltages above the top of the curve read as 100 %, below the bottom as
/// 0 %, anything between is linearly interpolated.
pub fn percentage_from_millivolts(millivolts: u16) -> f32 {
    let (top_mv, _) = DISCHARGE_CURVE[0];
    let (bottom_mv, _) = DISCHARGE_CURVE[DISCHARGE_CURVE.len() - 1];

    if millivolts >= top_mv {
        return 100.0;
    }
    if millivolts <= bottom_mv {
        return 0.0;
    }

    for pair in DISCHARGE_CURVE.windows(2) {
        let (high_mv, high_pct) = pair[0];
        let (low_mv, low_pct) = pair[1];

        if (low_mv..=high_mv).contains(&millivolts) {
            let span_mv = f32::from(high_mv - low_mv);
            let offset_mv = f32::from(millivolts - low_mv);
            return low_pct + (high_pct - low_pct) * offset_mv / span_mv;
        }
    }

    // The curve is contiguous, so the loop always returns.
    0.0
}

/// Undo a resistor divider: `r1` on the high side, `r2` to ground.
pub fn cell_millivolts(measured_mv: u32, r1: u32, r2: u32) -> Result<u16, BatteryError> {
    if r2 == 0 {
        return Err(BatteryError::InvalidDivider);
    }

    let scaled = u64::from(measured_mv) * (u64::from(r1) + u64::from(r2)) / u64::from(r2);
    Ok(u16::try_from(scaled).unwrap_or(u16::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamps_outside_curve() {
        assert_eq!(percentage_from_millivolts(4500), 100.0);
        assert_eq!(percentage_from_millivolts(4200), 100.0);
        assert_eq!(percentage_from_millivolts(3060), 0.0);
        assert_eq!(percentage_from_millivolts(2800), 0.0);
    }

    #[test]
    fn test_curve_points_are_exact() {
        for (mv, pct) in DISCHARGE_CURVE {
            assert_eq!(percentage_from_millivolts(mv), pct, "{mv} mV");
        }
    }

    #[test]
    fn test_interpolates_between_points() {
        // Halfway between 3750 mV (50 %) and 3830 mV (60 %)
        assert_eq!(percentage_from_millivolts(3790), 55.0);
    }

    #[test]
    fn test_divider_scaling() {
        // 1031k / 510k divider, as fitted on the reference board
        assert_eq!(cell_millivolts(1275, 1031, 510), Ok(3852));
        assert_eq!(cell_millivolts(1000, 1000, 0), Err(BatteryError::InvalidDivider));
    }

    #[test]
    fn test_huge_divider_saturates() {
        assert_eq!(cell_millivolts(1000, u32::MAX, 2), Ok(u16::MAX));
    }
}
