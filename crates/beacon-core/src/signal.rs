//! Mapping from a distance measurement to the output waveform.
//!
//! The offset and slope below are calibration constants of the servo
//! linkage; changing them changes the pulse train the actuator sees.

use crate::hal::WaveformOutput;
use crate::sample::Measurement;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Measurements above this hold the output saturated.
pub const SATURATION_THRESHOLD: u16 = 950;
/// Measurements above this (and not saturated) use the steep slope.
pub const STEEP_RANGE_THRESHOLD: u16 = 700;
/// Offset subtracted from every measurement before scaling.
pub const COMPARE_OFFSET: u16 = 250;
/// Numerator of the steep-range slope.
pub const STEEP_SLOPE_NUM: u32 = 6;
/// Denominator of the steep-range slope.
pub const STEEP_SLOPE_DEN: u32 = 5;

/// What the waveform output is told to do for one tick.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalState {
    /// Output held at its active level, toggle-on-compare disabled.
    Saturated,
    /// Toggle-on-compare enabled with this compare value.
    Compare(u16),
}

/// Computes the signal state for a measurement.
///
/// Measurements below [`COMPARE_OFFSET`] produce a compare value of zero
/// rather than wrapping around the 16-bit range.
pub const fn signal_for(measurement: Measurement) -> SignalState {
    let m = measurement.value();
    if m > SATURATION_THRESHOLD {
        SignalState::Saturated
    } else if m > STEEP_RANGE_THRESHOLD {
        let scaled = ((m - COMPARE_OFFSET) as u32 * STEEP_SLOPE_NUM) / STEEP_SLOPE_DEN;
        SignalState::Compare(scaled as u16)
    } else {
        SignalState::Compare(m.saturating_sub(COMPARE_OFFSET))
    }
}

/// Computes the signal state for `measurement` and applies it to `output`.
pub fn drive<W: WaveformOutput>(output: &mut W, measurement: Measurement) -> SignalState {
    let state = signal_for(measurement);
    output.apply(state);
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::RecordingOutput;

    fn compare_for(value: u16) -> SignalState {
        signal_for(Measurement::new(value))
    }

    #[test]
    fn test_far_target_saturates() {
        assert_eq!(compare_for(1000), SignalState::Saturated);
        assert_eq!(compare_for(951), SignalState::Saturated);
        assert_eq!(compare_for(1023), SignalState::Saturated);
    }

    #[test]
    fn test_steep_range() {
        // ((800 - 250) * 6) / 5 = 660
        assert_eq!(compare_for(800), SignalState::Compare(660));
        // Upper edge is still the steep range: ((950 - 250) * 6) / 5 = 840
        assert_eq!(compare_for(950), SignalState::Compare(840));
        // ((701 - 250) * 6) / 5 = 541.2 truncates to 541
        assert_eq!(compare_for(701), SignalState::Compare(541));
    }

    #[test]
    fn test_linear_range() {
        assert_eq!(compare_for(500), SignalState::Compare(250));
        assert_eq!(compare_for(700), SignalState::Compare(450));
        assert_eq!(compare_for(250), SignalState::Compare(0));
    }

    #[test]
    fn test_below_offset_clamps_to_zero() {
        assert_eq!(compare_for(249), SignalState::Compare(0));
        assert_eq!(compare_for(0), SignalState::Compare(0));
    }

    #[test]
    fn test_drive_applies_to_output() {
        let mut output = RecordingOutput::default();
        drive(&mut output, Measurement::new(500));
        assert_eq!(output.last, Some(SignalState::Compare(250)));

        drive(&mut output, Measurement::new(990));
        assert_eq!(output.last, Some(SignalState::Saturated));
        assert_eq!(output.saturations, 1);
    }
}
