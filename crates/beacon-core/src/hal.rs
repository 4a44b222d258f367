//! Hardware capabilities the beacon needs from its board.
//!
//! Each trait names one capability. Board support crates implement them on
//! their peripheral drivers; the simulator implements them on plain structs.

use core::convert::Infallible;

use crate::sample::RawSample;
use crate::signal::SignalState;

/// Capability to take single analog conversions.
///
/// Conversion is split into a start and a poll so event-driven HALs can
/// complete it from an interrupt or a future. [`SensorReader::read`] is the
/// blocking convenience built on top.
pub trait SensorReader {
    /// Starts one conversion.
    fn start_conversion(&mut self);

    /// Returns the result once the conversion started last has completed,
    /// `WouldBlock` until then.
    fn poll_conversion(&mut self) -> nb::Result<RawSample, Infallible>;

    /// Starts a conversion and waits for its result.
    fn read(&mut self) -> RawSample {
        self.start_conversion();
        match nb::block!(self.poll_conversion()) {
            Ok(sample) => sample,
            Err(never) => match never {},
        }
    }
}

/// Capability to drive the periodic output waveform.
pub trait WaveformOutput {
    /// Holds the output at its saturated level with toggle-on-compare off.
    fn saturate(&mut self);

    /// Re-enables toggle-on-compare and loads a new compare value.
    fn set_compare(&mut self, value: u16);

    /// Applies a computed signal state.
    fn apply(&mut self, state: SignalState) {
        match state {
            SignalState::Saturated => self.saturate(),
            SignalState::Compare(value) => self.set_compare(value),
        }
    }
}

/// Capability to flip the status indicator.
pub trait StatusIndicator {
    /// Inverts the indicator.
    fn toggle(&mut self);
}
