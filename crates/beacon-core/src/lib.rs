#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![doc = "A `no_std` library for a distance-sensing beacon."]
#![doc = ""]
#![doc = "This crate provides the byte-at-a-time serial command processor, the"]
#![doc = "sample-to-signal pipeline run on every timer tick, the operating mode"]
#![doc = "manager and the shared device state these components communicate through."]

pub mod command;
pub mod error;
pub mod hal;
pub mod heartbeat;
pub mod mode;
pub mod protocol;
pub mod sample;
pub mod signal;
pub mod state;

pub use command::{CommandProcessor, FrameFault, FramePhase, Reply, Step};
pub use error::ProtocolError;
pub use hal::{SensorReader, StatusIndicator, WaveformOutput};
pub use heartbeat::Heartbeat;
pub use mode::{ModeSetting, OperatingMode};
pub use sample::{Measurement, RawSample};
pub use signal::SignalState;
pub use state::DeviceState;

/// Runs one periodic tick: sample the sensor, publish the new measurement
/// and drive the waveform output from it.
///
/// Returns the signal state that was applied to `output`.
pub fn timer_tick<S, W>(sensor: &mut S, output: &mut W, device: &DeviceState) -> SignalState
where
    S: SensorReader,
    W: WaveformOutput,
{
    let measurement = sample::sample_distance(sensor, device);
    signal::drive(output, measurement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::{FixedSensor, RecordingOutput};

    #[test]
    fn test_timer_tick_samples_then_drives() {
        let device = DeviceState::new();
        // !200 & 0x3FF = 823 -> ((823 - 250) * 6) / 5 = 687
        let mut sensor = FixedSensor::new(200);
        let mut output = RecordingOutput::default();

        let state = timer_tick(&mut sensor, &mut output, &device);

        assert_eq!(device.measurement(), Measurement::new(823));
        assert_eq!(state, SignalState::Compare(687));
        assert_eq!(output.last, Some(SignalState::Compare(687)));
    }

    #[test]
    fn test_timer_tick_saturates_on_near_reading() {
        let device = DeviceState::new();
        // !10 & 0x3FF = 1013
        let mut sensor = FixedSensor::new(10);
        let mut output = RecordingOutput::default();

        let state = timer_tick(&mut sensor, &mut output, &device);

        assert_eq!(state, SignalState::Saturated);
        assert_eq!(output.saturations, 1);
    }
}
