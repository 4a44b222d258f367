//! Raw ADC samples and the distance measurement derived from them.

use core::fmt;

use crate::hal::SensorReader;
use crate::state::DeviceState;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Mask for the 10-bit conversion result.
pub const SAMPLE_MASK: u16 = 0x3FF;

/// One right-adjusted 10-bit conversion result.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawSample(u16);

impl RawSample {
    /// Wraps a conversion result as read from the data register.
    pub const fn new(value: u16) -> Self {
        RawSample(value)
    }

    /// The value as read from the data register.
    pub const fn value(self) -> u16 {
        self.0
    }
}

/// Distance measurement published once per tick.
///
/// Held in 16 bits but only the low 10 carry information: the sensor output
/// falls as the target moves away, so the complement of the raw sample grows
/// with distance.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Measurement(u16);

impl Measurement {
    /// Wraps an already derived measurement value.
    pub const fn new(value: u16) -> Self {
        Measurement(value)
    }

    /// Derives the measurement from a raw sample: `(!raw) & 0x3FF`.
    pub const fn from_raw(raw: RawSample) -> Self {
        Measurement(!raw.0 & SAMPLE_MASK)
    }

    /// The measurement value.
    pub const fn value(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Takes one sample from `sensor`, derives the measurement and publishes it
/// to `device`.
pub fn sample_distance<S: SensorReader>(sensor: &mut S, device: &DeviceState) -> Measurement {
    let measurement = Measurement::from_raw(sensor.read());
    device.publish_measurement(measurement);
    measurement
}
