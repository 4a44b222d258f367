//! Device-wide state shared between the tick, serial and heartbeat contexts.
//!
//! Every field is written by exactly one producer: the measurement by the
//! sampler, the mode setting by the command processor. All access goes
//! through a critical section so a reader never observes a half-written
//! multi-byte value.

use core::cell::Cell;

use critical_section::Mutex;

use crate::mode::{ModeSetting, OperatingMode};
use crate::sample::Measurement;

/// Shared state of one beacon.
///
/// `new` is `const`, so a firmware image can keep the state in a `static`.
pub struct DeviceState {
    measurement: Mutex<Cell<Measurement>>,
    mode: Mutex<Cell<ModeSetting>>,
}

impl DeviceState {
    /// Power-on state: measurement 0, normal mode.
    pub const fn new() -> Self {
        DeviceState {
            measurement: Mutex::new(Cell::new(Measurement::new(0))),
            mode: Mutex::new(Cell::new(ModeSetting::new(OperatingMode::Normal))),
        }
    }

    /// Latest published measurement.
    pub fn measurement(&self) -> Measurement {
        critical_section::with(|cs| self.measurement.borrow(cs).get())
    }

    /// Publishes a new measurement. Called by the sampler only.
    pub fn publish_measurement(&self, measurement: Measurement) {
        critical_section::with(|cs| self.measurement.borrow(cs).set(measurement));
    }

    /// Current mode byte and heartbeat interval, read together.
    pub fn mode_setting(&self) -> ModeSetting {
        critical_section::with(|cs| self.mode.borrow(cs).get())
    }

    /// Current heartbeat interval in milliseconds.
    pub fn interval_ms(&self) -> u16 {
        self.mode_setting().interval_ms()
    }

    /// Stores a mode byte written by the host and returns the resulting
    /// setting. Called by the command processor only.
    pub fn write_mode(&self, byte: u8) -> ModeSetting {
        critical_section::with(|cs| {
            let cell = self.mode.borrow(cs);
            let updated = cell.get().with_mode_byte(byte);
            cell.set(updated);
            updated
        })
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        DeviceState::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SERIAL_MODE;

    static SHARED: DeviceState = DeviceState::new();

    #[test]
    fn test_power_on_state() {
        let device = DeviceState::new();
        assert_eq!(device.measurement(), Measurement::new(0));
        assert_eq!(device.mode_setting().mode(), Some(OperatingMode::Normal));
        assert_eq!(device.interval_ms(), 500);
    }

    #[test]
    fn test_write_mode_returns_stored_setting() {
        let device = DeviceState::new();
        let setting = device.write_mode(SERIAL_MODE);
        assert_eq!(setting, device.mode_setting());
        assert_eq!(device.interval_ms(), 150);
    }

    #[test]
    fn test_static_state_is_shareable_across_threads() {
        let writer = std::thread::spawn(|| {
            for value in 0..=1023u16 {
                SHARED.publish_measurement(Measurement::new(value));
            }
        });
        for _ in 0..1000 {
            assert!(SHARED.measurement().value() <= 1023);
        }
        writer.join().unwrap();
        assert_eq!(SHARED.measurement().value(), 1023);
    }
}
