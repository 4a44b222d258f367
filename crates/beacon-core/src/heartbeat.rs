//! Status heartbeat.

use crate::hal::StatusIndicator;
use crate::state::DeviceState;

/// Blinks a status indicator at the rate selected by the operating mode.
pub struct Heartbeat<L> {
    indicator: L,
    beats: u32,
}

impl<L: StatusIndicator> Heartbeat<L> {
    /// Wraps the indicator to blink.
    pub fn new(indicator: L) -> Self {
        Self { indicator, beats: 0 }
    }

    /// Toggles the indicator and returns how long to pause before the next
    /// beat, in milliseconds.
    ///
    /// The interval is read after toggling so a mode change made while the
    /// caller slept takes effect on the very next pause.
    pub fn beat(&mut self, device: &DeviceState) -> u16 {
        self.indicator.toggle();
        self.beats = self.beats.wrapping_add(1);
        device.interval_ms()
    }

    /// Number of toggles so far.
    pub fn beats(&self) -> u32 {
        self.beats
    }

    /// Consumes the heartbeat and returns the indicator.
    pub fn into_inner(self) -> L {
        self.indicator
    }
}
