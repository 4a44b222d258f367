//! Operating mode and the heartbeat interval it implies.

use core::fmt;

use crate::error::ProtocolError;
use crate::protocol::{NORMAL_MODE, SERIAL_MODE};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Heartbeat interval in normal mode (ms).
pub const NORMAL_MODE_INTERVAL_MS: u16 = 500;
/// Heartbeat interval in serial mode (ms).
pub const SERIAL_MODE_INTERVAL_MS: u16 = 150;

/// A defined operating mode.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperatingMode {
    /// Standalone operation, slow heartbeat.
    #[default]
    Normal,
    /// A host is polling over the serial line, fast heartbeat.
    Serial,
}

impl OperatingMode {
    /// Wire byte of this mode.
    pub const fn code(self) -> u8 {
        match self {
            OperatingMode::Normal => NORMAL_MODE,
            OperatingMode::Serial => SERIAL_MODE,
        }
    }

    /// Heartbeat interval this mode selects, in milliseconds.
    pub const fn interval_ms(self) -> u16 {
        match self {
            OperatingMode::Normal => NORMAL_MODE_INTERVAL_MS,
            OperatingMode::Serial => SERIAL_MODE_INTERVAL_MS,
        }
    }
}

impl TryFrom<u8> for OperatingMode {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            NORMAL_MODE => Ok(OperatingMode::Normal),
            SERIAL_MODE => Ok(OperatingMode::Serial),
            other => Err(ProtocolError::UnknownMode(other)),
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatingMode::Normal => write!(f, "normal"),
            OperatingMode::Serial => write!(f, "serial"),
        }
    }
}

/// The stored mode byte together with the heartbeat interval in effect.
///
/// The mode byte accepts any value written by the host. Only the two defined
/// modes move the interval, so after writing an undefined byte the pair is
/// deliberately mismatched: the mode reads back as written while the
/// interval keeps whatever value it had.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSetting {
    mode: u8,
    interval_ms: u16,
}

impl ModeSetting {
    /// Setting for a defined mode.
    pub const fn new(mode: OperatingMode) -> Self {
        ModeSetting {
            mode: mode.code(),
            interval_ms: mode.interval_ms(),
        }
    }

    /// The raw mode byte as last written.
    pub const fn mode_byte(&self) -> u8 {
        self.mode
    }

    /// The stored mode, if it is a defined one.
    pub fn mode(&self) -> Option<OperatingMode> {
        OperatingMode::try_from(self.mode).ok()
    }

    /// Heartbeat interval in milliseconds.
    pub const fn interval_ms(&self) -> u16 {
        self.interval_ms
    }

    /// Applies a mode byte written by the host and returns the new setting.
    pub fn with_mode_byte(self, byte: u8) -> Self {
        let interval_ms = match OperatingMode::try_from(byte) {
            Ok(mode) => mode.interval_ms(),
            Err(_) => self.interval_ms,
        };
        ModeSetting {
            mode: byte,
            interval_ms,
        }
    }
}

impl Default for ModeSetting {
    fn default() -> Self {
        ModeSetting::new(OperatingMode::Normal)
    }
}
