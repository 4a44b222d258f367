//! Wire bytes of the serial command protocol.
//!
//! A frame on the wire is `START, opcode, [target], [payload], ACK, END`.
//! Every value below is part of the wire contract shared with the host.

use crate::error::ProtocolError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Opens a frame.
pub const START: u8 = 0x00;
/// Handshake byte, both directions.
pub const ACK: u8 = 0x03;
/// Reply payload of a status report.
pub const OK_STATUS: u8 = 0x06;
/// Sent by the device on a bad start byte or a missing trailing ACK.
pub const ERROR: u8 = 0x0A;
/// Closes a frame.
pub const END: u8 = 0x04;

/// Opcode: read a value selected by the following target byte.
pub const READ: u8 = 0x01;
/// Opcode: write a value selected by the following target byte.
pub const WRITE: u8 = 0x0C;
/// Opcode: report device status.
pub const REPORT_STATUS: u8 = 0x07;

/// Target: the published distance measurement.
pub const DISTANCE_SAMPLE: u8 = 0x02;
/// Target: a fresh raw conversion of analog channel 0.
pub const ADC0_SAMPLE: u8 = 0x05;
/// Target: the operating mode.
pub const OPMODE: u8 = 0x0B;

/// Mode value selecting the normal (slow) heartbeat.
pub const NORMAL_MODE: u8 = 0x08;
/// Mode value selecting the serial (fast) heartbeat.
pub const SERIAL_MODE: u8 = 0x09;

/// Length byte preceding a one-byte reply payload.
pub const LEN_BYTE: u8 = 0x01;
/// Length byte preceding a little-endian 16-bit reply payload.
pub const LEN_WORD: u8 = 0x02;
/// Reply to a write; reads as a zero-length payload on the host side.
pub const WRITE_DONE: u8 = 0x00;

/// Command selected by the second byte of a frame.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Read the value selected by a [`Target`].
    Read,
    /// Write the value selected by a [`Target`].
    Write,
    /// Report device status.
    ReportStatus,
}

impl Opcode {
    /// Wire byte of this opcode.
    pub const fn code(self) -> u8 {
        match self {
            Opcode::Read => READ,
            Opcode::Write => WRITE,
            Opcode::ReportStatus => REPORT_STATUS,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            READ => Ok(Opcode::Read),
            WRITE => Ok(Opcode::Write),
            REPORT_STATUS => Ok(Opcode::ReportStatus),
            other => Err(ProtocolError::UnknownOpcode(other)),
        }
    }
}

/// Value addressed by a read or write.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The published distance measurement.
    DistanceSample,
    /// A fresh raw sample of analog channel 0.
    Adc0Sample,
    /// The operating mode.
    OpMode,
}

impl Target {
    /// Wire byte of this target.
    pub const fn code(self) -> u8 {
        match self {
            Target::DistanceSample => DISTANCE_SAMPLE,
            Target::Adc0Sample => ADC0_SAMPLE,
            Target::OpMode => OPMODE,
        }
    }
}

impl TryFrom<u8> for Target {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            DISTANCE_SAMPLE => Ok(Target::DistanceSample),
            ADC0_SAMPLE => Ok(Target::Adc0Sample),
            OPMODE => Ok(Target::OpMode),
            other => Err(ProtocolError::UnknownTarget(other)),
        }
    }
}

/// Splits a 16-bit value into its little-endian wire bytes.
pub const fn word_bytes(value: u16) -> [u8; 2] {
    value.to_le_bytes()
}

/// Rebuilds a 16-bit value from its little-endian wire bytes.
pub const fn word_from_bytes(low: u8, high: u8) -> u16 {
    u16::from_le_bytes([low, high])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_from_wire() {
        assert_eq!(Opcode::try_from(0x01), Ok(Opcode::Read));
        assert_eq!(Opcode::try_from(0x0C), Ok(Opcode::Write));
        assert_eq!(Opcode::try_from(0x07), Ok(Opcode::ReportStatus));
        assert_eq!(Opcode::try_from(0x42), Err(ProtocolError::UnknownOpcode(0x42)));
    }

    #[test]
    fn test_target_from_wire() {
        assert_eq!(Target::try_from(0x02), Ok(Target::DistanceSample));
        assert_eq!(Target::try_from(0x05), Ok(Target::Adc0Sample));
        assert_eq!(Target::try_from(0x0B), Ok(Target::OpMode));
        // Mode values are not targets
        assert_eq!(Target::try_from(NORMAL_MODE), Err(ProtocolError::UnknownTarget(0x08)));
    }

    #[test]
    fn test_words_are_little_endian() {
        assert_eq!(word_bytes(0x0312), [0x12, 0x03]);
        assert_eq!(word_from_bytes(0x12, 0x03), 0x0312);
        assert_eq!(word_from_bytes(0xFF, 0x00), 255);
        assert_eq!(word_from_bytes(0x00, 0x01), 256);
    }
}
