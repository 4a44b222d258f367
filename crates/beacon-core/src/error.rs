//! Error types for the beacon core library.
//!
//! This module defines the errors produced when decoding wire bytes into
//! typed protocol values.

use core::fmt;

/// Errors that can occur while decoding protocol bytes.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// The byte in opcode position names no known command.
    UnknownOpcode(u8),
    /// The byte in target position names no readable or writable value.
    UnknownTarget(u8),
    /// The byte written as a mode is not a defined operating mode.
    UnknownMode(u8),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::UnknownOpcode(byte) => write!(f, "Unknown opcode: {:#04x}", byte),
            ProtocolError::UnknownTarget(byte) => write!(f, "Unknown target: {:#04x}", byte),
            ProtocolError::UnknownMode(byte) => write!(f, "Unknown operating mode: {:#04x}", byte),
        }
    }
}

impl core::error::Error for ProtocolError {}
