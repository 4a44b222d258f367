//! Error types for the host link

/// Result type alias
pub type Result<T> = std::result::Result<T, ClientError>;

/// Failures while talking to a beacon
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No byte arrived within the reply timeout
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    /// The device answered a handshake with the wrong byte
    #[error("Unexpected {stage} byte: expected {expected:#04x}, got {actual:#04x}")]
    Handshake {
        /// Which part of the frame was being read
        stage: &'static str,
        /// Byte the protocol calls for
        expected: u8,
        /// Byte that arrived
        actual: u8,
    },

    /// Reply payload had the wrong length
    #[error("Expected a {expected}-byte payload, got {actual}")]
    PayloadLength {
        /// Length the command produces
        expected: usize,
        /// Length announced by the device
        actual: usize,
    },

    /// Mode read back after a write does not match
    #[error("Mode write not applied: wrote {written:#04x}, read back {read:#04x}")]
    ModeMismatch {
        /// Mode byte sent
        written: u8,
        /// Mode byte reported afterwards
        read: u8,
    },

    /// The other end of the link is gone
    #[error("Link disconnected")]
    Disconnected,
}
