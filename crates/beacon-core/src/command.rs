//! Serial command processor.
//!
//! The processor is advanced by exactly one received byte per call and
//! never waits for further input: whatever it still expects from the host
//! is recorded in its [`FramePhase`]. Each call returns the bytes to send
//! back for that step.
//!
//! Frame walk-through for a distance read:
//!
//! | host sends | phase before | device replies |
//! |---|---|---|
//! | `START` | `Idle` | `ACK` |
//! | `READ` | `Opcode` | nothing |
//! | `DISTANCE_SAMPLE` | `ReadTarget` | `2, lo, hi` |
//! | `ACK` | `TrailingAck` | nothing |
//! | `END` | `End` | `ACK` |

use heapless::Vec;

use crate::hal::SensorReader;
use crate::mode::ModeSetting;
use crate::protocol::{self, Opcode, Target};
use crate::state::DeviceState;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Longest reply produced by a single step (length byte plus a word).
pub const MAX_REPLY_LEN: usize = 3;

/// Bytes to transmit in response to one received byte.
pub type Reply = Vec<u8, MAX_REPLY_LEN>;

/// Position of the processor within a frame.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramePhase {
    /// Waiting for `START`.
    #[default]
    Idle,
    /// Waiting for the opcode.
    Opcode,
    /// Waiting for the target of a read.
    ReadTarget,
    /// Waiting for the target of a write.
    WriteTarget,
    /// Waiting for the mode byte of a mode write.
    ModeValue,
    /// Waiting for the host's trailing `ACK`.
    TrailingAck,
    /// Waiting for `END`.
    End,
}

/// Protocol violation detected while processing a byte.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFault {
    /// A frame began with something other than `START`; it was abandoned.
    BadStart(u8),
    /// The trailing handshake was not `ACK`; processing went on to `END`.
    MissingAck(u8),
}

/// Outcome of feeding one byte to the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Bytes to transmit, in order.
    pub reply: Reply,
    /// Violation reported to the host with an `ERROR` byte, if any.
    pub fault: Option<FrameFault>,
    /// New mode setting when this byte completed a mode write.
    pub mode_written: Option<ModeSetting>,
    /// Whether the processor is back to waiting for `START`.
    pub frame_done: bool,
}

/// Byte-driven protocol state machine.
#[derive(Debug, Clone, Default)]
pub struct CommandProcessor {
    phase: FramePhase,
}

impl CommandProcessor {
    /// A processor waiting for `START`.
    pub const fn new() -> Self {
        CommandProcessor {
            phase: FramePhase::Idle,
        }
    }

    /// Current position within a frame.
    pub const fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Whether a frame has been started and not yet finished.
    pub fn in_frame(&self) -> bool {
        self.phase != FramePhase::Idle
    }

    /// Abandons any partially received frame.
    pub fn reset(&mut self) {
        self.phase = FramePhase::Idle;
    }

    /// Processes one received byte.
    ///
    /// `sensor` is only touched when the byte selects a raw ADC read.
    pub fn on_byte<S: SensorReader>(&mut self, byte: u8, device: &DeviceState, sensor: &mut S) -> Step {
        let mut step = Step {
            reply: Reply::new(),
            fault: None,
            mode_written: None,
            frame_done: false,
        };

        self.phase = match self.phase {
            FramePhase::Idle => {
                if byte == protocol::START {
                    step.reply = reply(&[protocol::ACK]);
                    FramePhase::Opcode
                } else {
                    step.reply = reply(&[protocol::ERROR]);
                    step.fault = Some(FrameFault::BadStart(byte));
                    FramePhase::Idle
                }
            }
            FramePhase::Opcode => match Opcode::try_from(byte) {
                Ok(Opcode::ReportStatus) => {
                    step.reply = reply(&[protocol::LEN_BYTE, protocol::OK_STATUS]);
                    FramePhase::TrailingAck
                }
                Ok(Opcode::Read) => FramePhase::ReadTarget,
                Ok(Opcode::Write) => FramePhase::WriteTarget,
                Err(_) => FramePhase::TrailingAck,
            },
            FramePhase::ReadTarget => {
                step.reply = match Target::try_from(byte) {
                    Ok(Target::OpMode) => {
                        reply(&[protocol::LEN_BYTE, device.mode_setting().mode_byte()])
                    }
                    Ok(Target::DistanceSample) => word_reply(device.measurement().value()),
                    Ok(Target::Adc0Sample) => word_reply(sensor.read().value()),
                    Err(_) => Reply::new(),
                };
                FramePhase::TrailingAck
            }
            FramePhase::WriteTarget => match Target::try_from(byte) {
                Ok(Target::OpMode) => FramePhase::ModeValue,
                _ => FramePhase::TrailingAck,
            },
            FramePhase::ModeValue => {
                step.mode_written = Some(device.write_mode(byte));
                step.reply = reply(&[protocol::WRITE_DONE]);
                FramePhase::TrailingAck
            }
            FramePhase::TrailingAck => {
                if byte != protocol::ACK {
                    step.reply = reply(&[protocol::ERROR]);
                    step.fault = Some(FrameFault::MissingAck(byte));
                }
                FramePhase::End
            }
            FramePhase::End => {
                if byte == protocol::END {
                    step.reply = reply(&[protocol::ACK]);
                }
                FramePhase::Idle
            }
        };

        step.frame_done = self.phase == FramePhase::Idle;
        step
    }
}

fn reply(bytes: &[u8]) -> Reply {
    debug_assert!(bytes.len() <= MAX_REPLY_LEN);
    Reply::from_slice(bytes).unwrap_or_default()
}

fn word_reply(value: u16) -> Reply {
    let [low, high] = protocol::word_bytes(value);
    reply(&[protocol::LEN_WORD, low, high])
}
