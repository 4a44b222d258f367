//! Host side of the beacon's serial command protocol.
//!
//! Every command runs as one frame:
//!
//! 1. send `START`, expect `ACK`
//! 2. send the command bytes
//! 3. read the length byte `n`, then `n` payload bytes
//! 4. send `ACK` and `END`, expect `ACK`
//!
//! The client is blocking. Async callers run it on a blocking thread.

use std::time::{Duration, Instant};

use beacon_core::OperatingMode;
use beacon_core::protocol::{
    self, ACK, ADC0_SAMPLE, DISTANCE_SAMPLE, END, OPMODE, READ, REPORT_STATUS, START, WRITE,
};
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::transport::Transport;

/// Reference voltage of the beacon's converter.
pub const ADC_REFERENCE_VOLTS: f64 = 5.0;
/// Largest 10-bit conversion result.
pub const ADC_FULL_SCALE: f64 = 1023.0;

/// Fit of the IR range sensor's output curve: `cm = GAIN * raw^-EXPONENT`.
pub const DISTANCE_GAIN: f64 = 12343.85;
pub const DISTANCE_EXPONENT: f64 = 1.15;

/// Converts a raw conversion result to volts.
pub fn adc_to_volts(raw: u16) -> f64 {
    raw as f64 * ADC_REFERENCE_VOLTS / ADC_FULL_SCALE
}

/// Converts a raw conversion result to centimetres.
///
/// A raw value of 0 yields infinity, which callers treat as out of range.
pub fn adc_to_distance_cm(raw: u16) -> f64 {
    DISTANCE_GAIN * (raw as f64).powf(-DISTANCE_EXPONENT)
}

/// Blocking protocol client over any [`Transport`].
pub struct Client<T> {
    transport: T,
    reply_timeout: Duration,
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T, reply_timeout: Duration) -> Self {
        Self {
            transport,
            reply_timeout,
        }
    }

    /// Runs one frame carrying `command` and returns the reply payload.
    pub fn execute_command(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        self.transport.write(&[START])?;
        self.expect(ACK, "start ack")?;

        self.transport.write(command)?;
        self.transport.flush()?;
        let n = self.read_byte("length")? as usize;
        let mut payload = Vec::with_capacity(n);
        for _ in 0..n {
            payload.push(self.read_byte("payload")?);
        }

        self.transport.write(&[ACK, END])?;
        self.transport.flush()?;
        self.expect(ACK, "end ack")?;

        debug!(?command, ?payload, "Frame complete");
        Ok(payload)
    }

    /// Status byte; a healthy beacon reports `OK_STATUS`.
    pub fn status(&mut self) -> Result<u8> {
        self.read_one(&[REPORT_STATUS])
    }

    /// Raw mode byte, which need not be a defined mode.
    pub fn mode(&mut self) -> Result<u8> {
        self.read_one(&[READ, OPMODE])
    }

    /// Writes the mode and reads it back to confirm the beacon took it.
    pub fn set_mode(&mut self, mode: OperatingMode) -> Result<()> {
        self.execute_command(&[WRITE, OPMODE, mode.code()])?;
        let read = self.mode()?;
        if read != mode.code() {
            return Err(ClientError::ModeMismatch {
                written: mode.code(),
                read,
            });
        }
        Ok(())
    }

    /// Fresh raw conversion of analog channel 0.
    pub fn adc_raw(&mut self) -> Result<u16> {
        self.read_word(&[READ, ADC0_SAMPLE])
    }

    /// Last distance measurement published by the beacon's tick.
    pub fn distance_raw(&mut self) -> Result<u16> {
        self.read_word(&[READ, DISTANCE_SAMPLE])
    }

    pub fn adc_volts(&mut self) -> Result<f64> {
        Ok(adc_to_volts(self.adc_raw()?))
    }

    /// Distance in centimetres from a fresh raw conversion.
    pub fn distance_cm(&mut self) -> Result<f64> {
        Ok(adc_to_distance_cm(self.adc_raw()?))
    }

    fn read_one(&mut self, command: &[u8]) -> Result<u8> {
        let payload = self.execute_command(command)?;
        match payload.as_slice() {
            [byte] => Ok(*byte),
            _ => Err(ClientError::PayloadLength {
                expected: 1,
                actual: payload.len(),
            }),
        }
    }

    fn read_word(&mut self, command: &[u8]) -> Result<u16> {
        let payload = self.execute_command(command)?;
        match payload.as_slice() {
            [low, high] => Ok(protocol::word_from_bytes(*low, *high)),
            _ => Err(ClientError::PayloadLength {
                expected: 2,
                actual: payload.len(),
            }),
        }
    }

    fn expect(&mut self, expected: u8, stage: &'static str) -> Result<()> {
        let actual = self.read_byte(stage)?;
        if actual != expected {
            return Err(ClientError::Handshake {
                stage,
                expected,
                actual,
            });
        }
        Ok(())
    }

    fn read_byte(&mut self, stage: &'static str) -> Result<u8> {
        let deadline = Instant::now() + self.reply_timeout;
        let mut byte = [0u8; 1];
        loop {
            if self.transport.read(&mut byte)? == 1 {
                return Ok(byte[0]);
            }
            if Instant::now() >= deadline {
                return Err(ClientError::Timeout(stage));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Waveform;
    use crate::sim::{WaveformSensor, raw_for_distance};
    use beacon_core::protocol::{ERROR, OK_STATUS, SERIAL_MODE};
    use beacon_core::{CommandProcessor, DeviceState, Measurement};
    use std::collections::VecDeque;

    /// Feeds written bytes straight into a command processor; replies queue
    /// up for the next read.
    struct Loopback {
        processor: CommandProcessor,
        device: DeviceState,
        sensor: WaveformSensor,
        replies: VecDeque<u8>,
        written: Vec<u8>,
    }

    impl Loopback {
        fn new(distance_cm: f64) -> Self {
            Loopback {
                processor: CommandProcessor::new(),
                device: DeviceState::new(),
                sensor: WaveformSensor::new(Waveform::Constant { distance_cm }),
                replies: VecDeque::new(),
                written: Vec::new(),
            }
        }
    }

    impl Transport for Loopback {
        fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
            let mut n = 0;
            while n < buffer.len() {
                match self.replies.pop_front() {
                    Some(byte) => {
                        buffer[n] = byte;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }

        fn write(&mut self, data: &[u8]) -> Result<()> {
            for &byte in data {
                self.written.push(byte);
                let step = self.processor.on_byte(byte, &self.device, &mut self.sensor);
                self.replies.extend(step.reply.iter().copied());
            }
            Ok(())
        }
    }

    /// Replays canned device bytes regardless of what is written.
    struct Scripted(VecDeque<u8>);

    impl Transport for Scripted {
        fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
            match self.0.pop_front() {
                Some(byte) if !buffer.is_empty() => {
                    buffer[0] = byte;
                    Ok(1)
                }
                _ => Ok(0),
            }
        }

        fn write(&mut self, _data: &[u8]) -> Result<()> {
            Ok(())
        }
    }

    fn client(distance_cm: f64) -> Client<Loopback> {
        Client::new(Loopback::new(distance_cm), Duration::from_millis(20))
    }

    #[test]
    fn test_status_frame_bytes() {
        let mut client = client(30.0);
        assert_eq!(client.status().unwrap(), OK_STATUS);
        assert_eq!(client.transport.written, vec![START, REPORT_STATUS, ACK, END]);
    }

    #[test]
    fn test_set_mode_is_verified() {
        let mut client = client(30.0);
        client.set_mode(OperatingMode::Serial).unwrap();
        assert_eq!(client.mode().unwrap(), SERIAL_MODE);

        assert_eq!(client.transport.device.interval_ms(), 150);
    }

    #[test]
    fn test_distance_raw_reads_published_measurement() {
        let mut client = client(30.0);
        // 0x0123 exercises the high byte
        client.transport.device.publish_measurement(Measurement::new(0x0123));
        assert_eq!(client.distance_raw().unwrap(), 0x0123);
    }

    #[test]
    fn test_distance_cm_round_trips_through_sensor_curve() {
        let mut client = client(40.0);
        let raw = client.adc_raw().unwrap();
        assert_eq!(raw, raw_for_distance(40.0));

        // Rounding the raw value to an integer moves the distance slightly
        let cm = client.distance_cm().unwrap();
        assert!((cm - 40.0).abs() < 0.5, "got {cm}");
    }

    #[test]
    fn test_conversions() {
        assert_eq!(adc_to_volts(0), 0.0);
        assert!((adc_to_volts(1023) - 5.0).abs() < 1e-9);
        // 12343.85 / 100^1.15 = 12343.85 / 199.53
        assert!((adc_to_distance_cm(100) - 61.86).abs() < 0.01);
        assert!(adc_to_distance_cm(0).is_infinite());
    }

    #[test]
    fn test_error_instead_of_start_ack() {
        let mut client = Client::new(Scripted(VecDeque::from([ERROR])), Duration::from_millis(5));
        match client.status() {
            Err(ClientError::Handshake {
                stage: "start ack",
                expected: ACK,
                actual: ERROR,
            }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_silence_times_out() {
        let mut client = Client::new(Scripted(VecDeque::from([ACK])), Duration::from_millis(5));
        assert!(matches!(client.status(), Err(ClientError::Timeout("length"))));
    }

    #[test]
    fn test_wrong_payload_length() {
        // A word where a byte is expected
        let canned = VecDeque::from([ACK, 2, 0x08, 0x00, ACK]);
        let mut client = Client::new(Scripted(canned), Duration::from_millis(5));
        assert!(matches!(
            client.mode(),
            Err(ClientError::PayloadLength {
                expected: 1,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_mode_mismatch_is_reported() {
        // Write frame, then a read-back reporting normal mode
        let canned = VecDeque::from([ACK, 0, ACK, ACK, 1, 0x08, ACK]);
        let mut client = Client::new(Scripted(canned), Duration::from_millis(5));
        assert!(matches!(
            client.set_mode(OperatingMode::Serial),
            Err(ClientError::ModeMismatch {
                written: 0x09,
                read: 0x08
            })
        ));
    }
}
