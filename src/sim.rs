//! In-process beacon: the firmware's core logic on simulated peripherals.
//!
//! Three threads stand in for the firmware's contexts: a tick thread
//! running the sample-to-signal pipeline, a serial thread feeding the
//! command processor one byte at a time, and a heartbeat thread. The host
//! talks to it through a [`SimLink`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use beacon_core::{
    CommandProcessor, DeviceState, FrameFault, Heartbeat, RawSample, SensorReader, SignalState,
    StatusIndicator, WaveformOutput, timer_tick,
};
use parking_lot::Mutex;
use spin_sleep::SpinSleeper;
use tracing::{info, trace, warn};

use crate::client::{ADC_FULL_SCALE, DISTANCE_EXPONENT, DISTANCE_GAIN};
use crate::config::{SimSettings, Waveform};
use crate::error::{ClientError, Result};
use crate::transport::Transport;

/// Silence inside a started frame longer than this abandons the frame.
const FRAME_TIMEOUT: Duration = Duration::from_secs(1);
/// How often idle threads check for shutdown.
const IDLE_POLL: Duration = Duration::from_millis(20);
/// How long a link read waits for the first byte.
const LINK_POLL: Duration = Duration::from_millis(10);

/// Raw conversion result the range sensor produces at `distance_cm`.
pub fn raw_for_distance(distance_cm: f64) -> u16 {
    let raw = (DISTANCE_GAIN / distance_cm).powf(1.0 / DISTANCE_EXPONENT);
    raw.round().clamp(1.0, ADC_FULL_SCALE) as u16
}

impl Waveform {
    /// Distance in centimetres at `elapsed` since the waveform started.
    pub fn distance_at(&self, elapsed: Duration) -> f64 {
        match *self {
            Waveform::Constant { distance_cm } => distance_cm,
            Waveform::Triangle {
                near_cm,
                far_cm,
                period_ms,
            } => {
                let period = period_ms.max(1) as f64;
                let phase = (elapsed.as_millis() as f64 % period) / period;
                let rise = if phase < 0.5 { 2.0 * phase } else { 2.0 - 2.0 * phase };
                near_cm + (far_cm - near_cm) * rise
            }
        }
    }
}

/// Range sensor following a [`Waveform`]. A conversion completes on the
/// first poll after it is started.
pub struct WaveformSensor {
    waveform: Waveform,
    started: Instant,
    pending: Option<u16>,
}

impl WaveformSensor {
    pub fn new(waveform: Waveform) -> Self {
        Self {
            waveform,
            started: Instant::now(),
            pending: None,
        }
    }
}

impl SensorReader for WaveformSensor {
    fn start_conversion(&mut self) {
        let distance = self.waveform.distance_at(self.started.elapsed());
        self.pending = Some(raw_for_distance(distance));
    }

    fn poll_conversion(&mut self) -> nb::Result<RawSample, core::convert::Infallible> {
        self.pending.take().map(RawSample::new).ok_or(nb::Error::WouldBlock)
    }
}

/// Sensor handle shared by the tick and serial threads; one lock per step.
#[derive(Clone)]
struct SharedSensor(Arc<Mutex<WaveformSensor>>);

impl SensorReader for SharedSensor {
    fn start_conversion(&mut self) {
        self.0.lock().start_conversion();
    }

    fn poll_conversion(&mut self) -> nb::Result<RawSample, core::convert::Infallible> {
        self.0.lock().poll_conversion()
    }
}

/// What the simulated peripherals were last told to do.
#[derive(Debug, Clone, Default)]
pub struct SimOutputs {
    pub signal: Option<SignalState>,
    pub led_lit: bool,
    pub led_toggles: u64,
}

struct RecordingOutput(Arc<Mutex<SimOutputs>>);

impl WaveformOutput for RecordingOutput {
    fn saturate(&mut self) {
        self.0.lock().signal = Some(SignalState::Saturated);
    }

    fn set_compare(&mut self, value: u16) {
        self.0.lock().signal = Some(SignalState::Compare(value));
    }
}

struct RecordingLed(Arc<Mutex<SimOutputs>>);

impl StatusIndicator for RecordingLed {
    fn toggle(&mut self) {
        let mut outputs = self.0.lock();
        outputs.led_lit = !outputs.led_lit;
        outputs.led_toggles += 1;
    }
}

/// Host end of the in-memory serial line.
pub struct SimLink {
    to_device: Sender<u8>,
    from_device: Receiver<u8>,
}

impl Transport for SimLink {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        if buffer.is_empty() {
            return Ok(0);
        }
        match self.from_device.recv_timeout(LINK_POLL) {
            Ok(byte) => buffer[0] = byte,
            Err(RecvTimeoutError::Timeout) => return Ok(0),
            Err(RecvTimeoutError::Disconnected) => return Err(ClientError::Disconnected),
        }
        let mut n = 1;
        while n < buffer.len() {
            match self.from_device.try_recv() {
                Ok(byte) => {
                    buffer[n] = byte;
                    n += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        for &byte in data {
            self.to_device.send(byte).map_err(|_| ClientError::Disconnected)?;
        }
        Ok(())
    }
}

/// A running simulated beacon. Dropping it stops its threads.
pub struct SimulatedDevice {
    state: Arc<DeviceState>,
    outputs: Arc<Mutex<SimOutputs>>,
    stop: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl SimulatedDevice {
    /// Starts the device threads and returns the device with the host end
    /// of its serial line.
    pub fn spawn(settings: &SimSettings) -> std::io::Result<(SimulatedDevice, SimLink)> {
        let state = Arc::new(DeviceState::new());
        let outputs = Arc::new(Mutex::new(SimOutputs::default()));
        let stop = Arc::new(AtomicBool::new(false));
        let sensor = SharedSensor(Arc::new(Mutex::new(WaveformSensor::new(settings.waveform.clone()))));

        let (host_tx, device_rx) = mpsc::channel();
        let (device_tx, host_rx) = mpsc::channel();

        let mut device = SimulatedDevice {
            state,
            outputs,
            stop,
            threads: Vec::with_capacity(3),
        };

        let tick_period = Duration::from_millis(settings.tick_period_ms);
        info!(?tick_period, waveform = ?settings.waveform, "Spawning simulated beacon...");

        device.threads.push(std::thread::Builder::new().name("sim-tick".into()).spawn({
            let state = Arc::clone(&device.state);
            let stop = Arc::clone(&device.stop);
            let mut sensor = sensor.clone();
            let mut output = RecordingOutput(Arc::clone(&device.outputs));
            move || {
                let sleeper = SpinSleeper::new(10_000);
                while !stop.load(Ordering::Relaxed) {
                    let signal = timer_tick(&mut sensor, &mut output, &state);
                    trace!(measurement = state.measurement().value(), ?signal, "Tick");
                    sleeper.sleep(tick_period);
                }
            }
        })?);

        device.threads.push(std::thread::Builder::new().name("sim-serial".into()).spawn({
            let state = Arc::clone(&device.state);
            let stop = Arc::clone(&device.stop);
            let mut sensor = sensor;
            move || serial_loop(&state, &stop, &mut sensor, device_rx, device_tx)
        })?);

        device.threads.push(std::thread::Builder::new().name("sim-heartbeat".into()).spawn({
            let state = Arc::clone(&device.state);
            let stop = Arc::clone(&device.stop);
            let led = RecordingLed(Arc::clone(&device.outputs));
            move || {
                let mut heartbeat = Heartbeat::new(led);
                while !stop.load(Ordering::Relaxed) {
                    let pause = Duration::from_millis(heartbeat.beat(&state) as u64);
                    let until = Instant::now() + pause;
                    while Instant::now() < until && !stop.load(Ordering::Relaxed) {
                        std::thread::sleep(IDLE_POLL.min(until.saturating_duration_since(Instant::now())));
                    }
                }
            }
        })?);

        let link = SimLink {
            to_device: host_tx,
            from_device: host_rx,
        };
        Ok((device, link))
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn outputs(&self) -> SimOutputs {
        self.outputs.lock().clone()
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

fn serial_loop(
    state: &DeviceState,
    stop: &AtomicBool,
    sensor: &mut SharedSensor,
    rx: Receiver<u8>,
    tx: Sender<u8>,
) {
    let mut processor = CommandProcessor::new();
    let mut last_byte = Instant::now();

    while !stop.load(Ordering::Relaxed) {
        let byte = match rx.recv_timeout(IDLE_POLL) {
            Ok(byte) => byte,
            Err(RecvTimeoutError::Timeout) => {
                if processor.in_frame() && last_byte.elapsed() > FRAME_TIMEOUT {
                    warn!(phase = ?processor.phase(), "Frame abandoned after inactivity");
                    processor.reset();
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                info!("Host closed the simulated link");
                return;
            }
        };
        last_byte = Instant::now();

        let step = processor.on_byte(byte, state, sensor);
        match step.fault {
            Some(FrameFault::BadStart(b)) => warn!("Frame rejected, bad start byte {b:#04x}"),
            Some(FrameFault::MissingAck(b)) => warn!("Trailing ACK missing, got {b:#04x}"),
            None => {}
        }
        if let Some(setting) = step.mode_written {
            info!(
                mode = setting.mode_byte(),
                interval_ms = setting.interval_ms(),
                "Mode written"
            );
        }
        for &reply in step.reply.iter() {
            if tx.send(reply).is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use beacon_core::OperatingMode;
    use beacon_core::protocol::OK_STATUS;

    fn settings(distance_cm: f64) -> SimSettings {
        SimSettings {
            tick_period_ms: 5,
            waveform: Waveform::Constant { distance_cm },
        }
    }

    #[test]
    fn test_raw_for_distance_inverts_sensor_curve() {
        // (12343.85 / 40)^(1/1.15) = 146.1
        assert_eq!(raw_for_distance(40.0), 146);
        assert_eq!(raw_for_distance(0.001), 1023);
        assert_eq!(raw_for_distance(1e9), 1);
    }

    #[test]
    fn test_triangle_waveform() {
        let wave = Waveform::Triangle {
            near_cm: 10.0,
            far_cm: 50.0,
            period_ms: 1000,
        };
        assert_eq!(wave.distance_at(Duration::ZERO), 10.0);
        assert_eq!(wave.distance_at(Duration::from_millis(250)), 30.0);
        assert_eq!(wave.distance_at(Duration::from_millis(500)), 50.0);
        assert_eq!(wave.distance_at(Duration::from_millis(750)), 30.0);
        assert_eq!(wave.distance_at(Duration::from_millis(1000)), 10.0);
    }

    #[test]
    fn test_client_against_running_device() {
        let (device, link) = SimulatedDevice::spawn(&settings(40.0)).unwrap();
        let mut client = Client::new(link, Duration::from_millis(500));

        assert_eq!(client.status().unwrap(), OK_STATUS);
        client.set_mode(OperatingMode::Serial).unwrap();
        assert_eq!(device.state().interval_ms(), 150);

        assert_eq!(client.adc_raw().unwrap(), 146);
        // The tick thread publishes !146 & 0x3FF = 877
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(client.distance_raw().unwrap(), 877);

        client.set_mode(OperatingMode::Normal).unwrap();
        assert_eq!(device.state().interval_ms(), 500);
    }

    #[test]
    fn test_device_drives_outputs() {
        let (device, _link) = SimulatedDevice::spawn(&settings(40.0)).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let outputs = device.outputs();
        // 877 > 700: (877 - 250) * 6 / 5 = 752
        assert_eq!(outputs.signal, Some(SignalState::Compare(752)));
        assert!(outputs.led_toggles >= 1);
    }

    #[test]
    fn test_dropped_link_is_disconnected() {
        let (device, link) = SimulatedDevice::spawn(&settings(40.0)).unwrap();
        drop(device);
        let mut client = Client::new(link, Duration::from_millis(50));
        assert!(matches!(client.status(), Err(ClientError::Disconnected)));
    }
}
