//! Board adapters: the beacon's hardware capabilities on embassy-stm32 drivers.

use core::cell::RefCell;
use core::convert::Infallible;

use beacon_core::{RawSample, SensorReader, StatusIndicator, WaveformOutput};
use critical_section::Mutex;
use embassy_stm32::{
    adc::{Adc, Resolution, SampleTime},
    gpio::Output,
    peripherals::{ADC1, PA0, TIM1},
    timer::simple_pwm::SimplePwm,
};

use crate::config::COMPARE_FULL_SCALE;

#[cfg(not(chip = "stm32f411ce"))]
compile_error!("beacon-firmware only has a pin map for the stm32f411ce, check board.toml");

/// ADC1 wired to the distance sensor on PA0.
pub struct AdcSensor {
    adc: Adc<'static, ADC1>,
    pin: PA0,
    latest: Option<u16>,
}

impl AdcSensor {
    /// Configures the converter for 10-bit right-aligned results.
    pub fn new(mut adc: Adc<'static, ADC1>, pin: PA0) -> Self {
        adc.set_resolution(Resolution::BITS10);
        adc.set_sample_time(SampleTime::CYCLES480);
        Self {
            adc,
            pin,
            latest: None,
        }
    }
}

impl SensorReader for AdcSensor {
    fn start_conversion(&mut self) {
        self.latest = Some(self.adc.blocking_read(&mut self.pin));
    }

    fn poll_conversion(&mut self) -> nb::Result<RawSample, Infallible> {
        self.latest.take().map(RawSample::new).ok_or(nb::Error::WouldBlock)
    }
}

/// Sensor slot shared by the tick task and the serial task.
pub static SENSOR: Mutex<RefCell<Option<AdcSensor>>> = Mutex::new(RefCell::new(None));

/// Installs the sensor into [`SENSOR`]. Must run before any task samples.
pub fn install_sensor(sensor: AdcSensor) {
    critical_section::with(|cs| {
        SENSOR.borrow_ref_mut(cs).replace(sensor);
    });
}

/// Handle to the sensor in [`SENSOR`]; each step runs in its own critical
/// section so a conversion is never interleaved with another.
pub struct SharedSensor;

impl SensorReader for SharedSensor {
    fn start_conversion(&mut self) {
        critical_section::with(|cs| {
            if let Some(sensor) = SENSOR.borrow_ref_mut(cs).as_mut() {
                sensor.start_conversion();
            }
        });
    }

    fn poll_conversion(&mut self) -> nb::Result<RawSample, Infallible> {
        critical_section::with(|cs| match SENSOR.borrow_ref_mut(cs).as_mut() {
            Some(sensor) => sensor.poll_conversion(),
            None => Err(nb::Error::WouldBlock),
        })
    }
}

/// Servo waveform on TIM1 channel 1.
pub struct ServoOutput {
    pwm: SimplePwm<'static, TIM1>,
}

impl ServoOutput {
    /// Takes a configured PWM timer and enables channel 1.
    pub fn new(mut pwm: SimplePwm<'static, TIM1>) -> Self {
        pwm.ch1().set_duty_cycle(0);
        pwm.ch1().enable();
        Self { pwm }
    }
}

impl WaveformOutput for ServoOutput {
    fn saturate(&mut self) {
        self.pwm.ch1().set_duty_cycle_fully_on();
    }

    fn set_compare(&mut self, value: u16) {
        let mut ch = self.pwm.ch1();
        let max = ch.max_duty_cycle() as u32;
        let duty = (value as u32 * max / COMPARE_FULL_SCALE).min(max);
        ch.set_duty_cycle(duty as u16);
    }
}

/// Heartbeat LED.
pub struct StatusLed(pub Output<'static>);

impl StatusIndicator for StatusLed {
    fn toggle(&mut self) {
        self.0.toggle();
    }
}
