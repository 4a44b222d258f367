//! Configuration constants for the beacon firmware
//!
//! Timing, link and waveform parameters live here so they can be found and
//! tuned in one place.

// Sampling
/// Period of the sample-to-signal tick in milliseconds
pub const TICK_PERIOD_MS: u64 = 20;

// Serial link
/// Host link baud rate (8N1)
pub const BAUD_RATE: u32 = 9600;

/// DMA ring buffer for received bytes
pub const RX_RING_SIZE: usize = 64;

/// Silence inside a started frame longer than this abandons the frame
pub const FRAME_TIMEOUT_MS: u64 = 1000;

// Waveform
/// Servo pulse train frequency in Hz
pub const PWM_FREQ_HZ: u32 = 50;

/// Compare value that maps to a full duty cycle. Compare values are in
/// units of 1/1024 of the PWM period.
pub const COMPARE_FULL_SCALE: u32 = 1024;

// Pin Mapping Documentation
//
// Distance sensor:
// - PA0: ADC1_IN0 (analog output of the sensor)
//
// Host link (USART2):
// - PA2: TX
// - PA3: RX
//
// Servo:
// - PA8: TIM1_CH1 PWM signal
//
// Status:
// - PC13: Heartbeat LED (active low on the black pill)
