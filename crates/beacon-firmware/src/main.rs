#![no_std]
#![no_main]

mod board;
mod config;
mod tasks;

use beacon_core::Heartbeat;
use defmt::*;
use embassy_executor::Spawner;
use embassy_stm32::{
    adc::Adc,
    bind_interrupts,
    gpio::{Level, Output, OutputType, Speed},
    peripherals,
    time::Hertz,
    timer::simple_pwm::{PwmPin, SimplePwm},
    usart::{self, Uart},
};
use embassy_time::Timer;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use crate::board::{AdcSensor, ServoOutput, StatusLed, install_sensor};
use crate::config::{BAUD_RATE, PWM_FREQ_HZ, RX_RING_SIZE};
use crate::tasks::{STATE, serial_task, tick_task};

bind_interrupts!(struct Irqs {
    USART2 => usart::InterruptHandler<peripherals::USART2>;
});

static RX_RING: StaticCell<[u8; RX_RING_SIZE]> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Starting distance beacon...");

    let p = embassy_stm32::init(Default::default());
    info!("Peripherals initialized");

    // Distance sensor on PA0
    install_sensor(AdcSensor::new(Adc::new(p.ADC1), p.PA0));

    // Servo waveform on PA8 (TIM1_CH1)
    let ch1_pin = PwmPin::new_ch1(p.PA8, OutputType::PushPull);
    let pwm = SimplePwm::new(
        p.TIM1,
        Some(ch1_pin),
        None,
        None,
        None,
        Hertz::hz(PWM_FREQ_HZ),
        Default::default(),
    );
    let servo = ServoOutput::new(pwm);

    // Host link on USART2, 8N1
    let mut uart_config = usart::Config::default();
    uart_config.baudrate = BAUD_RATE;
    let uart = match Uart::new(
        p.USART2,
        p.PA3,
        p.PA2,
        Irqs,
        p.DMA1_CH6,
        p.DMA1_CH5,
        uart_config,
    ) {
        Ok(uart) => uart,
        Err(e) => defmt::panic!("USART2 configuration rejected: {}", e),
    };
    let (tx, rx) = uart.split();
    let rx = rx.into_ring_buffered(RX_RING.init([0; RX_RING_SIZE]));
    info!("Host link configured at {} baud", BAUD_RATE);

    unwrap!(spawner.spawn(tick_task(servo)));
    unwrap!(spawner.spawn(serial_task(rx, tx)));

    // Heartbeat in the background
    let mut heartbeat = Heartbeat::new(StatusLed(Output::new(p.PC13, Level::High, Speed::Low)));
    loop {
        let pause_ms = heartbeat.beat(&STATE);
        Timer::after_millis(pause_ms as u64).await;
    }
}
