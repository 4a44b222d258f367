//! Tick and serial tasks.

use beacon_core::{CommandProcessor, DeviceState, FrameFault, timer_tick};
use defmt::*;
use embassy_stm32::mode::Async;
use embassy_stm32::usart::{RingBufferedUartRx, UartTx};
use embassy_time::{Duration, Ticker, with_timeout};

use crate::board::{ServoOutput, SharedSensor};
use crate::config::{FRAME_TIMEOUT_MS, TICK_PERIOD_MS};

/// Device-wide shared state.
pub static STATE: DeviceState = DeviceState::new();

/// Samples the sensor and updates the servo once per tick.
#[embassy_executor::task]
pub async fn tick_task(mut servo: ServoOutput) {
    info!("Tick task started, period {} ms", TICK_PERIOD_MS);
    let mut ticker = Ticker::every(Duration::from_millis(TICK_PERIOD_MS));
    let mut sensor = SharedSensor;

    loop {
        ticker.next().await;
        let signal = timer_tick(&mut sensor, &mut servo, &STATE);
        trace!("measurement={} signal={}", STATE.measurement(), signal);
    }
}

/// Feeds received bytes to the command processor and transmits its replies.
#[embassy_executor::task]
pub async fn serial_task(mut rx: RingBufferedUartRx<'static>, mut tx: UartTx<'static, Async>) {
    info!("Serial task started");
    let mut processor = CommandProcessor::new();
    let mut sensor = SharedSensor;
    let mut buf = [0u8; 8];

    loop {
        let received = if processor.in_frame() {
            match with_timeout(Duration::from_millis(FRAME_TIMEOUT_MS), rx.read(&mut buf)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("Frame abandoned after {} ms of silence in {}", FRAME_TIMEOUT_MS, processor.phase());
                    processor.reset();
                    continue;
                }
            }
        } else {
            rx.read(&mut buf).await
        };

        let n = match received {
            Ok(n) => n,
            Err(e) => {
                error!("UART read error: {}", e);
                processor.reset();
                continue;
            }
        };

        for &byte in &buf[..n] {
            let step = processor.on_byte(byte, &STATE, &mut sensor);

            match step.fault {
                Some(FrameFault::BadStart(b)) => warn!("Frame rejected, bad start byte {=u8:#x}", b),
                Some(FrameFault::MissingAck(b)) => warn!("Trailing ACK missing, got {=u8:#x}", b),
                None => {}
            }
            if let Some(setting) = step.mode_written {
                info!(
                    "Mode byte {=u8:#x} written, heartbeat interval {} ms",
                    setting.mode_byte(),
                    setting.interval_ms()
                );
            }

            if !step.reply.is_empty() {
                if let Err(e) = tx.write(&step.reply).await {
                    error!("UART write error: {}", e);
                    processor.reset();
                    break;
                }
            }
        }
    }
}
