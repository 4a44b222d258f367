mod blackboard; // shared readings, mode and faults
mod bus; // broadcast topics
mod client; // protocol client
mod config; // typed settings
mod error;
mod graphics;
mod poller;
mod sim; // in-process simulated beacon
mod transport;

use blackboard::{Reading, new_blackboard};
use bus::Topic;
use client::Client;
use config::Settings;
use graphics::window_conf;
use sim::SimulatedDevice;
use transport::{SerialTransport, Transport};

use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{self, EnvFilter};

#[macroquad::main(window_conf)]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    info!("Distance beacon host started. Loading settings...");

    let Ok(settings) = Settings::load() else {
        return;
    };

    let tokio_rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to start Tokio runtime: {}", e);
            return;
        }
    };

    // The simulated beacon, when used, must outlive the poller
    let (transport, simulated) = match open_link(&settings) {
        Ok(link) => link,
        Err(e) => {
            error!("Failed to open beacon link: {:?}", e);
            return;
        }
    };
    let client = Arc::new(Mutex::new(Client::new(
        transport,
        Duration::from_millis(settings.link.reply_timeout_ms),
    )));

    let bb = new_blackboard(settings.poller.history);
    let readings: Topic<Reading> = Topic::new(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let logger = tokio_rt.spawn(poller::log_csv(
        settings.poller.csv_path.clone(),
        readings.subscribe(),
    ));

    let poll = tokio_rt.spawn({
        let bb = bb.clone();
        let settings = settings.poller.clone();
        async move {
            info!("Poller task started.");
            poller::run(client, settings, bb, readings, shutdown_rx).await
        }
    });

    graphics::run_visualization_loop(bb, &settings.poller, shutdown_tx).await;

    match tokio_rt.block_on(poll) {
        Ok(Ok(())) => info!("Poller finished, beacon back in normal mode."),
        Ok(Err(e)) => error!("Poller failed: {:?}", e),
        Err(e) => error!("Poller task panicked: {}", e),
    }
    if let Ok(Err(e)) = tokio_rt.block_on(logger) {
        error!("CSV logger failed: {:?}", e);
    }

    if let Some(device) = simulated {
        let outputs = device.outputs();
        info!(
            measurement = device.state().measurement().value(),
            signal = ?outputs.signal,
            led_lit = outputs.led_lit,
            led_toggles = outputs.led_toggles,
            "Stopping simulated beacon."
        );
    }
}

fn open_link(settings: &Settings) -> anyhow::Result<(Box<dyn Transport>, Option<SimulatedDevice>)> {
    if settings.link.simulate {
        info!("Using simulated beacon.");
        let (device, link) = SimulatedDevice::spawn(&settings.sim)?;
        Ok((Box::new(link), Some(device)))
    } else {
        let port = SerialTransport::open(&settings.link.port, settings.link.baud)?;
        Ok((Box::new(port), None))
    }
}
