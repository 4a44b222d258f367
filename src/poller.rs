//! Periodic distance polling and the CSV log fed from it.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use beacon_core::OperatingMode;
use beacon_core::protocol::OK_STATUS;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::blackboard::{self, Blackboard, Reading};
use crate::bus::Topic;
use crate::client::Client;
use crate::config::PollerSettings;
use crate::transport::Transport;

pub type SharedClient = Arc<Mutex<Client<Box<dyn Transport>>>>;

/// Clamps readings beyond `limit_cm` to the limit and flags them.
pub fn classify(time_ms: u64, distance_cm: f64, limit_cm: f64) -> Reading {
    if distance_cm <= limit_cm {
        Reading {
            time_ms,
            distance_cm,
            out_of_range: false,
        }
    } else {
        Reading {
            time_ms,
            distance_cm: limit_cm,
            out_of_range: true,
        }
    }
}

/// Polls the beacon until `shutdown` flips, then hands it back in normal mode.
pub async fn run(
    client: SharedClient,
    settings: PollerSettings,
    bb: Blackboard,
    readings: Topic<Reading>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let status = blocking(&client, |c| c.status()).await?;
    anyhow::ensure!(status == OK_STATUS, "Beacon reported status {status:#04x}");
    let volts = blocking(&client, |c| c.adc_volts()).await?;
    let measurement = blocking(&client, |c| c.distance_raw()).await?;
    info!(volts, measurement, "Beacon ready");

    let mode = settings.polling_mode;
    blocking(&client, move |c| c.set_mode(mode)).await?;
    blackboard::set_mode(&bb, mode.code());
    info!(%mode, period_ms = settings.period_ms, "Polling started");

    let mut tick = tokio::time::interval(Duration::from_millis(settings.period_ms));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut samples: u64 = 0;

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = shutdown.changed() => break,
        }

        match blocking(&client, |c| c.distance_cm()).await {
            Ok(distance_cm) => {
                samples += 1;
                let reading = classify(samples * settings.period_ms, distance_cm, settings.out_of_range_cm);
                if reading.out_of_range {
                    debug!(distance_cm, "OUT OF RANGE");
                } else {
                    debug!(distance_cm, "Distance");
                }
                blackboard::record(&bb, reading);
                readings.publish(reading);
            }
            Err(e) => {
                warn!(error = %e, "Distance poll failed");
                blackboard::raise_fault(&bb, &e.to_string());
            }
        }
    }

    info!(samples, "Polling stopped, returning beacon to normal mode");
    blocking(&client, |c| c.set_mode(OperatingMode::Normal)).await?;
    blackboard::set_mode(&bb, OperatingMode::Normal.code());
    Ok(())
}

/// Writes every published reading to `path` as `time,distance` rows until
/// the topic closes.
pub async fn log_csv(path: PathBuf, mut rx: broadcast::Receiver<Arc<Reading>>) -> anyhow::Result<()> {
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);
    writeln!(out, "time,distance")?;
    out.flush()?;
    info!(path = %path.display(), "Logging distance to CSV");

    loop {
        match rx.recv().await {
            Ok(reading) => {
                writeln!(out, "{},{}", reading.time_ms, reading.distance_cm)?;
                out.flush()?;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "CSV logger lagged, rows dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    Ok(())
}

/// Runs one client call on the blocking pool.
async fn blocking<F, R>(client: &SharedClient, f: F) -> anyhow::Result<R>
where
    F: FnOnce(&mut Client<Box<dyn Transport>>) -> crate::error::Result<R> + Send + 'static,
    R: Send + 'static,
{
    let client = Arc::clone(client);
    let result = tokio::task::spawn_blocking(move || f(&mut client.lock())).await?;
    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SimSettings, Waveform};
    use crate::sim::SimulatedDevice;
    use beacon_core::protocol::{NORMAL_MODE, SERIAL_MODE};

    fn poller_settings() -> PollerSettings {
        PollerSettings {
            period_ms: 10,
            history: 5,
            csv_path: PathBuf::from("unused.csv"),
            out_of_range_cm: 80.0,
            polling_mode: OperatingMode::Serial,
        }
    }

    fn spawn_device(distance_cm: f64) -> (SimulatedDevice, SharedClient) {
        let sim = SimSettings {
            tick_period_ms: 5,
            waveform: Waveform::Constant { distance_cm },
        };
        let (device, link) = SimulatedDevice::spawn(&sim).unwrap();
        let transport: Box<dyn Transport> = Box::new(link);
        let client = Client::new(transport, Duration::from_millis(500));
        (device, Arc::new(Mutex::new(client)))
    }

    #[test]
    fn test_classify_clamps_out_of_range() {
        assert_eq!(
            classify(100, 35.5, 80.0),
            Reading {
                time_ms: 100,
                distance_cm: 35.5,
                out_of_range: false
            }
        );
        assert_eq!(
            classify(200, 80.0, 80.0),
            Reading {
                time_ms: 200,
                distance_cm: 80.0,
                out_of_range: false
            }
        );
        assert_eq!(
            classify(300, f64::INFINITY, 80.0),
            Reading {
                time_ms: 300,
                distance_cm: 80.0,
                out_of_range: true
            }
        );
    }

    #[tokio::test]
    async fn test_poll_cycle_against_simulated_beacon() {
        let (device, client) = spawn_device(40.0);
        let bb = blackboard::new_blackboard(5);
        let topic: Topic<Reading> = Topic::new(64);
        let mut rx = topic.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run(client, poller_settings(), bb.clone(), topic, shutdown_rx));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.time_ms, 10);
        assert!(!first.out_of_range);
        assert!((first.distance_cm - 40.0).abs() < 0.5);
        assert_eq!(device.state().mode_setting().mode_byte(), SERIAL_MODE);

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        let state = blackboard::snapshot(&bb);
        assert!(!state.history.is_empty());
        assert!(state.history.len() <= 5);
        assert_eq!(state.mode, Some(NORMAL_MODE));
        assert_eq!(device.state().interval_ms(), 500);
    }

    #[tokio::test]
    async fn test_far_target_is_flagged() {
        let (_device, client) = spawn_device(120.0);
        let bb = blackboard::new_blackboard(5);
        let topic: Topic<Reading> = Topic::new(64);
        let mut rx = topic.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run(client, poller_settings(), bb, topic, shutdown_rx));

        let reading = rx.recv().await.unwrap();
        assert!(reading.out_of_range);
        assert_eq!(reading.distance_cm, 80.0);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_csv_log_rows() {
        let path = std::env::temp_dir().join(format!("beacon-csv-{}.csv", std::process::id()));
        let topic: Topic<Reading> = Topic::new(8);
        let logger = tokio::spawn(log_csv(path.clone(), topic.subscribe()));

        topic.publish(classify(100, 25.5, 80.0));
        topic.publish(classify(200, 95.0, 80.0));
        drop(topic);
        logger.await.unwrap().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "time,distance\n100,25.5\n200,80\n");
        let _ = std::fs::remove_file(&path);
    }
}
