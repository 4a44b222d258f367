use std::path::PathBuf;

use beacon_core::OperatingMode;
use config::{Config, ConfigError, Environment, File, FileFormat, Source};
use serde::Deserialize;
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Prefix of environment overrides, e.g. `BEACON_LINK__PORT=/dev/ttyUSB1`.
const ENV_PREFIX: &str = "BEACON";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub link: LinkSettings,
    pub poller: PollerSettings,
    pub sim: SimSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkSettings {
    /// Serial device path, ignored when `simulate` is set
    pub port: String,
    pub baud: u32,
    /// Talk to an in-process simulated beacon instead of a serial port
    pub simulate: bool,
    /// Longest wait for any single reply byte
    pub reply_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollerSettings {
    pub period_ms: u64,
    /// Number of points kept for the plot
    pub history: usize,
    pub csv_path: PathBuf,
    /// Readings above this are clamped and flagged out of range
    pub out_of_range_cm: f64,
    /// Mode the beacon is held in while polling
    pub polling_mode: OperatingMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimSettings {
    pub tick_period_ms: u64,
    pub waveform: Waveform,
}

/// Distance seen by the simulated sensor over time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Waveform {
    Constant { distance_cm: f64 },
    /// Sweeps from `near_cm` to `far_cm` and back once per period
    Triangle {
        near_cm: f64,
        far_cm: f64,
        period_ms: u64,
    },
}

impl Settings {
    pub fn load() -> Result<Settings, ConfigError> {
        info!("Attempting to load configuration from {}", DEFAULT_CONFIG_PATH);

        let settings = Self::from_source(File::new(DEFAULT_CONFIG_PATH, FileFormat::Toml).required(true));

        match settings {
            Ok(settings) => {
                info!("Successfully loaded configuration: {:?}", settings);
                Ok(settings)
            }
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                Err(e)
            }
        }
    }

    /// Builds settings from `base`, with environment overrides on top.
    pub fn from_source<S>(base: S) -> Result<Settings, ConfigError>
    where
        S: Source + Send + Sync + 'static,
    {
        Config::builder()
            .add_source(base)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [link]
        port = "/dev/ttyUSB0"
        baud = 9600
        simulate = true
        reply_timeout_ms = 250

        [poller]
        period_ms = 100
        history = 200
        csv_path = "distance.csv"
        out_of_range_cm = 80.0
        polling_mode = "Serial"

        [sim]
        tick_period_ms = 20

        [sim.waveform]
        kind = "triangle"
        near_cm = 15.0
        far_cm = 70.0
        period_ms = 8000
    "#;

    #[test]
    fn test_settings_from_toml() {
        let settings = Settings::from_source(File::from_str(SAMPLE, FileFormat::Toml)).unwrap();

        assert_eq!(settings.link.baud, 9600);
        assert!(settings.link.simulate);
        assert_eq!(settings.poller.history, 200);
        assert_eq!(settings.poller.polling_mode, OperatingMode::Serial);
        assert_eq!(settings.poller.csv_path, PathBuf::from("distance.csv"));
        assert_eq!(
            settings.sim.waveform,
            Waveform::Triangle {
                near_cm: 15.0,
                far_cm: 70.0,
                period_ms: 8000
            }
        );
    }

    #[test]
    fn test_missing_section_is_an_error() {
        let result = Settings::from_source(File::from_str("[link]\nport = \"x\"", FileFormat::Toml));
        assert!(result.is_err());
    }

    #[test]
    fn test_shipped_default_file_parses() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml");
        let settings = Settings::from_source(File::new(path, FileFormat::Toml)).unwrap();
        assert_eq!(settings.poller.out_of_range_cm, 80.0);
        assert_eq!(settings.poller.period_ms, 100);
    }
}
