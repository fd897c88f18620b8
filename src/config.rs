//! Application configuration.
//!
//! Settings are loaded with the `config` crate from an optional TOML file and
//! `STMP960_*` environment variables, then validated semantically. Parsing
//! problems surface as [`CalError::Config`], logically invalid values as
//! [`CalError::Configuration`].

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, CalError};

/// Runtime settings for the toolkit.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Serial port device path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    /// Serial baud rate.
    pub baud: u32,
    /// Serial read timeout in milliseconds. Doubles as the poll interval of
    /// the session worker, so it bounds how quickly `stop` is observed.
    pub read_timeout_ms: u64,
    /// Capacity of the session event channel.
    pub channel_capacity: usize,
    /// Capacity of the monitoring buffer.
    pub monitor_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud: 9600,
            read_timeout_ms: 200,
            channel_capacity: 256,
            monitor_capacity: 5000,
        }
    }
}

impl Settings {
    /// Loads settings from `path` (or `config/stmp960.toml` if present when
    /// `path` is `None`), layered under `STMP960_*` environment overrides.
    pub fn load(path: Option<&str>) -> AppResult<Self> {
        let mut builder = Config::builder();
        builder = match path {
            Some(path) => builder.add_source(File::with_name(path)),
            None => builder.add_source(File::with_name("config/stmp960").required(false)),
        };
        let settings: Settings = builder
            .add_source(Environment::with_prefix("STMP960"))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks values that parse fine but make no sense at runtime.
    pub fn validate(&self) -> AppResult<()> {
        if self.port.is_empty() {
            return Err(CalError::Configuration(
                "serial port must not be empty".to_string(),
            ));
        }
        if self.baud == 0 {
            return Err(CalError::Configuration(
                "baud rate must be non-zero".to_string(),
            ));
        }
        if self.read_timeout_ms == 0 {
            return Err(CalError::Configuration(
                "read timeout must be non-zero".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(CalError::Configuration(
                "event channel capacity must be non-zero".to_string(),
            ));
        }
        if self.monitor_capacity == 0 {
            return Err(CalError::Configuration(
                "monitor capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
