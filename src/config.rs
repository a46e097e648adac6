//! Configuration loading for the acquisition daemon.
//!
//! Configuration is loaded from:
//! 1. a TOML file (`config/config.toml` by default)
//! 2. environment variables prefixed with `PT8005_`
//!
//! Every field has a default, so the daemon starts with no file at all.
//!
//! # Example
//! ```no_run
//! use pt8005_daq::config::MeterConfig;
//!
//! # fn main() -> Result<(), pt8005_daq::error::MeterError> {
//! let config = MeterConfig::load()?;
//! println!("Device: {}", config.device.path);
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::aggregate::ValueBounds;
use crate::engine::EngineConfig;
use crate::error::{AppResult, MeterError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeterConfig {
    /// Application settings.
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Serial device settings.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Decoding and aggregation settings.
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Application-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Serial device configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Serial port path (e.g. `/dev/ttyUSB0`).
    #[serde(default = "default_device_path")]
    pub path: String,
    /// Baud rate; the PT-8005 is fixed at 9600.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            path: default_device_path(),
            baud_rate: default_baud_rate(),
        }
    }
}

/// Decoding and aggregation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Length of one aggregation window.
    #[serde(with = "humantime_serde", default = "default_aggregate_interval")]
    pub aggregate_interval: Duration,
    /// Period between persistence flushes.
    #[serde(with = "humantime_serde", default = "default_flush_interval")]
    pub flush_interval: Duration,
    /// Plausible-reading envelope; values outside are dropped.
    #[serde(default)]
    pub bounds: ValueBounds,
    /// Enable frame-level diagnostics (indices, raw part captures,
    /// drop-count logging).
    #[serde(default)]
    pub verbose: bool,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            aggregate_interval: default_aggregate_interval(),
            flush_interval: default_flush_interval(),
            bounds: ValueBounds::default(),
            verbose: false,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the measurement CSV and the environment sidecar.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_device_path() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_aggregate_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl MeterConfig {
    /// Load configuration from `config/config.toml` and the environment.
    ///
    /// Environment variables override file values with the prefix
    /// `PT8005_` and `__` as the section separator, e.g.
    /// `PT8005_DEVICE__PATH=/dev/ttyUSB1`.
    pub fn load() -> AppResult<Self> {
        Self::load_from("config/config.toml")
    }

    /// Load configuration from a specific file path.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("PT8005_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.device.baud_rate == 0 {
            return Err("baud_rate must be non-zero".to_string());
        }

        if self.acquisition.aggregate_interval.is_zero() {
            return Err("aggregate_interval must be non-zero".to_string());
        }
        if self.acquisition.flush_interval.is_zero() {
            return Err("flush_interval must be non-zero".to_string());
        }

        let bounds = self.acquisition.bounds;
        if bounds.min >= bounds.max {
            return Err(format!(
                "Invalid bounds: min {} must be below max {}",
                bounds.min, bounds.max
            ));
        }

        Ok(())
    }

    /// Validate and convert into the error type, for call sites that
    /// propagate with `?`.
    pub fn validated(self) -> AppResult<Self> {
        self.validate().map_err(MeterError::Configuration)?;
        Ok(self)
    }

    /// Engine tuning derived from this configuration.
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            aggregate_interval: self.acquisition.aggregate_interval,
            flush_interval: self.acquisition.flush_interval,
            bounds: self.acquisition.bounds,
            verbose: self.acquisition.verbose,
        }
    }
}
