//! Persistence collaborators: measurement batches and the environment
//! context.
//!
//! The engine never talks to storage directly during decoding; it fills a
//! write buffer that a second timer flushes through [`MeasurementStore`] in
//! one batch. The store implementation is responsible for making a batch
//! durable as a unit.

use async_trait::async_trait;
use serde::Serialize;
#[cfg(feature = "storage_csv")]
use std::path::{Path, PathBuf};

use crate::environment::EnvironmentContext;
use crate::error::AppResult;
#[cfg(feature = "storage_csv")]
use crate::error::MeterError;

/// One aggregate ready for persistence: the window statistics plus the
/// window length and the environment context active at publish time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeasurementRecord {
    /// Window end, unix seconds.
    pub timestamp: i64,
    /// Window length in milliseconds.
    pub interval_ms: u64,
    /// Smallest valid reading in the window.
    pub min: f64,
    /// Largest valid reading in the window.
    pub max: f64,
    /// Mean of the valid readings in the window.
    pub mean: f64,
    /// Where the meter was placed.
    pub environment_id: u32,
    /// Window state at flush time.
    pub window_state_id: u32,
}

/// External persistence consumed by the engine.
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// Append one flushed batch. An empty batch is a valid no-op write.
    async fn append_measurements(&self, batch: &[MeasurementRecord]) -> AppResult<()>;

    /// Environment context active when the engine last ran.
    async fn load_environment(&self) -> AppResult<EnvironmentContext>;

    /// Durably replace the stored environment context.
    async fn store_environment(&self, context: EnvironmentContext) -> AppResult<()>;
}

/// File-backed store: measurement batches append to a CSV file, the
/// environment context lives in a JSON sidecar next to it.
#[cfg(feature = "storage_csv")]
pub struct CsvMeasurementStore {
    measurements_path: PathBuf,
    environment_path: PathBuf,
}

#[cfg(feature = "storage_csv")]
impl CsvMeasurementStore {
    /// Create the data directory if needed and point the store at it.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> AppResult<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)
            .map_err(|e| MeterError::Storage(format!("Failed to create data dir: {e}")))?;

        Ok(Self {
            measurements_path: data_dir.join("measurements.csv"),
            environment_path: data_dir.join("environment.json"),
        })
    }

    /// Path of the CSV file measurements append to.
    pub fn measurements_path(&self) -> &Path {
        &self.measurements_path
    }
}

#[cfg(feature = "storage_csv")]
#[async_trait]
impl MeasurementStore for CsvMeasurementStore {
    async fn append_measurements(&self, batch: &[MeasurementRecord]) -> AppResult<()> {
        let write_header = !self.measurements_path.exists();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.measurements_path)
            .map_err(|e| MeterError::Storage(format!("Failed to open CSV file: {e}")))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(write_header)
            .from_writer(file);
        for record in batch {
            writer
                .serialize(record)
                .map_err(|e| MeterError::Storage(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| MeterError::Storage(e.to_string()))?;

        tracing::debug!(records = batch.len(), "measurement batch appended");
        Ok(())
    }

    async fn load_environment(&self) -> AppResult<EnvironmentContext> {
        match std::fs::read(&self.environment_path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| MeterError::Storage(format!("Corrupt environment file: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(EnvironmentContext::default())
            }
            Err(e) => Err(MeterError::Storage(e.to_string())),
        }
    }

    async fn store_environment(&self, context: EnvironmentContext) -> AppResult<()> {
        let json = serde_json::to_string_pretty(&context)
            .map_err(|e| MeterError::Storage(e.to_string()))?;
        std::fs::write(&self.environment_path, json)
            .map_err(|e| MeterError::Storage(e.to_string()))
    }
}
