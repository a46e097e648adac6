//! CLI entry point for the PT-8005 acquisition daemon.
//!
//! Provides two commands:
//! - `run`: acquire, aggregate, and persist measurements until interrupted
//! - `send`: transmit a single configuration byte to the meter (best
//!   effort; the device acknowledges nothing)

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use pt8005_daq::config::MeterConfig;
use pt8005_daq::logging;
use pt8005_daq::protocol::Command;

#[derive(Parser)]
#[command(name = "pt8005-daq")]
#[command(about = "Acquisition daemon for the PT-8005 sound level meter", long_about = None)]
struct Cli {
    /// Path to the configuration file (default: config/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire, aggregate, and persist measurements until interrupted.
    Run,

    /// Send one configuration command to the meter.
    Send {
        /// One of: min-max, off, record, speed, range, weighting.
        command: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MeterConfig::load_from(path)?,
        None => MeterConfig::load()?,
    }
    .validated()?;

    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Run => run_daemon(config).await,
        Commands::Send { command } => {
            let command: Command = command.parse().map_err(anyhow::Error::msg)?;
            send_once(config, command).await
        }
    }
}

#[cfg(all(feature = "serial", feature = "storage_csv"))]
async fn run_daemon(config: MeterConfig) -> Result<()> {
    use pt8005_daq::engine::{self, MeterEngine};
    use pt8005_daq::storage::CsvMeasurementStore;
    use pt8005_daq::transport;
    use std::sync::Arc;

    let store = Arc::new(CsvMeasurementStore::new(&config.storage.data_dir)?);
    let engine = MeterEngine::new(config.engine(), store).await?;

    let port = transport::open_serial_async(&config.device.path, config.device.baud_rate).await?;
    tracing::info!(device = %config.device.path, baud = config.device.baud_rate, "serial port open");
    engine.record_info(format!(
        "Serial port open for device \"{}\"",
        config.device.path
    ));

    tokio::select! {
        () = engine::run(Arc::clone(&engine), port) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, shutting down");
        }
    }

    Ok(())
}

#[cfg(not(all(feature = "serial", feature = "storage_csv")))]
async fn run_daemon(_config: MeterConfig) -> Result<()> {
    anyhow::bail!("Daemon mode requires the 'serial' and 'storage_csv' features")
}

#[cfg(feature = "serial")]
async fn send_once(config: MeterConfig, command: Command) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    use pt8005_daq::transport;

    let mut port =
        transport::open_serial_async(&config.device.path, config.device.baud_rate).await?;
    port.write_all(&[command.byte()]).await?;
    port.flush().await?;
    tracing::info!(?command, byte = command.byte(), "command written");

    Ok(())
}

#[cfg(not(feature = "serial"))]
async fn send_once(_config: MeterConfig, _command: Command) -> Result<()> {
    anyhow::bail!("Command transmission requires the 'serial' feature")
}
