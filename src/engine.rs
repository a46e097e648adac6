//! Decode-and-aggregate engine for the PT-8005.
//!
//! One [`MeterEngine`] is constructed at process start and shared by
//! handle with every collaborator (transport read loop, timers, status
//! consumers). There is no hidden global instance.
//!
//! Data flow: the read loop hands terminator-delimited chunks to
//! [`MeterEngine::ingest_chunk`], which assembles a frame, buffers it, and
//! folds its settings patch into the carry-over snapshot. A fixed-period
//! timer drives [`MeterEngine::aggregate_tick`] (drain, filter, summarize,
//! publish); a second, slower timer drives [`MeterEngine::flush_tick`]
//! (drain the record buffer, one store call). No persistence I/O ever
//! happens on the decode path.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::aggregate::{summarize_window, Aggregate, ValueBounds, WindowSummary};
use crate::buffer::SwapQueue;
use crate::environment::{EnvironmentContext, EnvironmentUpdate, WindowState};
use crate::error::{AppResult, MeterError};
use crate::protocol::frame::{Frame, FrameAssembler};
use crate::protocol::Command;
use crate::settings::SettingsSnapshot;
use crate::storage::{MeasurementRecord, MeasurementStore};
use crate::transport::{DynWriter, SerialPortIO};

// =============================================================================
// Configuration & status types
// =============================================================================

/// Engine tuning, derived from the application configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Length of one aggregation window.
    pub aggregate_interval: Duration,
    /// Period between persistence flushes.
    pub flush_interval: Duration,
    /// Plausible-reading envelope used for value filtering.
    pub bounds: ValueBounds,
    /// Enable frame indices, per-part captures, and drop-count logging.
    pub verbose: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            aggregate_interval: Duration::from_secs(1),
            flush_interval: Duration::from_secs(10),
            bounds: ValueBounds::default(),
            verbose: false,
        }
    }
}

/// Externally visible engine state, as returned by [`MeterEngine::status`].
#[derive(Debug, Clone, Serialize)]
pub struct MeterStatus {
    /// Human-readable progress message.
    pub info: String,
    /// Most recent fault, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Aggregate of the last window; absent when the window had no valid
    /// data — never a stale value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Aggregate>,
    /// Last known meter configuration.
    pub settings: SettingsSnapshot,
    /// Context currently stamped onto records.
    pub environment: EnvironmentContext,
}

struct EngineState {
    assembler: FrameAssembler,
    snapshot: SettingsSnapshot,
    last_aggregate: Option<Aggregate>,
    info_message: String,
    error_message: Option<String>,
    environment: EnvironmentContext,
    received_any: bool,
}

// =============================================================================
// MeterEngine
// =============================================================================

/// The frame decoder and aggregation engine.
pub struct MeterEngine {
    config: EngineConfig,
    store: Arc<dyn MeasurementStore>,
    frames: SwapQueue<Frame>,
    pending_records: SwapQueue<MeasurementRecord>,
    state: Mutex<EngineState>,
    writer: tokio::sync::Mutex<Option<DynWriter>>,
}

impl MeterEngine {
    /// Build an engine, restoring the environment context the store last
    /// persisted.
    pub async fn new(
        config: EngineConfig,
        store: Arc<dyn MeasurementStore>,
    ) -> AppResult<Arc<Self>> {
        let environment = store.load_environment().await?;

        Ok(Arc::new(Self {
            frames: SwapQueue::new(),
            pending_records: SwapQueue::new(),
            state: Mutex::new(EngineState {
                assembler: FrameAssembler::new(config.verbose),
                snapshot: SettingsSnapshot::default(),
                last_aggregate: None,
                info_message: "Not initialised".to_string(),
                error_message: None,
                environment,
                received_any: false,
            }),
            writer: tokio::sync::Mutex::new(None),
            config,
            store,
        }))
    }

    /// Decode one terminator-delimited chunk into a frame, buffer it, and
    /// fold its settings into the carry-over snapshot.
    pub fn ingest_chunk(&self, chunk: &[u8]) {
        let frame = {
            let mut state = self.lock_state();
            let frame = state.assembler.assemble(chunk);
            state.snapshot.merge(&frame.settings);
            if !state.received_any {
                state.received_any = true;
                state.info_message = "Receiving data from meter".to_string();
            }
            frame
        };

        if self.config.verbose {
            tracing::trace!(?frame, "frame assembled");
        }
        self.frames.push(frame);
    }

    /// One aggregation window boundary, stamped with the current time.
    pub fn aggregate_tick(&self) -> WindowSummary {
        self.aggregate_tick_at(Utc::now())
    }

    /// One aggregation window boundary: drain the frame buffer atomically,
    /// filter, compute, and publish.
    ///
    /// Windows without a single valid value clear the visible aggregate
    /// rather than letting a stale one linger, and the status message says
    /// whether the window was empty or merely invalid.
    pub fn aggregate_tick_at(&self, now: DateTime<Utc>) -> WindowSummary {
        let drained = self.frames.take_all();
        let summary = summarize_window(&drained, self.config.bounds);

        if self.config.verbose && (summary.dropped_frames > 0 || summary.dropped_values > 0) {
            tracing::debug!(
                dropped_frames = summary.dropped_frames,
                dropped_values = summary.dropped_values,
                "dropped invalid data in window"
            );
        }

        let record = {
            let mut state = self.lock_state();
            state.last_aggregate = summary.aggregate;

            match summary.aggregate {
                None if summary.is_empty_window() => {
                    state.info_message = "No data received. Check meter".to_string();
                    tracing::warn!("no frames received in aggregation window");
                    None
                }
                None => {
                    state.info_message =
                        "No valid values found. Check range on meter".to_string();
                    tracing::warn!(
                        frames = summary.frames,
                        "frames received but none valid in aggregation window"
                    );
                    None
                }
                Some(aggregate) => Some(MeasurementRecord {
                    timestamp: now.timestamp(),
                    interval_ms: self.config.aggregate_interval.as_millis() as u64,
                    min: aggregate.min,
                    max: aggregate.max,
                    mean: aggregate.mean,
                    environment_id: state.environment.environment_id,
                    window_state_id: state.environment.window_state_id,
                }),
            }
        };

        if let Some(record) = record {
            self.pending_records.push(record);
        }
        summary
    }

    /// One flush boundary: hand the accumulated batch to the store in a
    /// single call. An empty batch still flushes (a no-op write).
    ///
    /// A failed flush surfaces as a status error only; the batch is not
    /// retried and is lost. That limitation is deliberate, not masked.
    pub async fn flush_tick(&self) {
        let batch = self.pending_records.take_all();

        match self.store.append_measurements(&batch).await {
            Ok(()) => {
                let mut state = self.lock_state();
                state.info_message = format!(
                    "{} values written to store at {}",
                    batch.len(),
                    Utc::now().to_rfc3339()
                );
            }
            Err(err) => {
                tracing::error!(%err, records = batch.len(), "measurement flush failed; batch dropped");
                let mut state = self.lock_state();
                state.error_message = Some(format!("Flush failed: {err}"));
            }
        }
    }

    /// Current externally visible state.
    pub fn status(&self) -> MeterStatus {
        let state = self.lock_state();
        MeterStatus {
            info: state.info_message.clone(),
            error: state.error_message.clone(),
            values: state.last_aggregate,
            settings: state.snapshot,
            environment: state.environment,
        }
    }

    /// Total frames assembled since start (diagnostic).
    pub fn frames_read(&self) -> u64 {
        self.lock_state().assembler.frames_read()
    }

    /// Merge a partial context change and persist it immediately.
    pub async fn set_environment(
        &self,
        update: EnvironmentUpdate,
    ) -> AppResult<EnvironmentContext> {
        let context = {
            let mut state = self.lock_state();
            state.environment.apply(update);
            state.environment
        };
        self.store.store_environment(context).await?;

        tracing::info!(
            environment_id = context.environment_id,
            window_state = context.window_state().map(WindowState::name),
            "environment context updated"
        );
        Ok(context)
    }

    /// Transmit a single configuration byte to the meter.
    ///
    /// Best effort: the device defines no acknowledgement, so success only
    /// means the byte left this side of the wire.
    pub async fn send_command(&self, command: Command) -> AppResult<()> {
        let mut writer = self.writer.lock().await;
        let Some(writer) = writer.as_mut() else {
            return Err(MeterError::SerialPortNotConnected);
        };

        let result = async {
            writer.write_all(&[command.byte()]).await?;
            writer.flush().await
        }
        .await;

        match result {
            Ok(()) => {
                tracing::info!(?command, byte = command.byte(), "command written");
                Ok(())
            }
            Err(err) => {
                self.record_transport_error(format!("Error on write: {err}"));
                Err(MeterError::Io(err))
            }
        }
    }

    /// Attach the transport's write half used by [`Self::send_command`].
    pub async fn attach_writer(&self, writer: DynWriter) {
        *self.writer.lock().await = Some(writer);
    }

    /// Record a transport-level fault in the visible status. The engine's
    /// decode and aggregation state is untouched.
    pub fn record_transport_error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(%message, "transport fault");
        self.lock_state().error_message = Some(message);
    }

    /// Update the visible info message.
    pub fn record_info(&self, message: impl Into<String>) {
        self.lock_state().info_message = message.into();
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        // Poisoning only marks a panicked holder; the state is coherent.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// =============================================================================
// Runtime wiring
// =============================================================================

/// Drive an engine against an open transport until the surrounding task is
/// cancelled.
///
/// Splits the port, attaches the write half for command transmission, and
/// runs the read loop plus both timers. A transport fault stops reading but
/// leaves the timers running — aggregation keeps reporting the no-data
/// condition instead of killing the process.
pub async fn run<S: SerialPortIO + 'static>(engine: Arc<MeterEngine>, port: S) {
    let (reader, writer) = tokio::io::split(port);
    engine.attach_writer(Box::new(writer)).await;

    // First tick after one full period, like the timers this replaces.
    let start = tokio::time::Instant::now();
    let mut aggregate = tokio::time::interval_at(
        start + engine.config.aggregate_interval,
        engine.config.aggregate_interval,
    );
    let mut flush =
        tokio::time::interval_at(start + engine.config.flush_interval, engine.config.flush_interval);
    // Ticks must never run concurrently with themselves; late ones are
    // skipped to preserve the drain invariant.
    aggregate.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    flush.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let read = crate::transport::read_loop(reader, Arc::clone(&engine));
    tokio::pin!(read);
    let mut read_finished = false;

    loop {
        tokio::select! {
            result = &mut read, if !read_finished => {
                read_finished = true;
                if let Err(err) = result {
                    engine.record_transport_error(err.to_string());
                }
            }
            _ = aggregate.tick() => {
                engine.aggregate_tick();
            }
            _ = flush.tick() => {
                engine.flush_tick().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::field::{CaptureMode, RangeBand};
    use crate::protocol::{flags, DELIMITER};
    use async_trait::async_trait;
    use tokio::io::AsyncReadExt;

    #[derive(Default)]
    struct MemoryStore {
        environment: Mutex<EnvironmentContext>,
        batches: Mutex<Vec<Vec<MeasurementRecord>>>,
        fail_append: bool,
    }

    impl MemoryStore {
        fn failing() -> Self {
            Self {
                fail_append: true,
                ..Self::default()
            }
        }

        fn batches(&self) -> Vec<Vec<MeasurementRecord>> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MeasurementStore for MemoryStore {
        async fn append_measurements(&self, batch: &[MeasurementRecord]) -> AppResult<()> {
            if self.fail_append {
                return Err(MeterError::Storage("store unavailable".to_string()));
            }
            self.batches.lock().unwrap().push(batch.to_vec());
            Ok(())
        }

        async fn load_environment(&self) -> AppResult<EnvironmentContext> {
            Ok(*self.environment.lock().unwrap())
        }

        async fn store_environment(&self, context: EnvironmentContext) -> AppResult<()> {
            *self.environment.lock().unwrap() = context;
            Ok(())
        }
    }

    async fn engine_with(store: MemoryStore) -> (Arc<MeterEngine>, Arc<MemoryStore>) {
        let store = Arc::new(store);
        let engine = MeterEngine::new(EngineConfig::default(), store.clone())
            .await
            .unwrap();
        (engine, store)
    }

    fn level_chunk(hi: u8, lo: u8) -> Vec<u8> {
        vec![flags::LEVEL, hi, lo]
    }

    #[tokio::test]
    async fn ingest_and_aggregate_publishes_a_record() {
        let (engine, _) = engine_with(MemoryStore::default()).await;

        engine.ingest_chunk(&level_chunk(0x04, 0x52)); // 45.2
        engine.ingest_chunk(&level_chunk(0x02, 0x10)); // 21.0

        let summary = engine.aggregate_tick();
        assert_eq!(summary.frames, 2);

        let status = engine.status();
        let aggregate = status.values.unwrap();
        assert_eq!(aggregate.min, 21.0);
        assert_eq!(aggregate.max, 45.2);
        assert_eq!(aggregate.mean, 33.1);
        assert_eq!(status.info, "Receiving data from meter");
    }

    #[tokio::test]
    async fn empty_window_reports_no_data_and_clears_aggregate() {
        let (engine, _) = engine_with(MemoryStore::default()).await;

        engine.ingest_chunk(&level_chunk(0x04, 0x52));
        engine.aggregate_tick();
        assert!(engine.status().values.is_some());

        let summary = engine.aggregate_tick();
        assert!(summary.is_empty_window());

        let status = engine.status();
        assert!(status.values.is_none());
        assert_eq!(status.info, "No data received. Check meter");
    }

    #[tokio::test]
    async fn invalid_only_window_reports_distinct_message() {
        let (engine, _) = engine_with(MemoryStore::default()).await;

        // Held frame plus a garbage value: frames present, none valid.
        engine.ingest_chunk(&[flags::HOLD, 0x01, 0x02]);
        engine.ingest_chunk(&level_chunk(0x99, 0x99)); // 999.9, out of bounds

        let summary = engine.aggregate_tick();
        assert!(!summary.is_empty_window());
        assert!(summary.aggregate.is_none());

        let status = engine.status();
        assert!(status.values.is_none());
        assert_eq!(status.info, "No valid values found. Check range on meter");
    }

    #[tokio::test]
    async fn settings_carry_over_across_windows() {
        let (engine, _) = engine_with(MemoryStore::default()).await;

        engine.ingest_chunk(&[flags::RANGE_30_80, DELIMITER, flags::MODE_MAX]);
        engine.aggregate_tick();
        engine.ingest_chunk(&[flags::RANGE_30_130]);
        engine.aggregate_tick();

        let settings = engine.status().settings;
        // The newer range wins; mode reverts to the default every frame
        // that does not resend it.
        assert_eq!(settings.range, Some(RangeBand::Db30To130));
        assert_eq!(settings.mode, Some(CaptureMode::Default));
    }

    #[tokio::test]
    async fn records_are_stamped_with_environment_and_window_length() {
        let store = MemoryStore::default();
        *store.environment.lock().unwrap() = EnvironmentContext {
            environment_id: 3,
            window_state_id: 4,
        };
        let (engine, store) = engine_with(store).await;

        engine.ingest_chunk(&level_chunk(0x04, 0x52));
        engine.aggregate_tick();
        engine.flush_tick().await;

        let batches = store.batches();
        assert_eq!(batches.len(), 1);
        let record = batches[0][0];
        assert_eq!(record.environment_id, 3);
        assert_eq!(record.window_state_id, 4);
        assert_eq!(record.interval_ms, 1000);
        assert_eq!(record.mean, 45.2);
    }

    #[tokio::test]
    async fn empty_flush_is_still_a_store_call() {
        let (engine, store) = engine_with(MemoryStore::default()).await;

        engine.flush_tick().await;

        let batches = store.batches();
        assert_eq!(batches.len(), 1);
        assert!(batches[0].is_empty());
        assert!(engine.status().info.contains("0 values written"));
    }

    #[tokio::test]
    async fn failed_flush_surfaces_error_and_drops_batch() {
        let (engine, _) = engine_with(MemoryStore::failing()).await;

        engine.ingest_chunk(&level_chunk(0x04, 0x52));
        engine.aggregate_tick();
        engine.flush_tick().await;

        let status = engine.status();
        assert!(status.error.unwrap().contains("store unavailable"));
        // The batch is gone, not requeued.
        engine.flush_tick().await;
        assert!(engine.status().error.is_some());
    }

    #[tokio::test]
    async fn set_environment_merges_and_persists() {
        let (engine, store) = engine_with(MemoryStore::default()).await;

        let context = engine
            .set_environment(EnvironmentUpdate {
                environment_id: Some(2),
                window_state_id: None,
            })
            .await
            .unwrap();

        assert_eq!(context.environment_id, 2);
        assert_eq!(context.window_state_id, 1);
        assert_eq!(store.load_environment().await.unwrap(), context);
        assert_eq!(engine.status().environment, context);
    }

    #[tokio::test]
    async fn send_command_requires_an_attached_writer() {
        let (engine, _) = engine_with(MemoryStore::default()).await;

        let result = engine.send_command(Command::Range).await;
        assert!(matches!(result, Err(MeterError::SerialPortNotConnected)));
    }

    #[tokio::test]
    async fn send_command_writes_the_single_byte() {
        let (engine, _) = engine_with(MemoryStore::default()).await;
        let (mut host, device) = tokio::io::duplex(16);
        let (_, writer) = tokio::io::split(device);
        engine.attach_writer(Box::new(writer)).await;

        engine.send_command(Command::Weighting).await.unwrap();

        let mut buf = [0u8; 1];
        host.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf[0], 0x99);
    }
}
