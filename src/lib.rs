//! # PT-8005 Acquisition Engine
//!
//! Core library for the `pt8005-daq` daemon: it reconstructs measurement
//! frames from the PT-8005 sound level meter's undocumented USB-serial
//! stream, decodes per-frame settings and readings, and reduces the frame
//! stream into periodic `{min, max, mean}` aggregates for durable storage.
//!
//! ## Crate Structure
//!
//! - **`protocol`**: the reverse-engineered wire format — flag table,
//!   field decoding, delimiter splitting, and frame assembly.
//! - **`settings`**: the carry-over snapshot that accumulates partial
//!   settings patches across frames.
//! - **`buffer`**: the atomically drained queues between pipeline stages.
//! - **`aggregate`**: windowed filtering and `{min, max, mean}` reduction.
//! - **`environment`**: the location / window-state context stamped onto
//!   persisted records.
//! - **`engine`**: the `MeterEngine` tying the above together, driven by
//!   the transport read loop and two timers.
//! - **`transport`**: serial port opening, terminator framing, and the
//!   read loop.
//! - **`storage`**: the persistence trait and the CSV-backed store.
//! - **`config`**: TOML + environment configuration loading.
//! - **`logging`**: tracing initialization.
//! - **`error`**: the application error type.

pub mod aggregate;
pub mod buffer;
pub mod config;
pub mod engine;
pub mod environment;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod settings;
pub mod storage;
pub mod transport;
