//! Serial transport: port opening, terminator framing, and the read loop.
//!
//! The meter streams frames back-to-back with no flow control; every frame
//! ends with the two-byte terminator `[0x00, 0xA5]`. [`FrameSplitter`]
//! cuts the raw byte stream at each terminator (terminator excluded) and
//! tolerates a terminator arriving split across two reads.
//!
//! The engine and all tests run against anything implementing
//! [`SerialPortIO`], so a `tokio::io::duplex` stream substitutes for the
//! physical adapter.

use bytes::{Buf, BytesMut};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::engine::MeterEngine;
use crate::error::{AppResult, MeterError};
use crate::protocol::TERMINATOR;

// =============================================================================
// Serial port types
// =============================================================================

/// Trait alias for async serial port I/O.
///
/// Any type implementing `AsyncRead + AsyncWrite + Unpin + Send` can be
/// used as a port: `tokio_serial::SerialStream` for real hardware,
/// `tokio::io::DuplexStream` for tests.
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased boxed serial port.
pub type DynSerial = Box<dyn SerialPortIO>;

/// Type-erased write half of a port, used for command transmission.
pub type DynWriter = Box<dyn AsyncWrite + Send + Unpin>;

// =============================================================================
// Terminator framing
// =============================================================================

/// Pending bytes allowed before a terminator must appear. A stream that
/// exceeds this without one is not speaking the protocol; its backlog is
/// dropped rather than grown without bound.
const MAX_PENDING: usize = 1024;

/// Incremental scanner cutting the byte stream into frame chunks.
#[derive(Debug, Default)]
pub struct FrameSplitter {
    pending: BytesMut,
}

impl FrameSplitter {
    /// New splitter with no pending bytes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed freshly read bytes; returns the chunks they completed, in
    /// order, each exclusive of the terminator.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(bytes);

        let mut chunks = Vec::new();
        while let Some(pos) = find_terminator(&self.pending) {
            let chunk = self.pending.split_to(pos);
            self.pending.advance(TERMINATOR.len());
            chunks.push(chunk.to_vec());
        }

        if self.pending.len() > MAX_PENDING {
            tracing::warn!(
                pending = self.pending.len(),
                "no terminator in pending bytes; dropping backlog"
            );
            self.pending.clear();
        }

        chunks
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(TERMINATOR.len())
        .position(|window| window == TERMINATOR)
}

// =============================================================================
// Port opening & read loop
// =============================================================================

/// Open the meter's serial port asynchronously.
///
/// Opening is wrapped in `spawn_blocking` so port initialization never
/// stalls the runtime. Settings are the meter's fixed 8N1, no flow control.
#[cfg(feature = "serial")]
pub async fn open_serial_async(
    port_path: &str,
    baud_rate: u32,
) -> anyhow::Result<tokio_serial::SerialStream> {
    use anyhow::Context;
    use tokio_serial::SerialPortBuilderExt;

    let port_path_owned = port_path.to_string();

    tokio::task::spawn_blocking(move || {
        tokio_serial::new(&port_path_owned, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .context(format!("Failed to open meter serial port: {port_path_owned}"))
    })
    .await
    .context("spawn_blocking for serial port opening failed")?
}

/// Pump bytes from the port into the engine until EOF or an I/O error.
///
/// Never returns `Ok`: the meter streams indefinitely, so a clean EOF is
/// itself a transport fault.
pub async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    engine: Arc<MeterEngine>,
) -> AppResult<()> {
    let mut splitter = FrameSplitter::new();
    let mut buf = [0u8; 256];

    loop {
        let read = reader.read(&mut buf).await.map_err(MeterError::Io)?;
        if read == 0 {
            return Err(MeterError::SerialUnexpectedEof);
        }
        for chunk in splitter.push(&buf[..read]) {
            engine.ingest_chunk(&chunk);
        }
    }
}
