//! Reverse-engineered serial protocol of the PT-8005 sound level meter.
//!
//! No vendor documentation exists for this protocol. Every value below was
//! recovered by observing live captures from the USB-serial adapter, so the
//! semantics of several flags remain guesses (marked as such).
//!
//! Protocol Overview:
//! - Baud: 9600, 8N1, no flow control
//! - Direction: the meter streams continuously; nothing is polled
//! - Framing: each frame ends with the terminator sequence `[0x00, 0xA5]`
//! - Within a frame, fields are separated by the delimiter byte `0xA5`
//! - Field format: `[Flag][Payload...]` — one flag byte selecting which
//!   field the remaining payload updates
//! - Numeric payloads are BCD-like: the payload's hex rendering is read as
//!   base-10 digits (see [`field::decode_level`] and [`field::decode_time`])
//!
//! Flags observed but still unexplained (kept so captures stay
//! explainable): `0x0B`, `0x0C`, `0x0E` (only while in range?), `0x10`
//! (near range 30-80), `0x19`, `0x1A`, `0x1F`, `0x20` (near range 50-100),
//! `0x75`, `0x76`.

pub mod field;
pub mod frame;

/// Two-byte sequence closing every frame. Never part of a field; the
/// transport strips it before the chunk reaches the splitter.
pub const TERMINATOR: [u8; 2] = [0x00, 0xA5];

/// Field separator within one frame.
pub const DELIMITER: u8 = 0xA5;

/// Flag byte values, one per field the meter reports.
pub mod flags {
    /// Response speed "fast" selected.
    pub const SPEED_FAST: u8 = 0x02;
    /// Response speed "slow" selected.
    pub const SPEED_SLOW: u8 = 0x03;
    /// Max-capture mode active.
    pub const MODE_MAX: u8 = 0x04;
    /// Min-capture mode active.
    pub const MODE_MIN: u8 = 0x05;
    /// Device time of day.
    pub const TIME: u8 = 0x06;
    /// Reading above the calibrated range.
    pub const LIMIT_OVER: u8 = 0x07;
    /// Reading below the calibrated range.
    pub const LIMIT_UNDER: u8 = 0x08;
    /// Recording indicator lit. No "recording stopped" flag is known.
    pub const RECORDING: u8 = 0x0A;
    /// Displayed noise level.
    pub const LEVEL: u8 = 0x0D;
    /// Display hold. Semantics only partially understood; see
    /// [`super::field::FieldUpdate::Hold`].
    pub const HOLD: u8 = 0x11;
    /// dB(A) frequency weighting.
    pub const FREQUENCY_DBA: u8 = 0x1B;
    /// dB(C) frequency weighting.
    pub const FREQUENCY_DBC: u8 = 0x1C;
    /// Display-full / overflow indicator.
    pub const FULL: u8 = 0x23;
    /// Range 30-80 dB.
    pub const RANGE_30_80: u8 = 0x30;
    /// Range 30-130 dB (full span).
    pub const RANGE_30_130: u8 = 0x40;
    /// Range 50-100 dB.
    pub const RANGE_50_100: u8 = 0x4B;
    /// Range 80-130 dB.
    pub const RANGE_80_130: u8 = 0x4C;
}

/// Single-byte commands accepted by the meter.
///
/// Transmission is best effort: the device acknowledges nothing, and in
/// practice it often resets the configuration right back. Kept as a typed
/// vocabulary so callers cannot write arbitrary bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Toggle min/max capture mode.
    MinMax,
    /// Power the meter off.
    Off,
    /// Toggle recording.
    Record,
    /// Toggle fast/slow response speed.
    Speed,
    /// Cycle the calibration range.
    Range,
    /// Toggle dB(A)/dB(C) frequency weighting.
    Weighting,
}

impl Command {
    /// The wire byte for this command.
    pub const fn byte(self) -> u8 {
        match self {
            Command::MinMax => 0x11,
            Command::Off => 0x33,
            Command::Record => 0x55,
            Command::Speed => 0x77,
            Command::Range => 0x88,
            Command::Weighting => 0x99,
        }
    }
}

impl std::str::FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "min-max" | "minmax" => Ok(Command::MinMax),
            "off" => Ok(Command::Off),
            "record" | "rec" => Ok(Command::Record),
            "speed" => Ok(Command::Speed),
            "range" => Ok(Command::Range),
            "weighting" | "dba-c" => Ok(Command::Weighting),
            other => Err(format!(
                "Unknown command '{other}'. Expected one of: min-max, off, record, speed, range, weighting"
            )),
        }
    }
}
