//! Field-level decoding: one delimited part into one semantic update.
//!
//! The first byte of a part is the flag, the rest is the payload. Decoding
//! is total: every flag value yields a [`FieldUpdate`], with unrecognized
//! flags mapped to [`FieldUpdate::Unknown`] rather than rejected. A frame
//! must never be lost to a single odd part.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::flags;

/// Calibrated measurement band selected on the meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeBand {
    /// 30-80 dB.
    #[serde(rename = "30-80")]
    Db30To80,
    /// 50-100 dB.
    #[serde(rename = "50-100")]
    Db50To100,
    /// 80-130 dB.
    #[serde(rename = "80-130")]
    Db80To130,
    /// 30-130 dB, the full span.
    #[serde(rename = "30-130")]
    Db30To130,
}

impl fmt::Display for RangeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RangeBand::Db30To80 => "30-80 dB",
            RangeBand::Db50To100 => "50-100 dB",
            RangeBand::Db80To130 => "80-130 dB",
            RangeBand::Db30To130 => "30-130 dB",
        };
        f.write_str(label)
    }
}

/// Frequency weighting curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Weighting {
    /// A-weighted (human hearing).
    #[serde(rename = "dbA")]
    DbA,
    /// C-weighted (flat at high pressure levels).
    #[serde(rename = "dbC")]
    DbC,
}

/// Response speed of the needle/display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSpeed {
    /// 1 s time constant.
    Slow,
    /// 125 ms time constant.
    Fast,
}

/// Extreme-capture mode of the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Live readings, no capture.
    Default,
    /// Display tracks the minimum.
    Min,
    /// Display tracks the maximum.
    Max,
}

/// Decoded effect of a single delimited part on the frame under assembly.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    /// Selected range band.
    Range(RangeBand),
    /// Selected frequency weighting.
    Frequency(Weighting),
    /// Selected response speed.
    Speed(ResponseSpeed),
    /// Min or max capture mode (the decoder never produces `Default`).
    Mode(CaptureMode),
    /// Recording indicator seen; latches `true` within the frame.
    Recording,
    /// Display-full indicator seen.
    Full,
    /// Reading above the calibrated range.
    LimitOver,
    /// Reading below the calibrated range.
    LimitUnder,
    /// Display hold. Carries the payload length when it exceeds one byte,
    /// nothing otherwise. Using the *length* as the signal is unconfirmed
    /// reverse engineering; reproduce as observed, do not rationalize.
    Hold(Option<usize>),
    /// Displayed noise level in dB; NaN when the payload does not decode.
    Level(f64),
    /// Device time of day, `"H:MM:SS"` with unpadded components. Empty when
    /// the payload does not decode.
    Time(String),
    /// Flag byte not in the known table. Preserved for diagnostics only.
    Unknown(u8),
}

/// Decode one part. Total over all flag values; never fails.
pub fn decode_field(flag: u8, payload: &[u8]) -> FieldUpdate {
    match flag {
        flags::RANGE_30_80 => FieldUpdate::Range(RangeBand::Db30To80),
        flags::RANGE_50_100 => FieldUpdate::Range(RangeBand::Db50To100),
        flags::RANGE_80_130 => FieldUpdate::Range(RangeBand::Db80To130),
        flags::RANGE_30_130 => FieldUpdate::Range(RangeBand::Db30To130),
        flags::FREQUENCY_DBA => FieldUpdate::Frequency(Weighting::DbA),
        flags::FREQUENCY_DBC => FieldUpdate::Frequency(Weighting::DbC),
        flags::SPEED_FAST => FieldUpdate::Speed(ResponseSpeed::Fast),
        flags::SPEED_SLOW => FieldUpdate::Speed(ResponseSpeed::Slow),
        flags::MODE_MAX => FieldUpdate::Mode(CaptureMode::Max),
        flags::MODE_MIN => FieldUpdate::Mode(CaptureMode::Min),
        flags::RECORDING => FieldUpdate::Recording,
        flags::FULL => FieldUpdate::Full,
        flags::LIMIT_OVER => FieldUpdate::LimitOver,
        flags::LIMIT_UNDER => FieldUpdate::LimitUnder,
        flags::HOLD => FieldUpdate::Hold((payload.len() > 1).then_some(payload.len())),
        flags::LEVEL => FieldUpdate::Level(decode_level(payload)),
        flags::TIME => FieldUpdate::Time(decode_time(payload).unwrap_or_default()),
        other => FieldUpdate::Unknown(other),
    }
}

/// Decode the packed level payload.
///
/// The meter packs the displayed value BCD-like: the payload's hex rendering
/// is reinterpreted as a base-10 number with one implied decimal place.
/// `[0x04, 0x52]` renders as `"0452"`, reads as 452, and means 45.2 dB.
/// Hex digits A-F never occur in practice; a payload containing them (or an
/// empty payload) is undecodable and yields NaN.
pub fn decode_level(payload: &[u8]) -> f64 {
    match hex_text(payload).parse::<i64>() {
        Ok(value) => value as f64 / 10.0,
        Err(_) => f64::NAN,
    }
}

/// Decode the packed time-of-day payload.
///
/// One digit per hex nibble: AM/PM flag, hour, two minute digits, two second
/// digits; trailing digits the meter omits default to 0. A flag digit of 2
/// marks PM and adds 12 to the hour. `[0x24, 0x03, 0x27]` renders as
/// `"240327"` and decodes to `"16:3:27"` — components are plain integers,
/// not zero-padded strings.
///
/// Returns `None` when the flag/hour digits are missing or any consumed
/// nibble is not a decimal digit.
pub fn decode_time(payload: &[u8]) -> Option<String> {
    let text = hex_text(payload);
    let nibbles: Vec<char> = text.chars().collect();

    let pm = *nibbles.first()?;
    let mut hour = nibbles.get(1)?.to_digit(10)?;
    let nibble_or_zero = |i: usize| nibbles.get(i).copied().unwrap_or('0');
    let minutes = two_digits(nibble_or_zero(2), nibble_or_zero(3))?;
    let seconds = two_digits(nibble_or_zero(4), nibble_or_zero(5))?;

    if pm == '2' {
        hour += 12;
    }

    Some(format!("{hour}:{minutes}:{seconds}"))
}

fn two_digits(tens: char, ones: char) -> Option<u32> {
    Some(tens.to_digit(10)? * 10 + ones.to_digit(10)?)
}

/// Lowercase hex rendering of a payload, two characters per byte.
pub(crate) fn hex_text(payload: &[u8]) -> String {
    use std::fmt::Write;

    let mut text = String::with_capacity(payload.len() * 2);
    for byte in payload {
        // Infallible for String.
        let _ = write!(text, "{byte:02x}");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_decodes_one_decimal_place() {
        assert_eq!(decode_level(&[0x04, 0x52]), 45.2);
        assert_eq!(decode_level(&[0x00, 0x00]), 0.0);
        assert_eq!(decode_level(&[0x12, 0x09]), 120.9);
    }

    #[test]
    fn level_degrades_to_nan() {
        assert!(decode_level(&[]).is_nan());
        // 0x4A renders as "4a": hex letters do not parse as decimal digits.
        assert!(decode_level(&[0x4A, 0x52]).is_nan());
    }

    #[test]
    fn time_decodes_canonical_vector() {
        // pm digit 2 adds 12 to hour 4; minutes "03", seconds "27".
        assert_eq!(decode_time(&[0x24, 0x03, 0x27]).as_deref(), Some("16:3:27"));
    }

    #[test]
    fn time_defaults_missing_trailing_digits_to_zero() {
        assert_eq!(decode_time(&[0x24]).as_deref(), Some("16:0:0"));
        assert_eq!(decode_time(&[0x10, 0x30]).as_deref(), Some("0:30:0"));
    }

    #[test]
    fn time_components_are_not_zero_padded() {
        assert_eq!(decode_time(&[0x19, 0x05, 0x07]).as_deref(), Some("9:5:7"));
    }

    #[test]
    fn time_degrades_on_hex_letters_and_empty_payload() {
        assert_eq!(decode_time(&[]), None);
        assert_eq!(decode_time(&[0x2A, 0x03, 0x27]), None);
        assert_eq!(decode_time(&[0x24, 0xA3, 0x27]), None);
    }

    #[test]
    fn hold_uses_payload_length_as_signal() {
        // Documented guess from reverse engineering: length, not value.
        assert_eq!(
            decode_field(flags::HOLD, &[0x01, 0x02]),
            FieldUpdate::Hold(Some(2))
        );
        assert_eq!(decode_field(flags::HOLD, &[0x01]), FieldUpdate::Hold(None));
        assert_eq!(decode_field(flags::HOLD, &[]), FieldUpdate::Hold(None));
    }

    #[test]
    fn unrecognized_flags_are_preserved_not_rejected() {
        assert_eq!(decode_field(0x76, &[0x01]), FieldUpdate::Unknown(0x76));
        assert_eq!(decode_field(0xFF, &[]), FieldUpdate::Unknown(0xFF));
    }

    #[test]
    fn known_flags_dispatch() {
        assert_eq!(
            decode_field(flags::RANGE_30_130, &[]),
            FieldUpdate::Range(RangeBand::Db30To130)
        );
        assert_eq!(
            decode_field(flags::FREQUENCY_DBC, &[]),
            FieldUpdate::Frequency(Weighting::DbC)
        );
        assert_eq!(
            decode_field(flags::SPEED_SLOW, &[]),
            FieldUpdate::Speed(ResponseSpeed::Slow)
        );
        assert_eq!(
            decode_field(flags::MODE_MIN, &[]),
            FieldUpdate::Mode(CaptureMode::Min)
        );
        assert_eq!(decode_field(flags::RECORDING, &[]), FieldUpdate::Recording);
        assert_eq!(decode_field(flags::FULL, &[]), FieldUpdate::Full);
        assert_eq!(decode_field(flags::LIMIT_OVER, &[]), FieldUpdate::LimitOver);
        assert_eq!(
            decode_field(flags::LIMIT_UNDER, &[]),
            FieldUpdate::LimitUnder
        );
    }
}
