//! Frame reconstruction from delimited byte chunks.
//!
//! The transport hands over one chunk per terminator occurrence. The chunk
//! is split on the delimiter byte into parts, and each part is folded into
//! the frame in arrival order — a later part overwrites an earlier one for
//! the same field.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::field::{
    decode_field, hex_text, CaptureMode, FieldUpdate, RangeBand, ResponseSpeed, Weighting,
};
use super::DELIMITER;

/// Which side of the calibrated range a reading fell out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitSide {
    /// Above the selected range.
    Over,
    /// Below the selected range.
    Under,
}

/// Instantaneous readings carried by one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Readings {
    /// Displayed noise level in dB; NaN until a level part decodes.
    pub value: f64,
    /// Device-reported time of day (`"H:MM:SS"`); empty until seen.
    pub time: String,
    /// Display-hold marker: the reading is frozen, not a live sample,
    /// and is excluded from aggregation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hold: Option<usize>,
    /// Out-of-calibration marker; the reading is excluded from aggregation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_limit_exceeded: Option<LimitSide>,
}

impl Default for Readings {
    fn default() -> Self {
        Self {
            value: f64::NAN,
            time: String::new(),
            hold: None,
            range_limit_exceeded: None,
        }
    }
}

/// Settings fields carried by one frame.
///
/// This is a partial patch, not a full snapshot: `None` means "unchanged by
/// this frame", never "false". The meter does not resend its full
/// configuration on every frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SettingsPatch {
    /// Selected range band.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<RangeBand>,
    /// Selected frequency weighting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Weighting>,
    /// Selected response speed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<ResponseSpeed>,
    /// Extreme-capture mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<CaptureMode>,
    /// Recording indicator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording: Option<bool>,
    /// Display-full indicator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full: Option<bool>,
}

/// Verbatim per-part capture, populated only in verbose mode.
///
/// Recording here never influences the decoded value fields; it exists so a
/// capture can be replayed against the flag table later.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameDiagnostics {
    /// `(flag, payload hex)` for parts the decoder understood.
    pub parsed: Vec<(u8, String)>,
    /// `(flag, payload hex)` for parts it did not.
    pub unknown: Vec<(u8, String)>,
}

/// One reconstructed measurement sample, immutable once assembled.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Diagnostic sequence number; assigned only in verbose mode.
    pub index: Option<u64>,
    /// Host capture time, stamped at assembly (not device time).
    pub timestamp: DateTime<Utc>,
    /// Instantaneous readings.
    pub readings: Readings,
    /// Partial settings patch.
    pub settings: SettingsPatch,
    /// Raw per-part capture; `Some` only in verbose mode.
    pub diagnostics: Option<FrameDiagnostics>,
}

/// Split a chunk on the delimiter byte, dropping empty parts.
///
/// Empty parts arise from consecutive delimiters and carry no information.
/// Order is preserved: it determines field application order, and a later
/// part wins on conflicting fields.
pub fn split_parts(chunk: &[u8]) -> impl Iterator<Item = &[u8]> {
    chunk
        .split(|&byte| byte == DELIMITER)
        .filter(|part| !part.is_empty())
}

/// Builds frames out of terminator-delimited chunks, tracking the
/// diagnostic frame counter.
#[derive(Debug)]
pub struct FrameAssembler {
    verbose: bool,
    frames_read: u64,
}

impl FrameAssembler {
    /// New assembler; `verbose` enables frame indices and per-part capture.
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            frames_read: 0,
        }
    }

    /// Total frames assembled so far.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Assemble one frame, stamped with the current time.
    pub fn assemble(&mut self, chunk: &[u8]) -> Frame {
        self.assemble_at(chunk, Utc::now())
    }

    /// Assemble one frame with an explicit capture timestamp.
    ///
    /// The frame is seeded with NaN value, empty time, default mode, and
    /// recording/full off; parts then apply strictly in arrival order.
    pub fn assemble_at(&mut self, chunk: &[u8], timestamp: DateTime<Utc>) -> Frame {
        let index = self.verbose.then_some(self.frames_read);
        self.frames_read += 1;

        let mut frame = Frame {
            index,
            timestamp,
            readings: Readings::default(),
            settings: SettingsPatch {
                mode: Some(CaptureMode::Default),
                recording: Some(false),
                full: Some(false),
                ..SettingsPatch::default()
            },
            diagnostics: self.verbose.then(FrameDiagnostics::default),
        };

        for part in split_parts(chunk) {
            let Some((&flag, payload)) = part.split_first() else {
                continue;
            };
            let update = decode_field(flag, payload);

            if let Some(diagnostics) = frame.diagnostics.as_mut() {
                let entry = (flag, hex_text(payload));
                match update {
                    FieldUpdate::Unknown(_) => diagnostics.unknown.push(entry),
                    _ => diagnostics.parsed.push(entry),
                }
            }

            apply_update(&mut frame, update);
        }

        frame
    }
}

fn apply_update(frame: &mut Frame, update: FieldUpdate) {
    match update {
        FieldUpdate::Range(band) => frame.settings.range = Some(band),
        FieldUpdate::Frequency(weighting) => frame.settings.frequency = Some(weighting),
        FieldUpdate::Speed(speed) => frame.settings.speed = Some(speed),
        FieldUpdate::Mode(mode) => frame.settings.mode = Some(mode),
        FieldUpdate::Recording => frame.settings.recording = Some(true),
        FieldUpdate::Full => frame.settings.full = Some(true),
        FieldUpdate::LimitOver => frame.readings.range_limit_exceeded = Some(LimitSide::Over),
        FieldUpdate::LimitUnder => frame.readings.range_limit_exceeded = Some(LimitSide::Under),
        FieldUpdate::Hold(hold) => frame.readings.hold = hold,
        FieldUpdate::Level(value) => frame.readings.value = value,
        FieldUpdate::Time(time) => frame.readings.time = time,
        FieldUpdate::Unknown(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::flags;

    fn parts(chunk: &[u8]) -> Vec<&[u8]> {
        split_parts(chunk).collect()
    }

    #[test]
    fn chunk_without_delimiter_is_one_part() {
        assert_eq!(parts(&[0x0D, 0x04, 0x52]), vec![&[0x0D, 0x04, 0x52][..]]);
    }

    #[test]
    fn empty_chunk_yields_no_parts() {
        assert!(parts(&[]).is_empty());
    }

    #[test]
    fn consecutive_delimiters_are_dropped_and_order_kept() {
        let chunk = [0xA5, 0x02, 0xA5, 0xA5, 0x1B, 0xA5];
        assert_eq!(parts(&chunk), vec![&[0x02][..], &[0x1B][..]]);
    }

    #[test]
    fn assembled_frame_starts_from_seeds() {
        let mut assembler = FrameAssembler::new(false);
        let frame = assembler.assemble(&[]);

        assert!(frame.readings.value.is_nan());
        assert_eq!(frame.readings.time, "");
        assert_eq!(frame.readings.hold, None);
        assert_eq!(frame.readings.range_limit_exceeded, None);
        assert_eq!(frame.settings.mode, Some(CaptureMode::Default));
        assert_eq!(frame.settings.recording, Some(false));
        assert_eq!(frame.settings.full, Some(false));
        assert_eq!(frame.settings.range, None);
        assert_eq!(frame.index, None);
        assert_eq!(frame.diagnostics, None);
    }

    #[test]
    fn fields_apply_in_arrival_order_and_later_wins() {
        let mut assembler = FrameAssembler::new(false);
        // Two level parts: 45.2 then 46.0; the later one must win.
        let chunk = [
            flags::LEVEL,
            0x04,
            0x52,
            DELIMITER,
            flags::LEVEL,
            0x04,
            0x60,
        ];
        let frame = assembler.assemble(&chunk);
        assert_eq!(frame.readings.value, 46.0);
    }

    #[test]
    fn full_frame_decodes_every_field() {
        let mut assembler = FrameAssembler::new(false);
        let chunk = [
            flags::RANGE_30_130,
            DELIMITER,
            flags::FREQUENCY_DBA,
            DELIMITER,
            flags::SPEED_FAST,
            DELIMITER,
            flags::MODE_MAX,
            DELIMITER,
            flags::RECORDING,
            DELIMITER,
            flags::LEVEL,
            0x04,
            0x52,
            DELIMITER,
            flags::TIME,
            0x24,
            0x03,
            0x27,
        ];
        let frame = assembler.assemble(&chunk);

        assert_eq!(frame.settings.range, Some(RangeBand::Db30To130));
        assert_eq!(frame.settings.frequency, Some(Weighting::DbA));
        assert_eq!(frame.settings.speed, Some(ResponseSpeed::Fast));
        assert_eq!(frame.settings.mode, Some(CaptureMode::Max));
        assert_eq!(frame.settings.recording, Some(true));
        assert_eq!(frame.readings.value, 45.2);
        assert_eq!(frame.readings.time, "16:3:27");
    }

    #[test]
    fn limit_and_hold_mark_the_reading() {
        let mut assembler = FrameAssembler::new(false);

        let over = assembler.assemble(&[flags::LIMIT_OVER]);
        assert_eq!(over.readings.range_limit_exceeded, Some(LimitSide::Over));

        let under = assembler.assemble(&[flags::LIMIT_UNDER]);
        assert_eq!(under.readings.range_limit_exceeded, Some(LimitSide::Under));

        let held = assembler.assemble(&[flags::HOLD, 0x01, 0x02, 0x03]);
        assert_eq!(held.readings.hold, Some(3));
    }

    #[test]
    fn unknown_parts_never_abort_assembly() {
        let mut assembler = FrameAssembler::new(false);
        let chunk = [0x76, 0x01, DELIMITER, flags::LEVEL, 0x04, 0x52];
        let frame = assembler.assemble(&chunk);
        assert_eq!(frame.readings.value, 45.2);
    }

    #[test]
    fn verbose_mode_indexes_frames_and_captures_parts() {
        let mut assembler = FrameAssembler::new(true);
        let chunk = [flags::LEVEL, 0x04, 0x52, DELIMITER, 0x76, 0x01];

        let first = assembler.assemble(&chunk);
        let second = assembler.assemble(&chunk);
        assert_eq!(first.index, Some(0));
        assert_eq!(second.index, Some(1));
        assert_eq!(assembler.frames_read(), 2);

        let Some(diagnostics) = first.diagnostics.as_ref() else {
            panic!("verbose frame missing diagnostics");
        };
        assert_eq!(diagnostics.parsed, vec![(flags::LEVEL, "0452".to_string())]);
        assert_eq!(diagnostics.unknown, vec![(0x76, "01".to_string())]);
        // The capture must not influence decoded fields.
        assert_eq!(first.readings.value, 45.2);
    }
}
