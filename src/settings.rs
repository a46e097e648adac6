//! Cross-frame settings carry-over.
//!
//! The meter does not resend its full configuration on every frame, so the
//! engine keeps a running snapshot that every frame's partial patch is
//! merged into. At any time the snapshot is the union of all settings
//! fields seen so far, each at its most recently observed value.

use serde::Serialize;

use crate::protocol::field::{CaptureMode, RangeBand, ResponseSpeed, Weighting};
use crate::protocol::frame::SettingsPatch;

/// Last known meter configuration, accumulated across frames.
///
/// Merge semantics are last-write-wins per key: a `Some` field in a newer
/// patch overwrites, a `None` field never does, and the snapshot is never
/// cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SettingsSnapshot {
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

impl SettingsSnapshot {
    /// Fold one frame's patch into the snapshot.
    pub fn merge(&mut self, patch: &SettingsPatch) {
        if let Some(range) = patch.range {
            self.range = Some(range);
        }
        if let Some(frequency) = patch.frequency {
            self.frequency = Some(frequency);
        }
        if let Some(speed) = patch.speed {
            self.speed = Some(speed);
        }
        if let Some(mode) = patch.mode {
            self.mode = Some(mode);
        }
        if let Some(recording) = patch.recording {
            self.recording = Some(recording);
        }
        if let Some(full) = patch.full {
            self.full = Some(full);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_last_write_wins_per_key() {
        let mut snapshot = SettingsSnapshot::default();

        snapshot.merge(&SettingsPatch {
            mode: Some(CaptureMode::Max),
            ..SettingsPatch::default()
        });
        snapshot.merge(&SettingsPatch::default());
        snapshot.merge(&SettingsPatch {
            speed: Some(ResponseSpeed::Fast),
            ..SettingsPatch::default()
        });

        // The empty patch in between must not revert mode.
        assert_eq!(snapshot.mode, Some(CaptureMode::Max));
        assert_eq!(snapshot.speed, Some(ResponseSpeed::Fast));
        assert_eq!(snapshot.range, None);
    }

    #[test]
    fn newer_value_overwrites_older() {
        let mut snapshot = SettingsSnapshot::default();

        snapshot.merge(&SettingsPatch {
            range: Some(RangeBand::Db30To80),
            recording: Some(true),
            ..SettingsPatch::default()
        });
        snapshot.merge(&SettingsPatch {
            range: Some(RangeBand::Db30To130),
            recording: Some(false),
            ..SettingsPatch::default()
        });

        assert_eq!(snapshot.range, Some(RangeBand::Db30To130));
        assert_eq!(snapshot.recording, Some(false));
    }

    #[test]
    fn every_field_accumulates_independently() {
        let mut snapshot = SettingsSnapshot::default();

        snapshot.merge(&SettingsPatch {
            range: Some(RangeBand::Db50To100),
            frequency: Some(Weighting::DbA),
            ..SettingsPatch::default()
        });
        snapshot.merge(&SettingsPatch {
            speed: Some(ResponseSpeed::Slow),
            mode: Some(CaptureMode::Min),
            recording: Some(true),
            full: Some(true),
            ..SettingsPatch::default()
        });

        assert_eq!(
            snapshot,
            SettingsSnapshot {
                range: Some(RangeBand::Db50To100),
                frequency: Some(Weighting::DbA),
                speed: Some(ResponseSpeed::Slow),
                mode: Some(CaptureMode::Min),
                recording: Some(true),
                full: Some(true),
            }
        );
    }
}
