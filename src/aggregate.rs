//! Windowed reduction of frames into `{min, max, mean}`.
//!
//! Once per aggregation window the engine drains the frame buffer and
//! reduces it here. Filtering runs in a fixed order: frames with an
//! out-of-calibration reading go first, then frames with a held display,
//! then individual values that are NaN or outside the plausible bounds.
//! Whatever survives is summarized to one decimal place.

use serde::{Deserialize, Serialize};

use crate::protocol::frame::Frame;

/// Closed interval of plausible sensor readings, in dB.
///
/// The PT-8005 measures 30-130 dB across its range bands; values outside
/// a generous envelope are decode garbage, not sound. The envelope is
/// deliberately configurable — historical deployments used both 20-120
/// and 30-120.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueBounds {
    /// Lowest plausible reading (inclusive).
    pub min: f64,
    /// Highest plausible reading (inclusive).
    pub max: f64,
}

impl Default for ValueBounds {
    fn default() -> Self {
        Self {
            min: 20.0,
            max: 120.0,
        }
    }
}

impl ValueBounds {
    /// Whether a value is inside the closed interval. NaN is never inside.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Statistical summary of one aggregation window, one decimal place each.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Aggregate {
    /// Smallest valid reading.
    pub min: f64,
    /// Largest valid reading.
    pub max: f64,
    /// Arithmetic mean of the valid readings.
    pub mean: f64,
}

/// Outcome of reducing one window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSummary {
    /// `None` when no valid value survived filtering — including the case
    /// of an entirely empty window. Never a zero-filled placeholder.
    pub aggregate: Option<Aggregate>,
    /// Frames drained from the buffer for this window.
    pub frames: usize,
    /// Frames dropped for an out-of-calibration or held reading.
    pub dropped_frames: usize,
    /// Values dropped as NaN or outside the plausible bounds.
    pub dropped_values: usize,
}

impl WindowSummary {
    /// Whether the window contained no frames at all (as opposed to frames
    /// that all failed filtering).
    pub fn is_empty_window(&self) -> bool {
        self.frames == 0
    }
}

/// Reduce one window of drained frames.
pub fn summarize_window(frames: &[Frame], bounds: ValueBounds) -> WindowSummary {
    let live: Vec<&Frame> = frames
        .iter()
        .filter(|frame| frame.readings.range_limit_exceeded.is_none())
        .filter(|frame| frame.readings.hold.is_none())
        .collect();

    let values: Vec<f64> = live
        .iter()
        .map(|frame| frame.readings.value)
        .filter(|&value| bounds.contains(value))
        .collect();

    let aggregate = compute(&values);

    WindowSummary {
        aggregate,
        frames: frames.len(),
        dropped_frames: frames.len() - live.len(),
        dropped_values: live.len() - values.len(),
    }
}

fn compute(values: &[f64]) -> Option<Aggregate> {
    if values.is_empty() {
        return None;
    }

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for &value in values {
        min = min.min(value);
        max = max.max(value);
        sum += value;
    }

    Some(Aggregate {
        min: round1(min),
        max: round1(max),
        mean: round1(sum / values.len() as f64),
    })
}

/// Round to one decimal place, halves away from zero.
fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
