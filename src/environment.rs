//! Logical placement of the meter: which environment it sits in and the
//! state of the window next to it.
//!
//! The context is loaded from persistence once at start-up, mutated in
//! place by the external set-environment command, and stamped onto every
//! measurement record produced thereafter.

use serde::{Deserialize, Serialize};

/// Context stamped onto every persisted measurement record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentContext {
    /// Where the meter is placed (row id in the persistence layer).
    pub environment_id: u32,
    /// State of the nearby window (see [`WindowState`]).
    pub window_state_id: u32,
}

impl Default for EnvironmentContext {
    fn default() -> Self {
        // Id 1 is the "unknown" row the persistence layer seeds.
        Self {
            environment_id: 1,
            window_state_id: 1,
        }
    }
}

impl EnvironmentContext {
    /// Merge a partial update; absent fields leave the context unchanged.
    pub fn apply(&mut self, update: EnvironmentUpdate) {
        if let Some(environment_id) = update.environment_id {
            self.environment_id = environment_id;
        }
        if let Some(window_state_id) = update.window_state_id {
            self.window_state_id = window_state_id;
        }
    }

    /// Typed view of the window state, when the id is a known one.
    pub fn window_state(&self) -> Option<WindowState> {
        WindowState::from_id(self.window_state_id)
    }
}

/// Partial change to the environment context.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct EnvironmentUpdate {
    /// New environment id, if changing.
    pub environment_id: Option<u32>,
    /// New window state id, if changing.
    pub window_state_id: Option<u32>,
}

/// Window-state vocabulary. Ids are fixed by the persistence seed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowState {
    /// Not recorded.
    Unknown,
    /// Fully open.
    Open,
    /// Tilted ajar.
    Tilted,
    /// Closed.
    Closed,
    /// Meter is outside.
    Outside,
}

impl WindowState {
    /// Resolve a persisted id to its state.
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(WindowState::Unknown),
            2 => Some(WindowState::Open),
            3 => Some(WindowState::Tilted),
            4 => Some(WindowState::Closed),
            5 => Some(WindowState::Outside),
            _ => None,
        }
    }

    /// Human-readable name for status output.
    pub fn name(self) -> &'static str {
        match self {
            WindowState::Unknown => "unknown",
            WindowState::Open => "open",
            WindowState::Tilted => "tilted",
            WindowState::Closed => "closed",
            WindowState::Outside => "outside",
        }
    }
}
