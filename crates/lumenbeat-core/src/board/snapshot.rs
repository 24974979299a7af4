//! Read-only view of the board for monitoring

use super::color::Rgb;
use super::theme::Arrangement;
use crate::audio::{EnergyLevel, TempoEstimate};
use serde::{Deserialize, Serialize};

/// One fixture in a [`BoardSnapshot`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureSnapshot {
    /// Fixture name
    pub name: String,
    /// Composited output color
    pub rgb: Rgb,
    /// Whether a kick flash is running
    pub kick_active: bool,
    /// Sequence palette position
    pub sequence_index: usize,
}

/// State of the whole board at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    /// Active theme, if any was applied
    pub theme: Option<String>,
    /// Active arrangement
    pub arrangement: Option<Arrangement>,
    /// Last published tempo
    pub tempo: Option<TempoEstimate>,
    /// Last global energy level
    pub energy: Option<EnergyLevel>,
    /// Sequence brightness multiplier
    pub intensity: f32,
    /// Whether rest mode is on
    pub resting: bool,
    /// Per-fixture state
    pub fixtures: Vec<FixtureSnapshot>,
}

impl BoardSnapshot {
    /// Fixture by name
    pub fn fixture(&self, name: &str) -> Option<&FixtureSnapshot> {
        self.fixtures.iter().find(|f| f.name == name)
    }

    /// Pretty JSON for logs and monitoring files
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
