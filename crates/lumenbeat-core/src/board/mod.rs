//! Fixture board: the animation engine
//!
//! The board owns every fixture, the palette and the themes. Detectors
//! publish kicks, tempo and energy into it; the control loop advances it and
//! reads the composited colors. All operations take an explicit `now` in
//! show-clock seconds.

pub mod color;
pub mod fixture;
pub mod shared;
pub mod snapshot;
pub mod theme;

pub use color::{Palette, Rgb};
pub use fixture::{DmxAddresses, Fixture, FixtureSpec, KickOverlay, Phase, SequenceState};
pub use shared::{SharedBoard, ShowEvents};
pub use snapshot::{BoardSnapshot, FixtureSnapshot};
pub use theme::{Arrangement, ArrangementChoice, ResolvedTheme, Theme, ThemeChoice, ThemeSet};

use crate::audio::{EnergyLevel, EnergySnapshot, TempoEstimate};
use crate::{CoreError, Result};
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Animation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardSettings {
    /// Length of a kick flash (seconds)
    pub kick_duration_secs: f64,
    /// Phase length before any tempo is known
    pub color_duration_secs: f64,
    /// Fade length before any tempo is known
    pub fade_duration_secs: f64,
    /// Beats over which a phase misalignment is corrected
    pub transition_beats: f64,
    /// Consecutive very low energy updates before rest mode
    pub rest_trigger_updates: u32,
    /// Theme used in rest mode, random when unset
    pub rest_theme: Option<String>,
    /// Theme applied at startup, random when unset
    pub initial_theme: Option<String>,
    /// Arrangement for startup and automatic theme changes
    pub initial_arrangement: ArrangementChoice,
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self {
            kick_duration_secs: 0.2,
            color_duration_secs: 2.0,
            fade_duration_secs: 1.0,
            transition_beats: 3.0,
            rest_trigger_updates: 3,
            rest_theme: None,
            initial_theme: None,
            initial_arrangement: ArrangementChoice::Random,
        }
    }
}

/// The animation engine
pub struct Board {
    settings: BoardSettings,
    fixtures: Vec<Fixture>,
    by_name: HashMap<String, usize>,
    palette: Palette,
    themes: ThemeSet,
    active: Option<ResolvedTheme>,
    arrangement: Option<Arrangement>,
    color_duration: f64,
    fade_duration: f64,
    intensity: f32,
    tempo: Option<TempoEstimate>,
    energy: Option<EnergyLevel>,
    very_low_updates: u32,
    resting: bool,
    pre_rest_theme: Option<String>,
    rest_entries: u32,
}

impl Board {
    /// Build the board and apply the initial theme.
    ///
    /// Fails only when `fixtures` is empty. Duplicate names are skipped.
    pub fn new(
        fixtures: Vec<FixtureSpec>,
        palette: Palette,
        themes: ThemeSet,
        settings: BoardSettings,
        now: f64,
    ) -> Result<Self> {
        let color_duration = settings.color_duration_secs.max(0.01);
        let fade_duration = settings.fade_duration_secs.clamp(0.0, color_duration);

        let mut by_name = HashMap::new();
        let mut built = Vec::with_capacity(fixtures.len());
        for spec in fixtures {
            if by_name.contains_key(&spec.name) {
                warn!("Duplicate fixture '{}' skipped", spec.name);
                continue;
            }
            by_name.insert(spec.name.clone(), built.len());
            built.push(Fixture::new(
                spec,
                color_duration,
                fade_duration,
                settings.kick_duration_secs,
                now,
            ));
        }
        if built.is_empty() {
            return Err(CoreError::NoFixtures);
        }

        let mut board = Self {
            fixtures: built,
            by_name,
            palette,
            themes,
            active: None,
            arrangement: None,
            color_duration,
            fade_duration,
            intensity: 1.0,
            tempo: None,
            energy: None,
            very_low_updates: 0,
            resting: false,
            pre_rest_theme: None,
            rest_entries: 0,
            settings,
        };

        let initial = match board.settings.initial_theme.clone() {
            Some(name) => ThemeChoice::Named(name),
            None => ThemeChoice::Random,
        };
        let arrangement = board.settings.initial_arrangement;
        if !board.change_theme(initial, arrangement, now)
            && !board.change_theme(ThemeChoice::Random, arrangement, now)
        {
            warn!("No theme could be applied, fixtures stay dark until one is");
        }

        info!(
            "Board ready: {} fixture(s), {} color(s), {} theme(s)",
            board.fixtures.len(),
            board.palette.len(),
            board.themes.len()
        );
        Ok(board)
    }

    /// Animation settings
    pub fn settings(&self) -> &BoardSettings {
        &self.settings
    }

    /// All fixtures in configuration order
    pub fn fixtures(&self) -> &[Fixture] {
        &self.fixtures
    }

    /// Fixture by name
    pub fn fixture(&self, name: &str) -> Option<&Fixture> {
        self.by_name.get(name).map(|&i| &self.fixtures[i])
    }

    /// Number of fixtures
    pub fn fixture_count(&self) -> usize {
        self.fixtures.len()
    }

    /// Name of the active theme
    pub fn active_theme(&self) -> Option<&str> {
        self.active.as_ref().map(|t| t.name.as_str())
    }

    /// Arrangement of the active theme
    pub fn arrangement(&self) -> Option<Arrangement> {
        self.arrangement
    }

    /// Names of every configured theme
    pub fn theme_names(&self) -> impl Iterator<Item = &str> {
        self.themes.keys().map(String::as_str)
    }

    /// Sequence brightness multiplier
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// Whether rest mode is on
    pub fn is_resting(&self) -> bool {
        self.resting
    }

    /// How many times rest mode was entered
    pub fn rest_entries(&self) -> u32 {
        self.rest_entries
    }

    /// Last published tempo
    pub fn tempo(&self) -> Option<TempoEstimate> {
        self.tempo
    }

    /// Last global energy level
    pub fn energy(&self) -> Option<EnergyLevel> {
        self.energy
    }

    /// Current phase length
    pub fn color_duration(&self) -> f64 {
        self.color_duration
    }

    /// Current fade length
    pub fn fade_duration(&self) -> f64 {
        self.fade_duration
    }

    /// Flash every kick-responsive fixture. Returns how many flashed.
    pub fn activate_kick(&mut self, now: f64) -> usize {
        let kick: &[Rgb] = self.active.as_ref().map(|t| t.kick.as_slice()).unwrap_or_default();
        let mut flashed = 0;
        for fixture in &mut self.fixtures {
            fixture.trigger_kick(kick, now);
            if fixture.kick().active && fixture.kick().start == now {
                flashed += 1;
            }
        }
        flashed
    }

    /// Retime the sequence to `bpm`, one color per beat.
    ///
    /// With a known `last_beat` every phase is nudged toward the beat grid by
    /// `1 / transition_beats` of its offset.
    pub fn update_tempo(&mut self, bpm: f64, last_beat: Option<f64>, now: f64) {
        if !bpm.is_finite() || bpm <= 0.0 {
            return;
        }
        let beat = 60.0 / bpm;
        self.color_duration = beat;
        self.fade_duration = beat / 2.0;
        self.tempo = Some(TempoEstimate { bpm, last_beat });

        let transition = self.settings.transition_beats.max(1.0);
        let palette: &[Rgb] = self.active.as_ref().map(|t| t.sequence.as_slice()).unwrap_or_default();
        let last_beat = last_beat.filter(|t| t.is_finite());

        for fixture in &mut self.fixtures {
            fixture.set_timing(self.color_duration, self.fade_duration);
            let Some(last_beat) = last_beat else {
                continue;
            };
            let sequence = fixture.sequence_mut();
            if now >= sequence.natural_end() {
                let shift = beat_shift(now, last_beat, beat, transition);
                sequence.step(palette, now + shift);
            } else {
                let shift = beat_shift(sequence.natural_end(), last_beat, beat, transition);
                sequence.phase_start += shift;
            }
        }

        debug!(
            "Tempo {:.1} BPM: color {:.3}s, fade {:.3}s",
            bpm, self.color_duration, self.fade_duration
        );
    }

    /// Apply an energy classification: brightness and rest mode
    pub fn update_energy(&mut self, snapshot: &EnergySnapshot, now: f64) {
        self.energy = Some(snapshot.level);
        self.intensity = snapshot.intensity();
        for fixture in &mut self.fixtures {
            fixture.set_intensity(self.intensity);
        }

        if snapshot.level == EnergyLevel::VeryLow {
            self.very_low_updates = self.very_low_updates.saturating_add(1);
        } else {
            self.very_low_updates = 0;
        }

        if !self.resting && self.very_low_updates >= self.settings.rest_trigger_updates.max(1) {
            self.enter_rest(now);
        } else if self.resting && snapshot.level > EnergyLevel::VeryLow {
            self.leave_rest(now);
        }
    }

    /// Recompute every fixture's output color at `now`
    pub fn advance(&mut self, now: f64) {
        let palette: &[Rgb] = self.active.as_ref().map(|t| t.sequence.as_slice()).unwrap_or_default();
        for fixture in &mut self.fixtures {
            fixture.advance(palette, now);
        }
    }

    /// Switch theme and arrangement.
    ///
    /// Unknown themes, or themes without a usable sequence color, are logged
    /// and leave the current state untouched. Returns whether it switched.
    pub fn change_theme(
        &mut self,
        choice: ThemeChoice,
        arrangement: ArrangementChoice,
        now: f64,
    ) -> bool {
        let name = match choice {
            ThemeChoice::Named(name) => name,
            ThemeChoice::Random => match self.random_theme(None) {
                Some(name) => name,
                None => {
                    warn!("No theme configured");
                    return false;
                }
            },
        };

        let Some(theme) = self.themes.get(&name) else {
            warn!("Unknown theme '{}'", name);
            return false;
        };
        let Some(resolved) = ResolvedTheme::resolve(&name, theme, &self.palette) else {
            return false;
        };

        let arrangement = arrangement.pick();
        let count = self.fixtures.len();
        let colors = resolved.sequence.len();
        for (i, fixture) in self.fixtures.iter_mut().enumerate() {
            let start = arrangement.start_index(i, count, colors);
            fixture.reset_sequence(&resolved.sequence, start, now);
        }

        info!("Theme '{}' ({})", name, arrangement);
        self.active = Some(resolved);
        self.arrangement = Some(arrangement);
        true
    }

    /// Serializable view of the current state
    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            theme: self.active_theme().map(str::to_string),
            arrangement: self.arrangement,
            tempo: self.tempo,
            energy: self.energy,
            intensity: self.intensity,
            resting: self.resting,
            fixtures: self
                .fixtures
                .iter()
                .map(|f| FixtureSnapshot {
                    name: f.name().to_string(),
                    rgb: f.output(),
                    kick_active: f.kick().active,
                    sequence_index: f.sequence().index,
                })
                .collect(),
        }
    }

    fn random_theme(&self, exclude: Option<&str>) -> Option<String> {
        let names: Vec<&String> = self.themes.keys().collect();
        let candidates: Vec<&String> = names
            .iter()
            .copied()
            .filter(|name| Some(name.as_str()) != exclude)
            .collect();
        let pool = if candidates.is_empty() { names } else { candidates };
        pool.choose(&mut rand::rng()).map(|name| name.to_string())
    }

    fn enter_rest(&mut self, now: f64) {
        self.pre_rest_theme = self.active_theme().map(str::to_string);
        self.resting = true;
        self.rest_entries += 1;

        info!("Energy very low, entering rest mode");
        let arrangement = self.settings.initial_arrangement;
        if let Some(name) = self.settings.rest_theme.clone() {
            if self.change_theme(ThemeChoice::Named(name), arrangement, now) {
                return;
            }
        }
        if let Some(name) = self.random_theme(self.active_theme()) {
            self.change_theme(ThemeChoice::Named(name), arrangement, now);
        }
    }

    fn leave_rest(&mut self, now: f64) {
        self.resting = false;
        self.very_low_updates = 0;
        info!("Energy back, leaving rest mode");
        if let Some(name) = self.pre_rest_theme.take() {
            self.change_theme(ThemeChoice::Named(name), self.settings.initial_arrangement, now);
        }
    }
}

/// Offset to the nearest beat boundary from `t`, spread over `transition` beats
fn beat_shift(t: f64, last_beat: f64, beat: f64, transition: f64) -> f64 {
    let k = ((t - last_beat) / beat).round();
    let boundary = last_beat + k * beat;
    (boundary - t) / transition
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beat_shift() {
        // end 0.1 s after a boundary, corrected by a third
        let shift = beat_shift(10.6, 0.0, 0.5, 3.0);
        assert!((shift - (-0.1 / 3.0)).abs() < 1e-9);
        // already aligned
        assert!(beat_shift(10.5, 0.0, 0.5, 3.0).abs() < 1e-9);
        // just before a boundary moves forward
        assert!(beat_shift(10.45, 0.0, 0.5, 1.0) > 0.0);
    }

    #[test]
    fn test_empty_board_is_an_error() {
        let result = Board::new(
            Vec::new(),
            Palette::new(),
            ThemeSet::new(),
            BoardSettings::default(),
            0.0,
        );
        assert!(matches!(result, Err(CoreError::NoFixtures)));
    }
}
