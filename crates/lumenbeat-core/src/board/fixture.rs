//! Fixture animation state
//!
//! Each fixture runs a sequence animation (hold, then fade into the next
//! palette color) and an optional kick overlay that flashes a kick color and
//! fades back into the sequence.

use super::color::Rgb;
use serde::{Deserialize, Serialize};

/// 0-based DMX channels of a fixture; `None` means "not present"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DmxAddresses {
    /// Master dimmer
    pub dimmer: Option<usize>,
    /// Red
    pub red: Option<usize>,
    /// Green
    pub green: Option<usize>,
    /// Blue
    pub blue: Option<usize>,
}

/// Static description of a fixture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureSpec {
    /// Unique name
    pub name: String,
    /// Channel addresses
    pub addresses: DmxAddresses,
    /// Value written to the dimmer channel
    pub dimmer_value: u8,
    /// Whether kicks flash this fixture
    pub kick_respond: bool,
    /// Fixture type label, informational
    #[serde(default)]
    pub fixture_type: Option<String>,
    /// Manufacturer, informational
    #[serde(default)]
    pub manufacturer: Option<String>,
}

impl FixtureSpec {
    /// RGB fixture with consecutive channels starting at `base` (0-based)
    pub fn rgb(name: impl Into<String>, base: usize, kick_respond: bool) -> Self {
        Self {
            name: name.into(),
            addresses: DmxAddresses {
                dimmer: None,
                red: Some(base),
                green: Some(base + 1),
                blue: Some(base + 2),
            },
            dimmer_value: 255,
            kick_respond,
            fixture_type: None,
            manufacturer: None,
        }
    }
}

/// Where a fixture is inside its sequence phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Showing the current color
    Hold,
    /// Crossfading into the next color
    Fading,
}

/// Sequence animation state
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceState {
    /// Position of `current` in the sequence palette
    pub index: usize,
    /// Color of this phase
    pub current: Rgb,
    /// Color faded into at the end of the phase
    pub next: Rgb,
    /// When the phase started
    pub phase_start: f64,
    /// Length of a whole phase
    pub color_duration: f64,
    /// Length of the fade at the end of the phase
    pub fade_duration: f64,
    /// Unscaled sequence color of the last advance
    pub output: Rgb,
}

impl SequenceState {
    fn new(color_duration: f64, fade_duration: f64, now: f64) -> Self {
        Self {
            index: 0,
            current: Rgb::BLACK,
            next: Rgb::BLACK,
            phase_start: now,
            color_duration,
            fade_duration: fade_duration.min(color_duration),
            output: Rgb::BLACK,
        }
    }

    /// When the phase ends without any correction
    pub fn natural_end(&self) -> f64 {
        self.phase_start + self.color_duration
    }

    /// Start of the fade
    pub fn fade_start(&self) -> f64 {
        self.phase_start + self.color_duration - self.fade_duration
    }

    /// Move to the next palette color, the new phase starting at `start`
    pub(crate) fn step(&mut self, palette: &[Rgb], start: f64) {
        if palette.is_empty() {
            return;
        }
        self.index = (self.index + 1) % palette.len();
        self.current = palette[self.index];
        self.next = palette[(self.index + 1) % palette.len()];
        self.phase_start = start;
    }

    /// Sequence color at `now`; `None` once the phase is over
    fn sample(&self, now: f64) -> Option<(Phase, Rgb)> {
        let elapsed = now - self.phase_start;
        if elapsed < 0.0 {
            // phase pushed into the future by beat alignment
            return Some((Phase::Hold, self.current));
        }
        if elapsed >= self.color_duration {
            return None;
        }
        let hold = self.color_duration - self.fade_duration;
        if elapsed < hold || self.fade_duration <= 0.0 {
            Some((Phase::Hold, self.current))
        } else {
            let progress = ((elapsed - hold) / self.fade_duration) as f32;
            Some((Phase::Fading, self.current.lerp(self.next, progress)))
        }
    }
}

/// Kick flash state
#[derive(Debug, Clone, PartialEq)]
pub struct KickOverlay {
    /// Whether a flash is running
    pub active: bool,
    /// When the flash started
    pub start: f64,
    /// Flash length
    pub duration: f64,
    /// Color at the start of the flash
    pub color: Rgb,
    /// Next entry of the kick palette
    pub palette_index: usize,
    /// Color shown by the overlay at the last advance
    pub output: Rgb,
}

impl KickOverlay {
    fn new(duration: f64) -> Self {
        Self {
            active: false,
            start: 0.0,
            duration,
            color: Rgb::BLACK,
            palette_index: 0,
            output: Rgb::BLACK,
        }
    }
}

/// A fixture with its animation state
#[derive(Debug, Clone)]
pub struct Fixture {
    spec: FixtureSpec,
    sequence: SequenceState,
    kick: KickOverlay,
    phase: Phase,
    intensity: f32,
    output: Rgb,
}

impl Fixture {
    pub(crate) fn new(
        spec: FixtureSpec,
        color_duration: f64,
        fade_duration: f64,
        kick_duration: f64,
        now: f64,
    ) -> Self {
        Self {
            spec,
            sequence: SequenceState::new(color_duration, fade_duration, now),
            kick: KickOverlay::new(kick_duration),
            phase: Phase::Hold,
            intensity: 1.0,
            output: Rgb::BLACK,
        }
    }

    /// Static description
    pub fn spec(&self) -> &FixtureSpec {
        &self.spec
    }

    /// Unique name
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// DMX channel addresses
    pub fn addresses(&self) -> &DmxAddresses {
        &self.spec.addresses
    }

    /// Value for the dimmer channel
    pub fn dimmer_value(&self) -> u8 {
        self.spec.dimmer_value
    }

    /// Whether kicks flash this fixture
    pub fn kick_respond(&self) -> bool {
        self.spec.kick_respond
    }

    /// Sequence animation state
    pub fn sequence(&self) -> &SequenceState {
        &self.sequence
    }

    /// Kick overlay state
    pub fn kick(&self) -> &KickOverlay {
        &self.kick
    }

    /// Sequence phase at the last advance
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Brightness multiplier of the sequence
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// Composited color of the last advance
    pub fn output(&self) -> Rgb {
        self.output
    }

    pub(crate) fn sequence_mut(&mut self) -> &mut SequenceState {
        &mut self.sequence
    }

    pub(crate) fn set_intensity(&mut self, intensity: f32) {
        self.intensity = intensity.clamp(0.0, 1.0);
    }

    pub(crate) fn set_timing(&mut self, color_duration: f64, fade_duration: f64) {
        self.sequence.color_duration = color_duration;
        self.sequence.fade_duration = fade_duration.min(color_duration);
    }

    /// Restart the sequence at palette position `index`
    pub(crate) fn reset_sequence(&mut self, palette: &[Rgb], index: usize, now: f64) {
        if palette.is_empty() {
            return;
        }
        let index = index % palette.len();
        self.sequence.index = index;
        self.sequence.current = palette[index];
        self.sequence.next = palette[(index + 1) % palette.len()];
        self.sequence.phase_start = now;
        self.kick.palette_index = 0;
        self.kick.active = false;
    }

    /// Start a kick flash with the next kick color
    pub(crate) fn trigger_kick(&mut self, kick_palette: &[Rgb], now: f64) {
        if !self.spec.kick_respond || kick_palette.is_empty() {
            return;
        }
        let index = self.kick.palette_index % kick_palette.len();
        self.kick.color = kick_palette[index];
        self.kick.palette_index = (index + 1) % kick_palette.len();
        self.kick.active = true;
        self.kick.start = now;
    }

    /// Recompute the output color at `now`
    pub(crate) fn advance(&mut self, palette: &[Rgb], now: f64) {
        let (phase, color) = match self.sequence.sample(now) {
            Some(sampled) => sampled,
            None => {
                let duration = self.sequence.color_duration;
                let natural_end = self.sequence.natural_end();
                // keep the grid unless the loop fell more than a phase behind
                let start = if now - natural_end > duration {
                    now
                } else {
                    natural_end
                };
                self.sequence.step(palette, start);
                self.sequence
                    .sample(now)
                    .unwrap_or((Phase::Hold, self.sequence.current))
            }
        };
        self.phase = phase;
        self.sequence.output = color;
        let sequence_color = color.scale(self.intensity);

        self.output = if self.kick.active {
            let elapsed = now - self.kick.start;
            if elapsed >= self.kick.duration || self.kick.duration <= 0.0 {
                self.kick.active = false;
                sequence_color
            } else {
                let progress = (elapsed.max(0.0) / self.kick.duration) as f32;
                self.kick.color.lerp(sequence_color, progress)
            }
        } else {
            sequence_color
        };
        self.kick.output = self.output;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgb = Rgb::new(255, 0, 0);
    const BLUE: Rgb = Rgb::new(0, 0, 255);
    const WHITE: Rgb = Rgb::new(255, 255, 255);

    fn fixture() -> Fixture {
        let mut fixture = Fixture::new(FixtureSpec::rgb("par", 0, true), 1.0, 0.5, 0.2, 0.0);
        fixture.reset_sequence(&[RED, BLUE], 0, 0.0);
        fixture
    }

    #[test]
    fn test_hold_fade_and_step() {
        let palette = [RED, BLUE];
        let mut f = fixture();

        f.advance(&palette, 0.0);
        assert_eq!(f.output(), RED);
        assert_eq!(f.phase(), Phase::Hold);

        f.advance(&palette, 0.75);
        assert_eq!(f.phase(), Phase::Fading);
        assert_eq!(f.output(), Rgb::new(128, 0, 128));

        f.advance(&palette, 1.0);
        assert_eq!(f.output(), BLUE);
        assert_eq!(f.sequence().index, 1);
        assert_eq!(f.sequence().phase_start, 1.0);
        assert_eq!(f.sequence().next, RED);
    }

    #[test]
    fn test_far_behind_restarts_at_now() {
        let palette = [RED, BLUE];
        let mut f = fixture();
        f.advance(&palette, 10.3);
        assert_eq!(f.sequence().phase_start, 10.3);
        assert_eq!(f.output(), BLUE);
    }

    #[test]
    fn test_future_phase_start_holds() {
        let palette = [RED, BLUE];
        let mut f = fixture();
        f.sequence_mut().phase_start = 0.4;
        f.advance(&palette, 0.1);
        assert_eq!(f.output(), RED);
        assert_eq!(f.phase(), Phase::Hold);
    }

    #[test]
    fn test_kick_overlay_decays_into_sequence() {
        let palette = [RED, BLUE];
        let mut f = fixture();
        f.trigger_kick(&[WHITE], 0.0);
        assert!(f.kick().active);

        f.advance(&palette, 0.0);
        assert_eq!(f.output(), WHITE);

        f.advance(&palette, 0.1);
        assert_eq!(f.output(), Rgb::new(255, 128, 128));
        assert!(f.kick().active);

        f.advance(&palette, 0.2);
        assert!(!f.kick().active);
        assert_eq!(f.output(), RED);
    }

    #[test]
    fn test_kick_palette_cycles_and_ignores_unresponsive() {
        let mut f = fixture();
        let kicks = [WHITE, BLUE];
        f.trigger_kick(&kicks, 0.0);
        assert_eq!(f.kick().color, WHITE);
        f.trigger_kick(&kicks, 0.5);
        assert_eq!(f.kick().color, BLUE);
        f.trigger_kick(&kicks, 1.0);
        assert_eq!(f.kick().color, WHITE);

        let mut quiet = Fixture::new(FixtureSpec::rgb("bar", 3, false), 1.0, 0.5, 0.2, 0.0);
        quiet.trigger_kick(&kicks, 0.0);
        assert!(!quiet.kick().active);
    }

    #[test]
    fn test_intensity_scales_sequence_only() {
        let palette = [WHITE];
        let mut f = fixture();
        f.reset_sequence(&palette, 0, 0.0);
        f.set_intensity(0.5);
        f.trigger_kick(&[RED], 0.0);
        f.advance(&palette, 0.0);
        assert_eq!(f.output(), RED);
        f.advance(&palette, 0.5);
        assert_eq!(f.output(), Rgb::new(128, 128, 128));
    }
}
