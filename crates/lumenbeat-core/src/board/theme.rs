//! Themes and the spatial arrangement of their colors

use super::color::{Palette, Rgb};
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// A theme as written in `themes.json`: color names, not values
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Theme {
    /// Colors cycled by the sequence animation
    pub sequence: Vec<String>,
    /// Colors cycled by kick flashes
    pub kick: Vec<String>,
}

/// Themes by name
pub type ThemeSet = BTreeMap<String, Theme>;

/// A theme with its colors looked up in the palette
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTheme {
    /// Theme name
    pub name: String,
    /// Sequence colors, never empty
    pub sequence: Vec<Rgb>,
    /// Kick colors, possibly empty
    pub kick: Vec<Rgb>,
}

impl ResolvedTheme {
    /// Resolve `theme` against `palette`, skipping unknown colors.
    ///
    /// Returns `None` when no sequence color is left.
    pub fn resolve(name: &str, theme: &Theme, palette: &Palette) -> Option<Self> {
        let lookup = |names: &[String]| -> Vec<Rgb> {
            names
                .iter()
                .filter_map(|color| {
                    let rgb = palette.get(color).copied();
                    if rgb.is_none() {
                        warn!("Theme '{}' uses unknown color '{}', skipped", name, color);
                    }
                    rgb
                })
                .collect()
        };

        let sequence = lookup(&theme.sequence);
        if sequence.is_empty() {
            warn!("Theme '{}' has no usable sequence color", name);
            return None;
        }
        Some(Self {
            name: name.to_string(),
            sequence,
            kick: lookup(&theme.kick),
        })
    }
}

/// Which theme to switch to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThemeChoice {
    /// A theme by name
    Named(String),
    /// Any theme
    Random,
}

/// How the starting sequence position is spread over the fixtures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arrangement {
    /// Every fixture starts on the first color
    AllSame,
    /// Even and odd fixtures start one color apart
    Alternating,
    /// The palette is spread from the first fixture to the last
    LeftToRight,
    /// The palette is spread from the last fixture to the first
    RightToLeft,
    /// Both ends share the first color, moving inwards
    SidesToCenter,
    /// The middle starts on the first color, moving outwards
    CenterToSides,
}

impl Arrangement {
    /// Every arrangement
    pub const ALL: [Arrangement; 6] = [
        Arrangement::AllSame,
        Arrangement::Alternating,
        Arrangement::LeftToRight,
        Arrangement::RightToLeft,
        Arrangement::SidesToCenter,
        Arrangement::CenterToSides,
    ];

    /// Starting palette index for fixture `index` out of `count`, with a
    /// palette of `colors` entries
    pub fn start_index(self, index: usize, count: usize, colors: usize) -> usize {
        if colors == 0 || count == 0 {
            return 0;
        }
        let index = index.min(count - 1);
        let mirrored = index.min(count - 1 - index);
        let half = (count + 1) / 2;
        let position = match self {
            Arrangement::AllSame => 0,
            Arrangement::Alternating => index % 2,
            Arrangement::LeftToRight => index * colors / count,
            Arrangement::RightToLeft => (count - 1 - index) * colors / count,
            Arrangement::SidesToCenter => mirrored * colors / half,
            Arrangement::CenterToSides => (half - 1 - mirrored) * colors / half,
        };
        position % colors
    }
}

impl fmt::Display for Arrangement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Arrangement::AllSame => "all same",
            Arrangement::Alternating => "alternating",
            Arrangement::LeftToRight => "left to right",
            Arrangement::RightToLeft => "right to left",
            Arrangement::SidesToCenter => "sides to center",
            Arrangement::CenterToSides => "center to sides",
        };
        f.write_str(name)
    }
}

/// A fixed arrangement or a random one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArrangementChoice {
    /// This arrangement
    Fixed(Arrangement),
    /// Pick one at random
    #[default]
    Random,
}

impl ArrangementChoice {
    /// Concrete arrangement for this choice
    pub fn pick(self) -> Arrangement {
        match self {
            ArrangementChoice::Fixed(arrangement) => arrangement,
            ArrangementChoice::Random => Arrangement::ALL
                .choose(&mut rand::rng())
                .copied()
                .unwrap_or(Arrangement::AllSame),
        }
    }
}

impl From<Arrangement> for ArrangementChoice {
    fn from(arrangement: Arrangement) -> Self {
        ArrangementChoice::Fixed(arrangement)
    }
}
