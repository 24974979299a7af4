//! RGB colors and the named palette

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 8-bit RGB triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    /// Red
    pub red: u8,
    /// Green
    pub green: u8,
    /// Blue
    pub blue: u8,
}

/// Named colors
pub type Palette = BTreeMap<String, Rgb>;

impl Rgb {
    /// Black
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    /// Construct from components
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Linear interpolation; `t` is clamped to `[0, 1]`
    pub fn lerp(self, to: Rgb, t: f32) -> Rgb {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        let mix = |a: u8, b: u8| {
            let a = a as f32;
            let b = b as f32;
            (a + (b - a) * t).round().clamp(0.0, 255.0) as u8
        };
        Rgb {
            red: mix(self.red, to.red),
            green: mix(self.green, to.green),
            blue: mix(self.blue, to.blue),
        }
    }

    /// Brightness scaling; `factor` is clamped to `[0, 1]`
    pub fn scale(self, factor: f32) -> Rgb {
        Rgb::BLACK.lerp(self, factor)
    }

    /// Components as an array
    pub fn to_array(self) -> [u8; 3] {
        [self.red, self.green, self.blue]
    }
}

impl From<(u8, u8, u8)> for Rgb {
    fn from((red, green, blue): (u8, u8, u8)) -> Self {
        Rgb::new(red, green, blue)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }
}
