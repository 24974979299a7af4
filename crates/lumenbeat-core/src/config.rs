//! Show configuration files
//!
//! A show directory holds:
//! - `fixtures.json`: fixtures by name (or a `{"fixtures": [...]}` list)
//! - `colors.json`: named RGB colors
//! - `themes.json`: named sequence/kick color lists
//! - `settings.json` (optional): everything else, every field defaulted
//!
//! Individual malformed entries are skipped with a warning so that one typo
//! does not take the whole show down.

use crate::audio::{ArbiterConfig, BeatTrackerConfig, EnergyConfig, KickDetectorConfig, TempoConfig};
use crate::board::{Board, BoardSettings, DmxAddresses, FixtureSpec, Palette, Theme, ThemeSet};
use crate::logging::LogConfig;
use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable overriding the show directory
pub const CONFIG_DIR_ENV: &str = "LUMENBEAT_CONFIG_DIR";

/// Show directory used when nothing else is given
pub const DEFAULT_CONFIG_DIR: &str = "show";

/// Number of DMX channels in a universe
const UNIVERSE_SIZE: usize = 512;

/// Art-Net output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtNetSettings {
    /// Destination `host:port`
    pub target: String,
    /// Universe number
    pub universe: u16,
    /// Maximum packets per second, 0 for unlimited
    pub refresh_hz: f64,
}

impl Default for ArtNetSettings {
    fn default() -> Self {
        Self {
            target: "255.255.255.255:6454".to_string(),
            universe: 0,
            refresh_hz: 40.0,
        }
    }
}

/// Capture devices and sample rates of the detector workers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Input device for kick detection, default device when unset
    pub kick_device: Option<String>,
    /// Input device for the beat tracker
    pub tempo_device: Option<String>,
    /// Input device for energy classification
    pub energy_device: Option<String>,
    /// Run the beat tracker next to the onset-based estimator
    pub beat_tracker: bool,
    /// Sample rate of the beat tracker stream
    pub tempo_sample_rate: u32,
    /// Audio analyzed per beat tracker pass (seconds)
    pub beat_window_secs: f64,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            kick_device: None,
            tempo_device: None,
            energy_device: None,
            beat_tracker: true,
            tempo_sample_rate: 44100,
            beat_window_secs: 8.0,
        }
    }
}

/// Contents of `settings.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowSettings {
    /// Art-Net output
    pub artnet: ArtNetSettings,
    /// Control loop period
    pub control_period_ms: u64,
    /// Seconds between status log lines, 0 disables them
    pub status_interval_secs: f64,
    /// Capture devices
    pub audio: AudioSettings,
    /// Kick detector
    pub kick: KickDetectorConfig,
    /// Onset-based tempo estimator
    pub tempo: TempoConfig,
    /// Autocorrelation beat tracker
    pub beat_tracker: BeatTrackerConfig,
    /// Tempo source arbitration
    pub arbiter: ArbiterConfig,
    /// Energy classifier
    pub energy: EnergyConfig,
    /// Animation
    pub board: BoardSettings,
    /// Logging
    pub log: LogConfig,
}

impl Default for ShowSettings {
    fn default() -> Self {
        Self {
            artnet: ArtNetSettings::default(),
            control_period_ms: 1,
            status_interval_secs: 10.0,
            audio: AudioSettings::default(),
            kick: KickDetectorConfig::default(),
            tempo: TempoConfig::default(),
            beat_tracker: BeatTrackerConfig::default(),
            arbiter: ArbiterConfig::default(),
            energy: EnergyConfig::default(),
            board: BoardSettings::default(),
            log: LogConfig::default(),
        }
    }
}

impl ShowSettings {
    /// Read `settings.json` from a show directory, defaults when it is missing
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let settings: Self = match read_optional(&dir.as_ref().join("settings.json"))? {
            Some(text) => serde_json::from_str(&text)?,
            None => Self::default(),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the detectors cannot work with
    pub fn validate(&self) -> Result<()> {
        let tempo = &self.tempo;
        let usable = |bpm: f64| bpm.is_finite() && bpm > 0.0;
        if !usable(tempo.min_bpm) || !usable(tempo.max_bpm) || tempo.min_bpm > tempo.max_bpm {
            return Err(CoreError::Config(format!(
                "tempo range {}..{} BPM is not valid",
                tempo.min_bpm, tempo.max_bpm
            )));
        }
        Ok(())
    }
}

/// A complete show: fixtures, colors, themes and settings
#[derive(Debug, Clone)]
pub struct ShowConfig {
    /// Fixtures in file order
    pub fixtures: Vec<FixtureSpec>,
    /// Named colors
    pub colors: Palette,
    /// Named themes
    pub themes: ThemeSet,
    /// Everything else
    pub settings: ShowSettings,
    /// Directory the show was loaded from
    pub dir: PathBuf,
}

impl ShowConfig {
    /// Show directory from an explicit argument, the environment or the default
    pub fn resolve_dir(arg: Option<&str>) -> PathBuf {
        arg.map(PathBuf::from)
            .or_else(|| std::env::var_os(CONFIG_DIR_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR))
    }

    /// Load a show directory.
    ///
    /// `fixtures.json` is required and must yield at least one fixture.
    /// Missing colors/themes files leave those sets empty, a missing settings
    /// file means defaults.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        info!("Loading show from {:?}", dir);

        let fixtures_path = dir.join("fixtures.json");
        let fixtures_text = fs::read_to_string(&fixtures_path).map_err(|e| {
            CoreError::Config(format!("cannot read {}: {}", fixtures_path.display(), e))
        })?;
        let fixtures = parse_fixtures(&fixtures_text)?;

        let colors = match read_optional(&dir.join("colors.json"))? {
            Some(text) => parse_colors(&text)?,
            None => Palette::new(),
        };
        let themes = match read_optional(&dir.join("themes.json"))? {
            Some(text) => parse_themes(&text)?,
            None => ThemeSet::new(),
        };
        let settings = ShowSettings::load(dir)?;

        let config = Self {
            fixtures,
            colors,
            themes,
            settings,
            dir: dir.to_path_buf(),
        };
        config.check_theme_references();

        info!(
            "Show loaded: {} fixture(s), {} color(s), {} theme(s)",
            config.fixtures.len(),
            config.colors.len(),
            config.themes.len()
        );
        Ok(config)
    }

    /// Theme by name
    pub fn theme(&self, name: &str) -> Result<&Theme> {
        self.themes
            .get(name)
            .ok_or_else(|| CoreError::UnknownTheme(name.to_string()))
    }

    /// Build the board for this show at show time `now`
    pub fn build_board(&self, now: f64) -> Result<Board> {
        Board::new(
            self.fixtures.clone(),
            self.colors.clone(),
            self.themes.clone(),
            self.settings.board.clone(),
            now,
        )
    }

    fn check_theme_references(&self) {
        let board = &self.settings.board;
        for name in [&board.initial_theme, &board.rest_theme].into_iter().flatten() {
            if let Err(e) = self.theme(name) {
                warn!("{}; a random theme will be used instead", e);
            }
        }
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("{} not found, using none", path.display());
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    id: i64,
    #[serde(default)]
    default: Option<i64>,
    #[serde(default)]
    min: Option<i64>,
    #[serde(default)]
    max: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawFixture {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "type")]
    fixture_type: Option<String>,
    #[serde(default)]
    manufacturer: Option<String>,
    dmx_address: i64,
    #[serde(default)]
    channel_count: Option<u32>,
    #[serde(default)]
    kick_respond: bool,
    #[serde(default)]
    channels: BTreeMap<String, RawChannel>,
}

impl RawFixture {
    fn into_spec(self, fallback_name: Option<&str>) -> std::result::Result<FixtureSpec, String> {
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| fallback_name.map(str::to_string))
            .ok_or_else(|| "fixture without a name".to_string())?;

        if !(1..=UNIVERSE_SIZE as i64).contains(&self.dmx_address) {
            return Err(format!(
                "fixture '{}': dmx_address {} outside 1..=512",
                name, self.dmx_address
            ));
        }
        let base = (self.dmx_address - 1) as usize;

        let mut addresses = DmxAddresses::default();
        let mut dimmer_value = 255u8;
        for (channel_name, channel) in &self.channels {
            if channel.id < 1 {
                warn!(
                    "Fixture '{}': channel '{}' has invalid id {}, ignored",
                    name, channel_name, channel.id
                );
                continue;
            }
            if let Some(count) = self.channel_count {
                if channel.id > count as i64 {
                    warn!(
                        "Fixture '{}': channel '{}' id {} beyond channel_count {}",
                        name, channel_name, channel.id, count
                    );
                }
            }
            let address = base + (channel.id - 1) as usize;
            if address >= UNIVERSE_SIZE {
                warn!(
                    "Fixture '{}': channel '{}' lands on address {} outside the universe",
                    name,
                    channel_name,
                    address + 1
                );
            }

            match channel_name.to_ascii_lowercase().as_str() {
                "dimmer" => {
                    addresses.dimmer = Some(address);
                    let low = channel.min.unwrap_or(0).clamp(0, 255);
                    let high = channel.max.unwrap_or(255).clamp(low, 255);
                    dimmer_value = channel.default.unwrap_or(255).clamp(low, high) as u8;
                }
                "red" => addresses.red = Some(address),
                "green" => addresses.green = Some(address),
                "blue" => addresses.blue = Some(address),
                other => debug!("Fixture '{}': channel '{}' not driven", name, other),
            }
        }

        if addresses.red.is_none() && addresses.green.is_none() && addresses.blue.is_none() {
            warn!("Fixture '{}' has no color channel", name);
        }

        Ok(FixtureSpec {
            name,
            addresses,
            dimmer_value,
            kick_respond: self.kick_respond,
            fixture_type: self.fixture_type,
            manufacturer: self.manufacturer,
        })
    }
}

/// Parse `fixtures.json`. Fails when the text is not JSON or no fixture is
/// usable.
pub fn parse_fixtures(text: &str) -> Result<Vec<FixtureSpec>> {
    let value: Value = serde_json::from_str(text)?;

    let entries: Vec<(Option<String>, Value)> = match value {
        Value::Object(mut map) if map.get("fixtures").is_some_and(Value::is_array) => {
            match map.remove("fixtures") {
                Some(Value::Array(list)) => list.into_iter().map(|v| (None, v)).collect(),
                _ => Vec::new(),
            }
        }
        Value::Object(map) => map.into_iter().map(|(k, v)| (Some(k), v)).collect(),
        Value::Array(list) => list.into_iter().map(|v| (None, v)).collect(),
        _ => {
            return Err(CoreError::Config(
                "fixtures.json must be an object or a list".to_string(),
            ))
        }
    };

    let mut fixtures: Vec<FixtureSpec> = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        let label = key.clone().unwrap_or_else(|| "<unnamed>".to_string());
        let raw: RawFixture = match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Skipping fixture '{}': {}", label, e);
                continue;
            }
        };
        match raw.into_spec(key.as_deref()) {
            Ok(spec) if fixtures.iter().any(|f| f.name == spec.name) => {
                warn!("Skipping duplicate fixture '{}'", spec.name);
            }
            Ok(spec) => fixtures.push(spec),
            Err(reason) => warn!("Skipping fixture '{}': {}", label, reason),
        }
    }

    if fixtures.is_empty() {
        return Err(CoreError::NoFixtures);
    }
    Ok(fixtures)
}

/// Parse `colors.json`, skipping malformed colors
pub fn parse_colors(text: &str) -> Result<Palette> {
    parse_named(text, "color")
}

/// Parse `themes.json`, skipping malformed themes
pub fn parse_themes(text: &str) -> Result<ThemeSet> {
    parse_named(text, "theme")
}

fn parse_named<T: serde::de::DeserializeOwned>(
    text: &str,
    kind: &str,
) -> Result<BTreeMap<String, T>> {
    let map: serde_json::Map<String, Value> = serde_json::from_str(text)?;
    let mut out = BTreeMap::new();
    for (name, value) in map {
        match serde_json::from_value::<T>(value) {
            Ok(item) => {
                out.insert(name, item);
            }
            Err(e) => warn!("Skipping {} '{}': {}", kind, name, e),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Rgb;

    const FIXTURES: &str = r#"{
        "par1": {
            "name": "par1",
            "type": "PAR",
            "manufacturer": "Acme",
            "dmx_address": 1,
            "channel_count": 4,
            "kick_respond": true,
            "channels": {
                "Dimmer": {"id": 1, "default": 200},
                "red": {"id": 2},
                "green": {"id": 3},
                "blue": {"id": 4}
            }
        },
        "bar": {
            "dmx_address": 10,
            "channels": {"red": {"id": 1}, "green": {"id": 2}, "blue": {"id": 3}, "strobe": {"id": 4}}
        },
        "broken": {"dmx_address": "ten"},
        "outside": {"dmx_address": 600, "channels": {}}
    }"#;

    #[test]
    fn test_parse_fixture_map() {
        let fixtures = parse_fixtures(FIXTURES).unwrap();
        assert_eq!(fixtures.len(), 2);

        let par = fixtures.iter().find(|f| f.name == "par1").unwrap();
        assert_eq!(par.addresses.dimmer, Some(0));
        assert_eq!(par.addresses.red, Some(1));
        assert_eq!(par.addresses.blue, Some(3));
        assert_eq!(par.dimmer_value, 200);
        assert!(par.kick_respond);
        assert_eq!(par.fixture_type.as_deref(), Some("PAR"));

        let bar = fixtures.iter().find(|f| f.name == "bar").unwrap();
        assert_eq!(bar.addresses.red, Some(9));
        assert_eq!(bar.addresses.dimmer, None);
        assert!(!bar.kick_respond);
        assert_eq!(bar.dimmer_value, 255);
    }

    #[test]
    fn test_parse_fixture_list_form() {
        let text = r#"{"fixtures": [
            {"name": "a", "dmx_address": 1, "channels": {"red": {"id": 1}}},
            {"dmx_address": 5, "channels": {"red": {"id": 1}}}
        ]}"#;
        let fixtures = parse_fixtures(text).unwrap();
        assert_eq!(fixtures.len(), 1);
        assert_eq!(fixtures[0].name, "a");
    }

    #[test]
    fn test_no_usable_fixture_is_fatal() {
        assert!(matches!(parse_fixtures("{}"), Err(CoreError::NoFixtures)));
        assert!(matches!(
            parse_fixtures(r#"{"x": {"dmx_address": 0}}"#),
            Err(CoreError::NoFixtures)
        ));
        assert!(matches!(parse_fixtures("not json"), Err(CoreError::Json(_))));
    }

    #[test]
    fn test_parse_colors_skips_bad_entries() {
        let text = r#"{
            "red": {"red": 255, "green": 0, "blue": 0},
            "too_bright": {"red": 300, "green": 0, "blue": 0},
            "partial": {"red": 1}
        }"#;
        let colors = parse_colors(text).unwrap();
        assert_eq!(colors.len(), 1);
        assert_eq!(colors["red"], Rgb::from((255, 0, 0)));
    }

    #[test]
    fn test_parse_themes() {
        let text = r#"{
            "fire": {"sequence": ["red", "orange"], "kick": ["white"]},
            "calm": {"sequence": ["blue"]},
            "bad": {"sequence": "red"}
        }"#;
        let themes = parse_themes(text).unwrap();
        assert_eq!(themes.len(), 2);
        assert_eq!(themes["fire"].kick, vec!["white".to_string()]);
        assert!(themes["calm"].kick.is_empty());
    }

    #[test]
    fn test_settings_defaults_fill_gaps() {
        let settings: ShowSettings =
            serde_json::from_str(r#"{"artnet": {"universe": 3}, "board": {"kick_duration_secs": 0.1}}"#)
                .unwrap();
        assert_eq!(settings.artnet.universe, 3);
        assert_eq!(settings.artnet.target, "255.255.255.255:6454");
        assert_eq!(settings.board.kick_duration_secs, 0.1);
        assert_eq!(settings.board.transition_beats, 3.0);
        assert_eq!(settings.kick.refractory_secs, 0.12);
        assert_eq!(settings.control_period_ms, 1);
    }

    #[test]
    fn test_resolve_dir_prefers_argument() {
        assert_eq!(ShowConfig::resolve_dir(Some("/tmp/show")), PathBuf::from("/tmp/show"));
    }
}
