//! Lumenbeat Core - Audio Analysis and Fixture Animation
//!
//! This crate contains everything between the sound card and the DMX
//! universe, except the wire protocol:
//! - Spectral front end, kick detection, tempo estimation, energy levels
//! - The fixture board (themes, sequence animation, kick overlays)
//! - Show configuration and logging settings

#![warn(missing_docs)]

use thiserror::Error;

pub mod audio;
pub mod board;
pub mod clock;
pub mod config;
pub mod logging;

// --- Re-exports grouped by category ---

// Audio analysis
pub use audio::{
    ArbiterConfig, BeatTracker, BeatTrackerConfig, EnergyBand, EnergyClassifier, EnergyConfig,
    EnergyLevel, EnergySnapshot, KickDetector, KickDetectorConfig, OnsetEvent, SampleRing,
    SpectralFrontEnd, TempoArbiter, TempoConfig, TempoEstimate, TempoEstimator, TempoSource,
};

// Board
pub use board::{
    Arrangement, ArrangementChoice, Board, BoardSettings, BoardSnapshot, DmxAddresses, Fixture,
    FixtureSpec, Palette, Rgb, SharedBoard, ShowEvents, Theme, ThemeChoice, ThemeSet,
};

// Configuration, time & logging
pub use clock::ShowClock;
pub use config::{ArtNetSettings, AudioSettings, ShowConfig, ShowSettings};
pub use logging::LogConfig;

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid or unusable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// File access failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration file is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The show has no usable fixture
    #[error("No fixtures configured")]
    NoFixtures,

    /// A theme name that is not configured
    #[error("Unknown theme: {0}")]
    UnknownTheme(String),

    /// Audio device lookup or configuration failed
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    /// Audio stream could not be built or started
    #[error("Audio stream error: {0}")]
    AudioStream(String),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
