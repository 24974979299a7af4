//! Audio analysis: spectral front end and the three detectors
//!
//! - [`kick`]: per-block kick/onset detection
//! - [`tempo`] and [`beat_tracker`]: BPM and beat phase, arbitrated
//! - [`energy`]: five-level loudness classification
//!
//! Everything here is pure computation over sample slices and `f64`
//! timestamps. Only [`capture`] touches an audio device.

pub mod beat_tracker;
#[cfg(feature = "audio")]
pub mod capture;
pub mod energy;
pub mod kick;
pub mod ring;
pub mod spectrum;
pub mod stats;
pub mod tempo;

pub use beat_tracker::{BeatTracker, BeatTrackerConfig};
#[cfg(feature = "audio")]
pub use capture::{list_input_devices, AudioCapture, InputDevice};
pub use energy::{
    EnergyBand, EnergyClassifier, EnergyConfig, EnergyLevel, EnergySnapshot, BAND_COUNT,
};
pub use kick::{KickDetector, KickDetectorConfig, OnsetEvent};
pub use ring::{BlockAssembler, SampleRing};
pub use spectrum::{hann_window, ButterworthLowPass, SpectralFrontEnd, Spectrum};
pub use tempo::{
    ArbiterConfig, TempoArbiter, TempoConfig, TempoEstimate, TempoEstimator, TempoSource,
};
