//! Kick/onset detection
//!
//! Each audio block goes through the spectral front end. Two detectors run in
//! parallel on the result:
//!
//! - the kick-band energy (60-120 Hz by default) normalized by the total
//!   spectral energy, exponentially smoothed and compared against
//!   `mean + k·std` of a rolling window of previous values;
//! - the half-wave rectified spectral flux of the band-limited spectrum,
//!   compared against its own rolling `mean + k·std`.
//!
//! Either one can fire, but only above an absolute energy floor and outside
//! the refractory period of the previous trigger.

use super::spectrum::{ButterworthLowPass, SpectralFrontEnd};
use super::stats::mean_std;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// A detected kick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnsetEvent {
    /// Show-clock timestamp in seconds
    pub timestamp: f64,
    /// How far the smoothed energy exceeded its baseline threshold
    pub strength: f32,
}

/// Configuration for [`KickDetector`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KickDetectorConfig {
    /// Sample rate of the capture stream
    pub sample_rate: u32,
    /// Samples per analysis block (power of two)
    pub block_size: usize,
    /// Kick fundamental range used for the energy ratio (Hz)
    pub kick_band: (f32, f32),
    /// Range used for the band-limited spectral flux (Hz)
    pub flux_band: (f32, f32),
    /// Weight of the previous smoothed value (0 = no smoothing)
    pub energy_smoothing: f32,
    /// Number of blocks in the energy baseline window
    pub energy_window: usize,
    /// Minimum baseline length before any trigger
    pub warmup_blocks: usize,
    /// Multiplier on the energy standard deviation
    pub energy_threshold_k: f32,
    /// Number of blocks in the flux baseline window
    pub flux_window: usize,
    /// Multiplier on the flux standard deviation
    pub flux_threshold_k: f32,
    /// Absolute floor on the smoothed normalized energy
    pub min_energy: f32,
    /// Minimum time between two triggers (seconds)
    pub refractory_secs: f64,
    /// Optional low-pass pre-filter cutoff
    pub lowpass_cutoff_hz: Option<f32>,
}

impl Default for KickDetectorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            block_size: 1024,
            kick_band: (60.0, 120.0),
            flux_band: (40.0, 150.0),
            energy_smoothing: 0.3,
            energy_window: 43,
            warmup_blocks: 13,
            energy_threshold_k: 1.5,
            flux_window: 8,
            flux_threshold_k: 2.0,
            min_energy: 0.1,
            refractory_secs: 0.12,
            lowpass_cutoff_hz: None,
        }
    }
}

/// Streaming kick detector, one spectrum per block
pub struct KickDetector {
    config: KickDetectorConfig,
    front_end: SpectralFrontEnd,
    lowpass: Option<ButterworthLowPass>,
    /// Scratch buffer for the filtered block
    filtered: Vec<f32>,
    /// Previous band-limited spectrum (for flux)
    previous_band: Vec<f32>,
    has_previous: bool,
    smoothed_energy: f32,
    energy_history: VecDeque<f32>,
    flux_history: VecDeque<f32>,
    last_trigger: Option<f64>,
    blocks_processed: u64,
    triggers: u64,
}

impl KickDetector {
    /// Create a detector with the given configuration
    pub fn new(config: KickDetectorConfig) -> Self {
        let front_end = SpectralFrontEnd::new(config.sample_rate, config.block_size);
        let lowpass = config
            .lowpass_cutoff_hz
            .map(|cutoff| ButterworthLowPass::new(config.sample_rate, cutoff));

        debug!(
            "KickDetector created: sample_rate={}, block_size={}, band={:?}, refractory={}s",
            config.sample_rate, config.block_size, config.kick_band, config.refractory_secs
        );

        Self {
            front_end,
            lowpass,
            filtered: Vec::with_capacity(config.block_size),
            previous_band: Vec::new(),
            has_previous: false,
            smoothed_energy: 0.0,
            energy_history: VecDeque::with_capacity(config.energy_window + 1),
            flux_history: VecDeque::with_capacity(config.flux_window + 1),
            last_trigger: None,
            blocks_processed: 0,
            triggers: 0,
            config,
        }
    }

    /// Current configuration
    pub fn config(&self) -> &KickDetectorConfig {
        &self.config
    }

    /// Duration of one block in seconds
    pub fn block_duration(&self) -> f64 {
        self.config.block_size as f64 / self.config.sample_rate as f64
    }

    /// Smoothed normalized kick-band energy of the last non-silent block
    pub fn smoothed_energy(&self) -> f32 {
        self.smoothed_energy
    }

    /// Timestamp of the last accepted trigger
    pub fn last_trigger(&self) -> Option<f64> {
        self.last_trigger
    }

    /// Number of accepted triggers so far
    pub fn trigger_count(&self) -> u64 {
        self.triggers
    }

    /// Analyze one block captured at `timestamp`.
    ///
    /// Returns the onset when the block triggers a kick.
    pub fn process_block(&mut self, block: &[f32], timestamp: f64) -> Option<OnsetEvent> {
        self.blocks_processed += 1;

        let input: &[f32] = match self.lowpass.as_mut() {
            Some(filter) => {
                self.filtered.clear();
                self.filtered.extend_from_slice(block);
                filter.process(&mut self.filtered);
                &self.filtered
            }
            None => block,
        };

        let spectrum = self.front_end.analyze(input);
        let (flux_low, flux_high) = self.config.flux_band;
        let band = spectrum.band(flux_low, flux_high);

        let flux = if self.has_previous && self.previous_band.len() == band.len() {
            band.iter()
                .zip(&self.previous_band)
                .map(|(current, previous)| (current - previous).max(0.0))
                .sum::<f32>()
        } else {
            0.0
        };
        self.previous_band.clear();
        self.previous_band.extend_from_slice(band);
        self.has_previous = true;

        let total = spectrum.total_energy();
        if !total.is_finite() || total <= f32::EPSILON {
            // nothing to normalize against
            return None;
        }

        let (kick_low, kick_high) = self.config.kick_band;
        let normalized = spectrum.band_energy(kick_low, kick_high) / total;
        let alpha = self.config.energy_smoothing.clamp(0.0, 0.99);
        self.smoothed_energy = alpha * self.smoothed_energy + (1.0 - alpha) * normalized;

        let energy_threshold = if self.energy_history.len() >= self.config.warmup_blocks.max(1) {
            mean_std(self.energy_history.iter().map(|&v| v as f64))
                .map(|(mean, std)| (mean + self.config.energy_threshold_k as f64 * std) as f32)
        } else {
            None
        };
        let flux_threshold = if self.flux_history.len() >= 3 {
            mean_std(self.flux_history.iter().map(|&v| v as f64))
                .map(|(mean, std)| (mean + self.config.flux_threshold_k as f64 * std) as f32)
        } else {
            None
        };

        push_bounded(&mut self.energy_history, self.smoothed_energy, self.config.energy_window);
        push_bounded(&mut self.flux_history, flux, self.config.flux_window);

        // still warming up
        let energy_threshold = energy_threshold?;

        let energy_hit = self.smoothed_energy > energy_threshold;
        let flux_hit = flux_threshold.is_some_and(|t| flux > t);
        if !(energy_hit || flux_hit) || self.smoothed_energy < self.config.min_energy {
            return None;
        }

        if let Some(last) = self.last_trigger {
            if timestamp - last < self.config.refractory_secs {
                return None;
            }
        }

        self.last_trigger = Some(timestamp);
        self.triggers += 1;
        let strength = (self.smoothed_energy / energy_threshold.max(1e-6)).min(10.0);

        trace!(
            "Kick at {:.3}s: energy={:.3} (thr {:.3}), flux={:.2} (thr {:?})",
            timestamp,
            self.smoothed_energy,
            energy_threshold,
            flux,
            flux_threshold
        );

        Some(OnsetEvent {
            timestamp,
            strength,
        })
    }

    /// Forget all history and filter state
    pub fn reset(&mut self) {
        if let Some(filter) = self.lowpass.as_mut() {
            filter.reset();
        }
        self.previous_band.clear();
        self.has_previous = false;
        self.smoothed_energy = 0.0;
        self.energy_history.clear();
        self.flux_history.clear();
        self.last_trigger = None;
        self.blocks_processed = 0;
        self.triggers = 0;

        debug!("KickDetector reset");
    }
}

fn push_bounded(history: &mut VecDeque<f32>, value: f32, capacity: usize) {
    history.push_back(value);
    while history.len() > capacity.max(1) {
        history.pop_front();
    }
}
