//! Five-level energy classification
//!
//! A buffer of recent audio (2 s by default) is split into six frequency
//! bands. Each band energy is expressed as `10·log10(Σ|X|² + 1)` and the
//! global value is a weighted sum of the bands. Levels come from fixed
//! cutoffs until enough history exists, then from percentiles of the history
//! bounded below by fixed floors, so a quiet room never looks "loud".

use super::spectrum::SpectralFrontEnd;
use super::stats::percentile;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::debug;

/// Number of analysis bands
pub const BAND_COUNT: usize = 6;

/// Ordinal energy level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EnergyLevel {
    /// Below the first threshold
    VeryLow,
    /// Quiet
    Low,
    /// Moderate
    Medium,
    /// Loud
    High,
    /// Above the last threshold
    VeryHigh,
}

impl EnergyLevel {
    /// Level for `value` given four ascending thresholds
    pub fn from_thresholds(value: f32, thresholds: &[f32; 4]) -> Self {
        if value < thresholds[0] {
            EnergyLevel::VeryLow
        } else if value < thresholds[1] {
            EnergyLevel::Low
        } else if value < thresholds[2] {
            EnergyLevel::Medium
        } else if value < thresholds[3] {
            EnergyLevel::High
        } else {
            EnergyLevel::VeryHigh
        }
    }
}

impl fmt::Display for EnergyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnergyLevel::VeryLow => "very low",
            EnergyLevel::Low => "low",
            EnergyLevel::Medium => "medium",
            EnergyLevel::High => "high",
            EnergyLevel::VeryHigh => "very high",
        };
        f.write_str(name)
    }
}

/// Analysis band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnergyBand {
    /// 20-60 Hz
    SubBass,
    /// 60-250 Hz
    Bass,
    /// 250-500 Hz
    LowMid,
    /// 500-2000 Hz
    Mid,
    /// 2-6 kHz
    High,
    /// 6-11 kHz
    Presence,
}

impl EnergyBand {
    /// All bands in index order
    pub const ALL: [EnergyBand; BAND_COUNT] = [
        EnergyBand::SubBass,
        EnergyBand::Bass,
        EnergyBand::LowMid,
        EnergyBand::Mid,
        EnergyBand::High,
        EnergyBand::Presence,
    ];

    /// Frequency range in Hz
    pub fn range(self) -> (f32, f32) {
        match self {
            EnergyBand::SubBass => (20.0, 60.0),
            EnergyBand::Bass => (60.0, 250.0),
            EnergyBand::LowMid => (250.0, 500.0),
            EnergyBand::Mid => (500.0, 2000.0),
            EnergyBand::High => (2000.0, 6000.0),
            EnergyBand::Presence => (6000.0, 11000.0),
        }
    }

    /// Position in [`EnergyBand::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Result of one classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergySnapshot {
    /// Level per band, indexed like [`EnergyBand::ALL`]
    pub bands: [EnergyLevel; BAND_COUNT],
    /// Level of the weighted total
    pub level: EnergyLevel,
    /// Log energy per band
    pub band_energies: [f32; BAND_COUNT],
    /// Weighted log energy
    pub total_energy: f32,
}

impl EnergySnapshot {
    /// Level of one band
    pub fn band(&self, band: EnergyBand) -> EnergyLevel {
        self.bands[band.index()]
    }

    /// Bands at `Medium` or above
    pub fn active_bands(&self) -> usize {
        self.bands
            .iter()
            .filter(|level| **level >= EnergyLevel::Medium)
            .count()
    }

    /// Brightness multiplier derived from the number of active bands.
    ///
    /// Grows linearly up to two active bands, then quadratically to 1.0.
    pub fn intensity(&self) -> f32 {
        let n = self.active_bands() as f32;
        if n <= 2.0 {
            0.4 + 0.1 * n
        } else {
            let x = (n - 2.0) / 4.0;
            0.6 + 0.4 * x * x
        }
    }
}

/// Energy classifier parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyConfig {
    /// Sample rate of the capture stream
    pub sample_rate: u32,
    /// Length of the analyzed buffer (seconds)
    pub window_secs: f64,
    /// Seconds between two classifications
    pub analysis_interval_secs: f64,
    /// Values kept per band for the adaptive thresholds
    pub history_len: usize,
    /// History needed before the adaptive thresholds are used
    pub min_history: usize,
    /// Thresholds used while the history is short
    pub fixed_thresholds: [f32; 4],
    /// Lower bounds on the adaptive thresholds
    pub threshold_floors: [f32; 4],
    /// Percentiles of the history used as adaptive thresholds
    pub percentiles: [f32; 4],
    /// Weight of each band in the total
    pub band_weights: [f32; BAND_COUNT],
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            window_secs: 2.0,
            analysis_interval_secs: 1.0,
            history_len: 30,
            min_history: 8,
            fixed_thresholds: [10.0, 20.0, 30.0, 40.0],
            threshold_floors: [6.0, 12.0, 18.0, 24.0],
            percentiles: [10.0, 30.0, 50.0, 70.0],
            band_weights: [0.2, 0.25, 0.15, 0.15, 0.15, 0.1],
        }
    }
}

impl EnergyConfig {
    /// Samples held by the analysis buffer
    pub fn window_samples(&self) -> usize {
        (self.window_secs * self.sample_rate as f64).round() as usize
    }
}

/// Adaptive six-band energy classifier
pub struct EnergyClassifier {
    config: EnergyConfig,
    front_end: Option<SpectralFrontEnd>,
    band_history: [VecDeque<f32>; BAND_COUNT],
    total_history: VecDeque<f32>,
}

impl EnergyClassifier {
    /// Create a classifier with the given configuration
    pub fn new(config: EnergyConfig) -> Self {
        Self {
            config,
            front_end: None,
            band_history: Default::default(),
            total_history: VecDeque::new(),
        }
    }

    /// Current configuration
    pub fn config(&self) -> &EnergyConfig {
        &self.config
    }

    /// Number of classifications in the history
    pub fn history_len(&self) -> usize {
        self.total_history.len()
    }

    /// Classify a buffer of recent audio.
    ///
    /// Returns `None` when less than one second of audio is available.
    pub fn classify(&mut self, samples: &[f32]) -> Option<EnergySnapshot> {
        if samples.len() < self.config.sample_rate as usize {
            return None;
        }

        let rebuild = self
            .front_end
            .as_ref()
            .map_or(true, |fe| fe.block_size() != samples.len());
        if rebuild {
            self.front_end = Some(SpectralFrontEnd::new(self.config.sample_rate, samples.len()));
        }
        let front_end = self.front_end.as_mut()?;
        let spectrum = front_end.analyze(samples);

        let mut energies = [0.0f32; BAND_COUNT];
        for (energy, band) in energies.iter_mut().zip(EnergyBand::ALL) {
            let (low, high) = band.range();
            *energy = 10.0 * (spectrum.band_energy(low, high) + 1.0).log10();
        }

        Some(self.classify_energies(&energies))
    }

    /// Classify precomputed log band energies
    pub fn classify_energies(&mut self, energies: &[f32; BAND_COUNT]) -> EnergySnapshot {
        let energies = energies.map(|e| if e.is_finite() { e.max(0.0) } else { 0.0 });
        let total: f32 = energies
            .iter()
            .zip(self.config.band_weights)
            .map(|(e, w)| e * w)
            .sum();

        let mut bands = [EnergyLevel::VeryLow; BAND_COUNT];
        for (i, level) in bands.iter_mut().enumerate() {
            let thresholds = self.thresholds(&self.band_history[i]);
            *level = EnergyLevel::from_thresholds(energies[i], &thresholds);
        }
        let thresholds = self.thresholds(&self.total_history);
        let level = EnergyLevel::from_thresholds(total, &thresholds);

        let capacity = self.config.history_len.max(1);
        for (history, &energy) in self.band_history.iter_mut().zip(&energies) {
            push_bounded(history, energy, capacity);
        }
        push_bounded(&mut self.total_history, total, capacity);

        debug!("Energy {:.1} dB -> {} (bands {:?})", total, level, bands);

        EnergySnapshot {
            bands,
            level,
            band_energies: energies,
            total_energy: total,
        }
    }

    fn thresholds(&self, history: &VecDeque<f32>) -> [f32; 4] {
        if history.len() < self.config.min_history {
            return self.config.fixed_thresholds;
        }
        let values: Vec<f64> = history.iter().map(|&v| v as f64).collect();
        let mut thresholds = self.config.threshold_floors;
        for (threshold, pct) in thresholds.iter_mut().zip(self.config.percentiles) {
            if let Some(p) = percentile(&values, pct as f64) {
                *threshold = threshold.max(p as f32);
            }
        }
        thresholds
    }
}

fn push_bounded(history: &mut VecDeque<f32>, value: f32, capacity: usize) {
    history.push_back(value);
    while history.len() > capacity {
        history.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, amplitude: f32, secs: f32) -> Vec<f32> {
        let len = (22050.0 * secs) as usize;
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / 22050.0).sin())
            .collect()
    }

    #[test]
    fn test_requires_one_second() {
        let mut classifier = EnergyClassifier::new(EnergyConfig::default());
        assert!(classifier.classify(&sine(100.0, 0.5, 0.5)).is_none());
        assert!(classifier.classify(&sine(100.0, 0.5, 1.0)).is_some());
    }

    #[test]
    fn test_silence_is_very_low() {
        let mut classifier = EnergyClassifier::new(EnergyConfig::default());
        let snapshot = classifier.classify(&vec![0.0; 44100]).unwrap();
        assert_eq!(snapshot.level, EnergyLevel::VeryLow);
        assert!(snapshot.bands.iter().all(|l| *l == EnergyLevel::VeryLow));
        assert_eq!(snapshot.total_energy, 0.0);
        assert!((snapshot.intensity() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_loud_bass_is_very_high() {
        let mut classifier = EnergyClassifier::new(EnergyConfig::default());
        let snapshot = classifier.classify(&sine(120.0, 0.5, 2.0)).unwrap();
        assert_eq!(snapshot.band(EnergyBand::Bass), EnergyLevel::VeryHigh);
        assert!(snapshot.band_energies[1] > snapshot.band_energies[5]);
    }

    #[test]
    fn test_fixed_cutoffs_before_history() {
        let mut classifier = EnergyClassifier::new(EnergyConfig::default());
        let snapshot = classifier.classify_energies(&[25.0; 6]);
        assert!(snapshot.bands.iter().all(|l| *l == EnergyLevel::Medium));
        // weights sum to 1
        assert!((snapshot.total_energy - 25.0).abs() < 1e-4);
        assert_eq!(snapshot.level, EnergyLevel::Medium);
    }

    #[test]
    fn test_adaptive_thresholds() {
        let mut classifier = EnergyClassifier::new(EnergyConfig::default());
        for i in 0..10 {
            classifier.classify_energies(&[50.0 + i as f32; 6]);
        }
        assert_eq!(classifier.history_len(), 10);

        // 50 would be VeryHigh with fixed cutoffs, below the 10th percentile now
        let quiet = classifier.classify_energies(&[50.0; 6]);
        assert_eq!(quiet.level, EnergyLevel::VeryLow);

        let loud = classifier.classify_energies(&[70.0; 6]);
        assert_eq!(loud.level, EnergyLevel::VeryHigh);
    }

    #[test]
    fn test_floors_bound_thresholds() {
        let mut classifier = EnergyClassifier::new(EnergyConfig::default());
        for _ in 0..10 {
            classifier.classify_energies(&[0.0; 6]);
        }
        // history percentiles are 0, floors still apply
        let snapshot = classifier.classify_energies(&[5.0; 6]);
        assert_eq!(snapshot.level, EnergyLevel::VeryLow);
        let snapshot = classifier.classify_energies(&[9.0; 6]);
        assert_eq!(snapshot.level, EnergyLevel::Low);
        let snapshot = classifier.classify_energies(&[13.0; 6]);
        assert_eq!(snapshot.level, EnergyLevel::Medium);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut classifier = EnergyClassifier::new(EnergyConfig::default());
        for _ in 0..100 {
            classifier.classify_energies(&[20.0; 6]);
        }
        assert_eq!(classifier.history_len(), 30);
    }

    #[test]
    fn test_intensity_curve() {
        let snapshot = |active: usize| EnergySnapshot {
            bands: std::array::from_fn(|i| {
                if i < active {
                    EnergyLevel::High
                } else {
                    EnergyLevel::Low
                }
            }),
            level: EnergyLevel::Medium,
            band_energies: [0.0; 6],
            total_energy: 0.0,
        };
        assert!((snapshot(0).intensity() - 0.4).abs() < 1e-6);
        assert!((snapshot(2).intensity() - 0.6).abs() < 1e-6);
        assert!((snapshot(4).intensity() - 0.7).abs() < 1e-6);
        assert!((snapshot(6).intensity() - 1.0).abs() < 1e-6);
    }
}
