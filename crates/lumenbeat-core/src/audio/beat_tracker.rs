//! Autocorrelation beat tracker
//!
//! Slow tempo source working on several seconds of raw audio at once. The
//! onset envelope is the log-magnitude spectral flux per hop; its
//! autocorrelation over the lags of the allowed tempo range gives the beat
//! period, and a comb over the envelope gives the beat phase.

use super::spectrum::SpectralFrontEnd;
use super::tempo::TempoEstimate;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Beat tracker parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatTrackerConfig {
    /// FFT frame length
    pub frame_size: usize,
    /// Hop between frames
    pub hop_size: usize,
    /// Lowest accepted tempo
    pub min_bpm: f64,
    /// Highest accepted tempo
    pub max_bpm: f64,
    /// Audio needed before analysis (seconds)
    pub min_duration_secs: f64,
    /// Values below are doubled
    pub octave_low: f64,
    /// Values above are halved
    pub octave_high: f64,
}

impl Default for BeatTrackerConfig {
    fn default() -> Self {
        Self {
            frame_size: 1024,
            hop_size: 512,
            min_bpm: 60.0,
            max_bpm: 180.0,
            min_duration_secs: 4.0,
            octave_low: 90.0,
            octave_high: 150.0,
        }
    }
}

/// Tempo and beat phase from a buffer of recent audio
pub struct BeatTracker {
    sample_rate: u32,
    config: BeatTrackerConfig,
    front_end: SpectralFrontEnd,
    previous: Vec<f32>,
    envelope: Vec<f32>,
}

impl BeatTracker {
    /// Create a tracker for audio at `sample_rate`
    pub fn new(sample_rate: u32, config: BeatTrackerConfig) -> Self {
        let front_end = SpectralFrontEnd::new(sample_rate, config.frame_size);
        Self {
            sample_rate,
            previous: Vec::with_capacity(config.frame_size / 2 + 1),
            envelope: Vec::new(),
            front_end,
            config,
        }
    }

    /// Current configuration
    pub fn config(&self) -> &BeatTrackerConfig {
        &self.config
    }

    /// Analyze `samples`, the last of which was captured at `end_time`
    pub fn analyze(&mut self, samples: &[f32], end_time: f64) -> Option<TempoEstimate> {
        let sr = self.sample_rate as f64;
        let frame = self.config.frame_size;
        let hop = self.config.hop_size.max(1);
        if (samples.len() as f64) < self.config.min_duration_secs * sr || samples.len() < frame {
            return None;
        }

        self.build_envelope(samples);
        let n = self.envelope.len();
        let mean = self.envelope.iter().sum::<f32>() / n as f32;
        for value in &mut self.envelope {
            *value -= mean;
        }

        let frame_rate = sr / hop as f64;
        let min_lag = ((60.0 * frame_rate / self.config.max_bpm).ceil() as usize).max(1);
        let max_lag = ((60.0 * frame_rate / self.config.min_bpm).floor() as usize).min(n / 2);
        if min_lag >= max_lag {
            return None;
        }

        let mut best_lag = 0;
        let mut best_value = 0.0f32;
        for lag in min_lag..=max_lag {
            let value = self.autocorrelation(lag);
            if value > best_value {
                best_value = value;
                best_lag = lag;
            }
        }
        if best_lag == 0 || best_value <= 1e-9 {
            return None;
        }

        // parabolic refinement around the peak
        let lag = {
            let left = self.autocorrelation(best_lag - 1);
            let right = self.autocorrelation(best_lag + 1);
            let denom = left - 2.0 * best_value + right;
            let shift = if denom.abs() > f32::EPSILON {
                (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
            } else {
                0.0
            };
            best_lag as f64 + shift as f64
        };

        let raw = 60.0 * frame_rate / lag;
        let bpm = if raw < self.config.octave_low {
            raw * 2.0
        } else if raw > self.config.octave_high {
            raw / 2.0
        } else {
            raw
        };
        if !bpm.is_finite() || bpm < self.config.min_bpm || bpm > self.config.max_bpm {
            debug!("Beat tracker tempo {:.1} BPM out of bounds", bpm);
            return None;
        }

        let period = 60.0 * frame_rate / bpm;
        let last_frame = self.last_beat_frame(period);
        let start_time = end_time - samples.len() as f64 / sr;
        let last_beat = start_time + (last_frame as f64 * hop as f64 + frame as f64 / 2.0) / sr;

        debug!(
            "Beat tracker: {:.1} BPM (lag {:.2} frames), last beat {:.3}s",
            bpm, lag, last_beat
        );

        Some(TempoEstimate {
            bpm,
            last_beat: Some(last_beat),
        })
    }

    fn build_envelope(&mut self, samples: &[f32]) {
        let frame = self.config.frame_size;
        let hop = self.config.hop_size.max(1);
        self.envelope.clear();
        self.previous.clear();

        let mut start = 0;
        while start + frame <= samples.len() {
            let spectrum = self.front_end.analyze(&samples[start..start + frame]);
            let mut flux = 0.0f32;
            for (bin, &magnitude) in spectrum.magnitudes().iter().enumerate() {
                let log_mag = magnitude.ln_1p();
                if let Some(previous) = self.previous.get_mut(bin) {
                    flux += (log_mag - *previous).max(0.0);
                    *previous = log_mag;
                } else {
                    self.previous.push(log_mag);
                }
            }
            self.envelope.push(flux);
            start += hop;
        }
    }

    fn autocorrelation(&self, lag: usize) -> f32 {
        let n = self.envelope.len();
        if lag >= n {
            return 0.0;
        }
        let sum: f32 = self
            .envelope
            .iter()
            .zip(&self.envelope[lag..])
            .map(|(a, b)| a * b)
            .sum();
        sum / (n - lag) as f32
    }

    /// Index of the newest beat under the comb with the strongest phase
    fn last_beat_frame(&self, period: f64) -> usize {
        let n = self.envelope.len();
        let offsets = (period.round() as usize).clamp(1, n);

        let mut best_offset = 0;
        let mut best_sum = f32::NEG_INFINITY;
        for offset in 0..offsets {
            let mut sum = 0.0;
            let mut k = 0usize;
            loop {
                let index = (offset as f64 + k as f64 * period).round() as usize;
                if index >= n {
                    break;
                }
                sum += self.envelope[index];
                k += 1;
            }
            if sum > best_sum {
                best_sum = sum;
                best_offset = offset;
            }
        }

        let beats = ((n - 1) as f64 - best_offset as f64) / period;
        let last = (best_offset as f64 + beats.floor() * period).round() as usize;
        last.min(n - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const SR: u32 = 44100;

    /// Decaying 86 Hz pulses every `period` seconds over `secs` seconds
    fn pulses(period: f64, secs: f64, first: f64) -> Vec<f32> {
        let len = (secs * SR as f64) as usize;
        let mut out = vec![0.0f32; len];
        let mut beat = first;
        while beat < secs {
            let start = (beat * SR as f64) as usize;
            for i in 0..(SR as usize / 8) {
                if start + i >= len {
                    break;
                }
                let t = i as f32 / SR as f32;
                out[start + i] += 0.8 * (-t * 30.0).exp() * (2.0 * PI * 86.0 * t).sin();
            }
            beat += period;
        }
        out
    }

    fn beat_distance(t: f64, period: f64, first: f64) -> f64 {
        let phase = (t - first).rem_euclid(period);
        phase.min(period - phase)
    }

    #[test]
    fn test_too_short_buffer() {
        let mut tracker = BeatTracker::new(SR, BeatTrackerConfig::default());
        let audio = pulses(0.5, 2.0, 0.0);
        assert!(tracker.analyze(&audio, 2.0).is_none());
    }

    #[test]
    fn test_silence_gives_nothing() {
        let mut tracker = BeatTracker::new(SR, BeatTrackerConfig::default());
        let audio = vec![0.0f32; SR as usize * 6];
        assert!(tracker.analyze(&audio, 6.0).is_none());
    }

    #[test]
    fn test_tracks_120_bpm() {
        let mut tracker = BeatTracker::new(SR, BeatTrackerConfig::default());
        let audio = pulses(0.5, 8.0, 0.1);
        let estimate = tracker.analyze(&audio, 108.0).unwrap();

        assert!((estimate.bpm - 120.0).abs() < 2.0, "bpm = {}", estimate.bpm);
        let last = estimate.last_beat.unwrap();
        // buffer covers 100..108 s, beats at 100.1 + k/2
        assert!(last > 107.0 && last <= 108.0, "last beat = {}", last);
        assert!(beat_distance(last, 0.5, 100.1) < 0.05, "last beat = {}", last);
    }

    #[test]
    fn test_tracks_100_bpm() {
        let mut tracker = BeatTracker::new(SR, BeatTrackerConfig::default());
        let audio = pulses(0.6, 10.0, 0.0);
        let estimate = tracker.analyze(&audio, 10.0).unwrap();
        assert!((estimate.bpm - 100.0).abs() < 2.0, "bpm = {}", estimate.bpm);
    }
}
