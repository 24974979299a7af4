//! Tempo estimation from kick onsets
//!
//! [`TempoEstimator`] turns the onset stream of the kick detector into a BPM
//! value: intervals are clustered around the modal inter-onset interval, the
//! median of the cluster gives the raw tempo, and a short BPM history with
//! hysteresis keeps the published value from jumping on a single bad window.
//!
//! [`TempoArbiter`] picks between this fast onset-based source and the slower
//! [`BeatTracker`](super::beat_tracker::BeatTracker).

use super::stats::{coefficient_of_variation, mean_std, median};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Most onsets kept regardless of retention
const MAX_ONSETS: usize = 512;

/// A published tempo
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoEstimate {
    /// Beats per minute
    pub bpm: f64,
    /// Timestamp of the most recent beat, if known
    pub last_beat: Option<f64>,
}

impl TempoEstimate {
    /// Seconds per beat
    pub fn beat_period(&self) -> f64 {
        60.0 / self.bpm
    }
}

/// Tempo estimator parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    /// Lowest accepted tempo
    pub min_bpm: f64,
    /// Highest accepted tempo
    pub max_bpm: f64,
    /// Onsets older than this are dropped (seconds)
    pub retention_secs: f64,
    /// Onsets required before estimating
    pub min_onsets: usize,
    /// Seconds between two estimates in the tempo worker
    pub update_interval_secs: f64,
    /// Histogram resolution for interval clustering
    pub histogram_bins: usize,
    /// Relative distance to the dominant interval still considered consistent
    pub cluster_tolerance: f64,
    /// Raw BPM values kept for the candidate median
    pub bpm_history: usize,
    /// Weight of the previous smoothed value on small changes
    pub smoothing_retention: f64,
    /// Relative change treated as a tempo jump
    pub large_change: f64,
    /// Relative spread the recent values may have for a jump to be accepted
    pub consistency_tolerance: f64,
    /// Values below are doubled
    pub octave_low: f64,
    /// Values above are halved
    pub octave_high: f64,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            min_bpm: 60.0,
            max_bpm: 180.0,
            retention_secs: 15.0,
            min_onsets: 6,
            update_interval_secs: 2.0,
            histogram_bins: 20,
            cluster_tolerance: 0.2,
            bpm_history: 8,
            smoothing_retention: 0.8,
            large_change: 0.35,
            consistency_tolerance: 0.2,
            octave_low: 90.0,
            octave_high: 150.0,
        }
    }
}

impl TempoConfig {
    /// Clamp `bpm` into the configured range
    pub fn clamp(&self, bpm: f64) -> f64 {
        bpm.clamp(self.min_bpm, self.max_bpm)
    }

    /// Whether `bpm` is a usable tempo for this configuration
    pub fn in_bounds(&self, bpm: f64) -> bool {
        bpm.is_finite() && bpm >= self.min_bpm && bpm <= self.max_bpm
    }

    /// Bring a raw tempo into the preferred octave (single step)
    pub fn octave_correct(&self, bpm: f64) -> f64 {
        if bpm < self.octave_low {
            bpm * 2.0
        } else if bpm > self.octave_high {
            bpm / 2.0
        } else {
            bpm
        }
    }
}

/// In-range onset intervals needed for a raw estimate
const MIN_VALID_INTERVALS: usize = 3;

/// Onset-interval tempo estimator with hysteresis
pub struct TempoEstimator {
    config: TempoConfig,
    onsets: VecDeque<f64>,
    bpm_history: VecDeque<f64>,
    smoothed: Option<f64>,
    last_update: Option<f64>,
}

impl TempoEstimator {
    /// Create an estimator with the given configuration
    pub fn new(config: TempoConfig) -> Self {
        Self {
            onsets: VecDeque::with_capacity(MAX_ONSETS),
            bpm_history: VecDeque::with_capacity(config.bpm_history + 1),
            smoothed: None,
            last_update: None,
            config,
        }
    }

    /// Current configuration
    pub fn config(&self) -> &TempoConfig {
        &self.config
    }

    /// Record an onset timestamp
    pub fn push_onset(&mut self, timestamp: f64) {
        if !timestamp.is_finite() {
            return;
        }
        self.onsets.push_back(timestamp);
        if self.onsets.len() > MAX_ONSETS {
            self.onsets.pop_front();
        }
    }

    /// Number of retained onsets
    pub fn onset_count(&self) -> usize {
        self.onsets.len()
    }

    /// Smoothed tempo, if one was ever accepted
    pub fn current_bpm(&self) -> Option<f64> {
        self.smoothed
    }

    /// Whether `update_interval_secs` elapsed since the last estimate
    pub fn is_due(&self, now: f64) -> bool {
        self.last_update
            .map_or(true, |last| now - last >= self.config.update_interval_secs)
    }

    /// Run one estimate at `now`.
    ///
    /// Returns a value only when a tempo was accepted by the hysteresis.
    pub fn estimate(&mut self, now: f64) -> Option<TempoEstimate> {
        self.last_update = Some(now);

        let horizon = now - self.config.retention_secs;
        while self.onsets.front().is_some_and(|&t| t < horizon) {
            self.onsets.pop_front();
        }
        if self.onsets.len() < self.config.min_onsets.max(2) {
            return None;
        }

        let raw = self.raw_bpm()?;
        let bpm = self.config.octave_correct(raw);
        if !self.config.in_bounds(bpm) {
            debug!("Tempo {:.1} BPM (raw {:.1}) out of bounds, ignored", bpm, raw);
            return None;
        }

        self.bpm_history.push_back(bpm);
        while self.bpm_history.len() > self.config.bpm_history.max(1) {
            self.bpm_history.pop_front();
        }

        let recent = self.recent_bpms();
        let candidate = if recent.len() < 2 {
            recent.iter().sum::<f64>() / recent.len() as f64
        } else {
            median(&recent)?
        };

        let accepted = match self.smoothed {
            None => candidate,
            Some(smoothed) => {
                let change = (candidate - smoothed).abs() / smoothed;
                if change <= self.config.large_change {
                    let r = self.config.smoothing_retention;
                    r * smoothed + (1.0 - r) * candidate
                } else {
                    let (_, spread) = mean_std(recent.iter().copied())?;
                    if spread < self.config.consistency_tolerance * candidate {
                        debug!("Tempo jump {:.1} -> {:.1} BPM accepted", smoothed, candidate);
                        candidate
                    } else {
                        debug!(
                            "Tempo jump to {:.1} BPM held (spread {:.1})",
                            candidate, spread
                        );
                        return None;
                    }
                }
            }
        };

        self.smoothed = Some(accepted);
        Some(TempoEstimate {
            bpm: accepted,
            last_beat: self.onsets.back().copied(),
        })
    }

    /// Forget onsets, history and the smoothed value
    pub fn reset(&mut self) {
        self.onsets.clear();
        self.bpm_history.clear();
        self.smoothed = None;
        self.last_update = None;
    }

    fn recent_bpms(&self) -> Vec<f64> {
        let skip = self.bpm_history.len().saturating_sub(3);
        self.bpm_history.iter().skip(skip).copied().collect()
    }

    /// Tempo from the dominant interval cluster, before octave correction
    fn raw_bpm(&self) -> Option<f64> {
        let min_interval = 60.0 / self.config.max_bpm;
        let max_interval = 60.0 / self.config.min_bpm;

        let intervals: Vec<f64> = self
            .onsets
            .iter()
            .zip(self.onsets.iter().skip(1))
            .map(|(a, b)| b - a)
            .filter(|i| *i >= min_interval && *i <= max_interval)
            .collect();
        if intervals.len() < MIN_VALID_INTERVALS {
            return None;
        }

        let dominant = dominant_interval(&intervals, self.config.histogram_bins);
        let tolerance = dominant * self.config.cluster_tolerance;
        let consistent: Vec<f64> = intervals
            .iter()
            .copied()
            .filter(|i| (i - dominant).abs() <= tolerance)
            .collect();
        if consistent.len() < 2 {
            return None;
        }

        let interval = median(&consistent)?;
        if interval <= 0.0 {
            return None;
        }
        Some(60.0 / interval)
    }
}

/// Centre of the most populated histogram bin
fn dominant_interval(intervals: &[f64], bins: usize) -> f64 {
    let low = intervals.iter().copied().fold(f64::INFINITY, f64::min);
    let high = intervals.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = high - low;
    if range <= 1e-9 {
        return low;
    }

    let bins = bins.max(1);
    let width = range / bins as f64;
    let mut counts = vec![0usize; bins];
    for &interval in intervals {
        let bin = (((interval - low) / width) as usize).min(bins - 1);
        counts[bin] += 1;
    }

    // first maximum wins
    let mut best = 0;
    for (bin, &count) in counts.iter().enumerate() {
        if count > counts[best] {
            best = bin;
        }
    }
    low + (best as f64 + 0.5) * width
}

/// Which tempo source an arbitrated value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TempoSource {
    /// Onset-interval estimator
    Onsets,
    /// Autocorrelation beat tracker
    BeatTracker,
}

/// Arbiter parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    /// History length at which a source reaches full confidence
    pub target_len: usize,
    /// Scores below this are not trusted
    pub min_score: f64,
    /// Relative difference above which the published value is smoothed
    pub change_threshold: f64,
    /// Weight of the previously published value when smoothing
    pub retention: f64,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            target_len: 6,
            min_score: 0.2,
            change_threshold: 0.05,
            retention: 0.7,
        }
    }
}

#[derive(Debug, Default)]
struct SourceTrack {
    history: VecDeque<f64>,
    latest: Option<TempoEstimate>,
}

impl SourceTrack {
    fn push(&mut self, estimate: TempoEstimate, capacity: usize) {
        self.history.push_back(estimate.bpm);
        while self.history.len() > capacity {
            self.history.pop_front();
        }
        self.latest = Some(estimate);
    }

    fn score(&self, target_len: usize) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        let values: Vec<f64> = self.history.iter().copied().collect();
        let stability = coefficient_of_variation(&values)
            .map_or(0.0, |cv| (-5.0 * cv).exp())
            .clamp(0.0, 1.0);
        let confidence = (self.history.len() as f64 / target_len as f64).clamp(0.0, 1.0);
        stability * confidence
    }
}

/// Chooses between the onset-based and the beat-tracker tempo
pub struct TempoArbiter {
    config: ArbiterConfig,
    min_bpm: f64,
    max_bpm: f64,
    onsets: SourceTrack,
    tracker: SourceTrack,
    last_source: Option<TempoSource>,
    published: Option<f64>,
}

impl TempoArbiter {
    /// Create an arbiter publishing values within `[min_bpm, max_bpm]`
    pub fn new(config: ArbiterConfig, min_bpm: f64, max_bpm: f64) -> Self {
        Self {
            config,
            min_bpm,
            max_bpm,
            onsets: SourceTrack::default(),
            tracker: SourceTrack::default(),
            last_source: None,
            published: None,
        }
    }

    /// Last published tempo
    pub fn published(&self) -> Option<f64> {
        self.published
    }

    /// Source of the last published tempo
    pub fn last_source(&self) -> Option<TempoSource> {
        self.last_source
    }

    /// Current score of a source
    pub fn score(&self, source: TempoSource) -> f64 {
        match source {
            TempoSource::Onsets => self.onsets.score(self.config.target_len),
            TempoSource::BeatTracker => self.tracker.score(self.config.target_len),
        }
    }

    /// Feed the latest value of each source and get the tempo to publish.
    ///
    /// Returns `None` when neither source produced a usable value.
    pub fn select(
        &mut self,
        fast: Option<TempoEstimate>,
        slow: Option<TempoEstimate>,
    ) -> Option<TempoEstimate> {
        let capacity = self.config.target_len.max(1);
        let usable = |e: &TempoEstimate| e.bpm.is_finite() && e.bpm > 0.0;
        let fast = fast.filter(usable);
        let slow = slow.filter(usable);
        if fast.is_none() && slow.is_none() {
            return None;
        }

        // when both report at once the onset source counts as most recent
        if let Some(estimate) = slow {
            self.tracker.push(estimate, capacity);
            self.last_source = Some(TempoSource::BeatTracker);
        }
        if let Some(estimate) = fast {
            self.onsets.push(estimate, capacity);
            self.last_source = Some(TempoSource::Onsets);
        }

        let fast_score = self.score(TempoSource::Onsets);
        let slow_score = self.score(TempoSource::BeatTracker);
        let trusted = fast_score.max(slow_score) >= self.config.min_score;

        let source = if trusted && fast_score > slow_score {
            TempoSource::Onsets
        } else if trusted && slow_score > fast_score {
            TempoSource::BeatTracker
        } else {
            self.last_source?
        };

        let chosen = match source {
            TempoSource::Onsets => self.onsets.latest,
            TempoSource::BeatTracker => self.tracker.latest,
        }?;

        let bpm = match self.published {
            Some(previous) if (chosen.bpm - previous).abs() / previous > self.config.change_threshold => {
                previous * self.config.retention + chosen.bpm * (1.0 - self.config.retention)
            }
            _ => chosen.bpm,
        }
        .clamp(self.min_bpm, self.max_bpm);

        debug!(
            "Tempo arbiter: {:?} chosen (scores {:.2}/{:.2}), publishing {:.1} BPM",
            source, fast_score, slow_score, bpm
        );

        self.published = Some(bpm);
        Some(TempoEstimate {
            bpm,
            last_beat: chosen.last_beat,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(estimator: &mut TempoEstimator, period: f64, count: usize, start: f64) -> f64 {
        let mut t = start;
        for _ in 0..count {
            estimator.push_onset(t);
            t += period;
        }
        t - period
    }

    #[test]
    fn test_needs_min_onsets() {
        let mut estimator = TempoEstimator::new(TempoConfig::default());
        let last = feed(&mut estimator, 0.5, 5, 0.0);
        assert!(estimator.estimate(last).is_none());
        estimator.push_onset(last + 0.5);
        assert!(estimator.estimate(last + 0.5).is_some());
    }

    #[test]
    fn test_needs_three_valid_intervals() {
        let config = TempoConfig {
            min_onsets: 3,
            ..Default::default()
        };
        let mut estimator = TempoEstimator::new(config);
        // one interval out of range, two valid
        for t in [0.0, 1.5, 2.0, 2.5] {
            estimator.push_onset(t);
        }
        assert!(estimator.estimate(2.5).is_none());

        estimator.push_onset(3.0);
        let bpm = estimator.estimate(3.0).unwrap().bpm;
        assert!((bpm - 120.0).abs() < 1e-6);
    }

    #[test]
    fn test_constant_period_gives_exact_tempo() {
        let mut estimator = TempoEstimator::new(TempoConfig::default());
        let last = feed(&mut estimator, 0.5, 12, 0.0);
        let estimate = estimator.estimate(last).unwrap();
        assert!((estimate.bpm - 120.0).abs() < 1e-6);
        assert_eq!(estimate.last_beat, Some(last));
    }

    #[test]
    fn test_octave_correction() {
        // 0.75 s = 80 BPM, doubled
        let mut slow = TempoEstimator::new(TempoConfig::default());
        let last = feed(&mut slow, 0.75, 10, 0.0);
        assert!((slow.estimate(last).unwrap().bpm - 160.0).abs() < 1e-6);

        // 0.35 s = 171.4 BPM, halved
        let mut fast = TempoEstimator::new(TempoConfig::default());
        let last = feed(&mut fast, 0.35, 12, 0.0);
        let bpm = fast.estimate(last).unwrap().bpm;
        assert!((bpm - 60.0 / 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_intervals_outside_range_give_nothing() {
        let mut estimator = TempoEstimator::new(TempoConfig::default());
        // 50 BPM is below the accepted interval range
        let last = feed(&mut estimator, 1.2, 10, 0.0);
        assert!(estimator.estimate(last).is_none());
        assert!(estimator.current_bpm().is_none());
    }

    #[test]
    fn test_old_onsets_are_dropped() {
        let mut estimator = TempoEstimator::new(TempoConfig::default());
        feed(&mut estimator, 0.5, 10, 0.0);
        assert!(estimator.estimate(60.0).is_none());
        assert_eq!(estimator.onset_count(), 0);
    }

    #[test]
    fn test_outlier_onset_is_ignored() {
        let mut estimator = TempoEstimator::new(TempoConfig::default());
        for t in [0.0, 0.5, 1.0, 1.5, 1.62, 2.0, 2.5, 3.0, 3.5] {
            estimator.push_onset(t);
        }
        let bpm = estimator.estimate(3.5).unwrap().bpm;
        assert!((bpm - 120.0).abs() < 1e-6, "bpm = {}", bpm);
    }

    #[test]
    fn test_small_change_is_smoothed() {
        let mut estimator = TempoEstimator::new(TempoConfig::default());
        let last = feed(&mut estimator, 0.5, 12, 0.0);
        estimator.estimate(last);

        // switch to 125 BPM, keeping only the new onsets in the window
        estimator.reset_onsets_for_test();
        let last = feed(&mut estimator, 0.48, 12, 100.0);
        let bpm = estimator.estimate(last).unwrap().bpm;
        assert!(bpm > 120.0 && bpm < 125.0, "bpm = {}", bpm);
    }

    #[test]
    fn test_is_due_respects_interval() {
        let mut estimator = TempoEstimator::new(TempoConfig::default());
        assert!(estimator.is_due(0.0));
        estimator.estimate(0.0);
        assert!(!estimator.is_due(1.0));
        assert!(estimator.is_due(2.0));
    }

    impl TempoEstimator {
        fn reset_onsets_for_test(&mut self) {
            self.onsets.clear();
        }
    }

    fn est(bpm: f64) -> Option<TempoEstimate> {
        Some(TempoEstimate {
            bpm,
            last_beat: None,
        })
    }

    #[test]
    fn test_arbiter_single_source_passes_through() {
        let mut arbiter = TempoArbiter::new(ArbiterConfig::default(), 60.0, 180.0);
        for _ in 0..5 {
            let published = arbiter.select(est(128.0), None).unwrap();
            assert!((published.bpm - 128.0).abs() < 1e-9);
        }
        assert_eq!(arbiter.last_source(), Some(TempoSource::Onsets));
        assert!(arbiter.select(None, None).is_none());
    }

    #[test]
    fn test_arbiter_prefers_stable_source() {
        let mut arbiter = TempoArbiter::new(ArbiterConfig::default(), 60.0, 180.0);
        let mut published = 0.0;
        for i in 0..12 {
            let jittery = if i % 2 == 0 { 100.0 } else { 140.0 };
            published = arbiter.select(est(jittery), est(120.0)).unwrap().bpm;
        }
        assert!(arbiter.score(TempoSource::BeatTracker) > arbiter.score(TempoSource::Onsets));
        assert!((published - 120.0).abs() < 1e-9, "published = {}", published);
    }

    #[test]
    fn test_arbiter_smooths_large_changes() {
        let mut arbiter = TempoArbiter::new(ArbiterConfig::default(), 60.0, 180.0);
        arbiter.select(est(100.0), None);
        let next = arbiter.select(est(150.0), None).unwrap().bpm;
        assert!((next - 115.0).abs() < 1e-9);
    }

    #[test]
    fn test_arbiter_clamps_and_ignores_zero() {
        let mut arbiter = TempoArbiter::new(ArbiterConfig::default(), 60.0, 180.0);
        assert!(arbiter.select(est(0.0), est(f64::NAN)).is_none());
        let published = arbiter.select(None, est(400.0)).unwrap().bpm;
        assert_eq!(published, 180.0);
        assert_eq!(arbiter.last_source(), Some(TempoSource::BeatTracker));
    }
}
