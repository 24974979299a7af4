//! Detector workers: kick, tempo and energy
//!
//! Each worker owns its capture stream, so a device that fails to open only
//! disables that one worker. The tempo and energy logic lives in small
//! pipelines that the workers drive and the tests feed directly.

use lumenbeat_core::audio::{
    BeatTracker, EnergyClassifier, EnergySnapshot, OnsetEvent, SampleRing, TempoArbiter,
    TempoEstimate, TempoEstimator,
};
use lumenbeat_core::ShowSettings;
use tracing::debug;

/// Onset estimator plus optional beat tracker, arbitrated
pub struct TempoPipeline {
    estimator: TempoEstimator,
    tracker: Option<(BeatTracker, SampleRing)>,
    arbiter: TempoArbiter,
    min_tracker_samples: usize,
}

impl TempoPipeline {
    /// Build from the show settings; `ring` feeds the beat tracker when given
    /// and holds audio at `sample_rate`
    pub fn new(settings: &ShowSettings, ring: Option<SampleRing>, sample_rate: u32) -> Self {
        let tracker_config = settings.beat_tracker.clone();
        let min_tracker_samples =
            (tracker_config.min_duration_secs * sample_rate as f64).ceil() as usize;

        Self {
            estimator: TempoEstimator::new(settings.tempo.clone()),
            tracker: ring.map(|ring| (BeatTracker::new(sample_rate, tracker_config), ring)),
            arbiter: TempoArbiter::new(
                settings.arbiter.clone(),
                settings.tempo.min_bpm,
                settings.tempo.max_bpm,
            ),
            min_tracker_samples,
        }
    }

    /// Record a detected onset
    pub fn push_onset(&mut self, onset: &OnsetEvent) {
        self.estimator.push_onset(onset.timestamp);
    }

    /// Whether the beat tracker takes part
    pub fn has_tracker(&self) -> bool {
        self.tracker.is_some()
    }

    /// Run both sources if an update is due and return the tempo to publish
    pub fn update(&mut self, now: f64) -> Option<TempoEstimate> {
        if !self.estimator.is_due(now) {
            return None;
        }

        let fast = self.estimator.estimate(now);
        let slow = match &mut self.tracker {
            Some((tracker, ring)) if ring.len() >= self.min_tracker_samples => {
                tracker.analyze(&ring.snapshot(), now)
            }
            _ => None,
        };
        debug!(
            "Tempo sources: onsets {:?}, tracker {:?}",
            fast.map(|e| e.bpm),
            slow.map(|e| e.bpm)
        );

        self.arbiter.select(fast, slow)
    }
}

/// Periodic energy classification of a rolling buffer
pub struct EnergyPipeline {
    classifier: EnergyClassifier,
    ring: SampleRing,
    next_due: f64,
}

impl EnergyPipeline {
    /// Classify the contents of `ring`
    pub fn new(classifier: EnergyClassifier, ring: SampleRing) -> Self {
        Self {
            classifier,
            ring,
            next_due: 0.0,
        }
    }

    /// Classify if an analysis interval elapsed and enough audio is buffered
    pub fn update(&mut self, now: f64) -> Option<EnergySnapshot> {
        if now < self.next_due {
            return None;
        }
        self.next_due = now + self.classifier.config().analysis_interval_secs;
        self.classifier.classify(&self.ring.snapshot())
    }
}

#[cfg(feature = "audio")]
pub use workers::{spawn_energy_worker, spawn_kick_worker, spawn_tempo_worker};

#[cfg(feature = "audio")]
mod workers {
    use super::{EnergyPipeline, TempoPipeline};
    use crate::app::worker::{RunFlag, Worker};
    use anyhow::Result;
    use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
    use lumenbeat_core::audio::{
        BlockAssembler, EnergyClassifier, EnergyConfig, InputDevice, KickDetector,
        KickDetectorConfig, OnsetEvent, SampleRing,
    };
    use lumenbeat_core::{ShowClock, ShowEvents, ShowSettings};
    use std::time::Duration;
    use tracing::{debug, info, warn};

    const POLL: Duration = Duration::from_millis(50);

    fn report_rate(input: &InputDevice, wanted: u32, what: &str) {
        if input.sample_rate() != wanted {
            warn!(
                "{} input '{}' runs at {} Hz instead of {} Hz, analysis follows the device",
                what,
                input.name(),
                input.sample_rate(),
                wanted
            );
        }
    }

    /// Kick detection runs inside the capture callback
    pub fn spawn_kick_worker<E>(
        settings: &ShowSettings,
        clock: ShowClock,
        events: E,
        onsets: Sender<OnsetEvent>,
    ) -> Result<Worker>
    where
        E: ShowEvents + 'static,
    {
        let config = settings.kick.clone();
        let device = settings.audio.kick_device.clone();

        Worker::spawn("kick-worker", move |flag: RunFlag| {
            let input = match InputDevice::open(device.as_deref(), config.sample_rate) {
                Ok(input) => input,
                Err(e) => {
                    warn!("Kick detection disabled: {}", e);
                    return;
                }
            };
            report_rate(&input, config.sample_rate, "Kick");
            let config = KickDetectorConfig {
                sample_rate: input.sample_rate(),
                ..config
            };
            let mut assembler = BlockAssembler::new(config.block_size);
            let mut detector = KickDetector::new(config);

            let capture = input.start(move |samples| {
                assembler.push(samples, |block| {
                    if let Some(onset) = detector.process_block(block, clock.now()) {
                        events.on_kick(onset.timestamp);
                        match onsets.try_send(onset) {
                            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                            Err(TrySendError::Full(_)) => debug!("Onset queue full, onset dropped"),
                        }
                    }
                });
            });
            let capture = match capture {
                Ok(capture) => capture,
                Err(e) => {
                    warn!("Kick detection disabled: {}", e);
                    return;
                }
            };

            while flag.sleep(POLL) {}
            capture.stop();
        })
    }

    /// Onset-interval estimation plus the optional beat tracker stream
    pub fn spawn_tempo_worker<E>(
        settings: &ShowSettings,
        clock: ShowClock,
        events: E,
        onsets: Receiver<OnsetEvent>,
    ) -> Result<Worker>
    where
        E: ShowEvents + 'static,
    {
        let settings = settings.clone();

        Worker::spawn("tempo-worker", move |flag: RunFlag| {
            let audio = &settings.audio;
            let mut capture = None;
            let mut ring = None;
            let mut sample_rate = audio.tempo_sample_rate;
            if audio.beat_tracker {
                let started = InputDevice::open(audio.tempo_device.as_deref(), sample_rate)
                    .and_then(|input| {
                        report_rate(&input, audio.tempo_sample_rate, "Beat tracker");
                        let rate = input.sample_rate();
                        let window = (audio.beat_window_secs * rate as f64) as usize;
                        let buffer = SampleRing::new(window.max(1));
                        let writer = buffer.clone();
                        let opened = input.start(move |samples| writer.push(samples))?;
                        Ok((opened, buffer, rate))
                    });
                match started {
                    Ok((opened, buffer, rate)) => {
                        capture = Some(opened);
                        ring = Some(buffer);
                        sample_rate = rate;
                    }
                    Err(e) => warn!("Beat tracker disabled, onsets only: {}", e),
                }
            }

            let mut pipeline = TempoPipeline::new(&settings, ring, sample_rate);
            info!(
                "Tempo estimation running ({})",
                if pipeline.has_tracker() {
                    "onsets + beat tracker"
                } else {
                    "onsets"
                }
            );

            let mut onsets_open = true;
            while flag.is_running() {
                while onsets_open {
                    match onsets.try_recv() {
                        Ok(onset) => pipeline.push_onset(&onset),
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => {
                            debug!("Onset channel closed");
                            onsets_open = false;
                        }
                    }
                }

                let now = clock.now();
                if let Some(estimate) = pipeline.update(now) {
                    events.on_tempo(&estimate, now);
                }
                flag.sleep(POLL);
            }

            if let Some(capture) = capture {
                capture.stop();
            }
        })
    }

    /// Rolling-buffer energy classification
    pub fn spawn_energy_worker<E>(
        settings: &ShowSettings,
        clock: ShowClock,
        events: E,
    ) -> Result<Worker>
    where
        E: ShowEvents + 'static,
    {
        let config = settings.energy.clone();
        let device = settings.audio.energy_device.clone();

        Worker::spawn("energy-worker", move |flag: RunFlag| {
            let capture = InputDevice::open(device.as_deref(), config.sample_rate).and_then(
                |input| {
                    report_rate(&input, config.sample_rate, "Energy");
                    let config = EnergyConfig {
                        sample_rate: input.sample_rate(),
                        ..config
                    };
                    let ring = SampleRing::new(config.window_samples().max(1));
                    let writer = ring.clone();
                    let capture = input.start(move |samples| writer.push(samples))?;
                    Ok((capture, config, ring))
                },
            );
            let (capture, config, ring) = match capture {
                Ok(started) => started,
                Err(e) => {
                    warn!("Energy classification disabled: {}", e);
                    return;
                }
            };

            let mut pipeline = EnergyPipeline::new(EnergyClassifier::new(config), ring);
            while flag.is_running() {
                let now = clock.now();
                if let Some(snapshot) = pipeline.update(now) {
                    debug!("Energy {} (total {:.1})", snapshot.level, snapshot.total_energy);
                    events.on_energy(&snapshot, now);
                }
                flag.sleep(POLL);
            }
            capture.stop();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumenbeat_core::audio::{EnergyConfig, EnergyLevel};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f32::consts::PI;

    fn onset(timestamp: f64) -> OnsetEvent {
        OnsetEvent {
            timestamp,
            strength: 2.0,
        }
    }

    #[test]
    fn test_tempo_pipeline_onsets_only() {
        let settings = ShowSettings::default();
        let mut pipeline = TempoPipeline::new(&settings, None, 44100);
        assert!(!pipeline.has_tracker());
        assert!(pipeline.update(0.0).is_none());

        for i in 0..12 {
            pipeline.push_onset(&onset(i as f64 * 0.5));
        }
        // update interval (2 s) since the empty update at 0.0
        assert!(pipeline.update(1.0).is_none());
        let estimate = pipeline.update(6.0).unwrap();
        assert!((estimate.bpm - 120.0).abs() < 1e-6);
        assert_eq!(estimate.last_beat, Some(5.5));
    }

    #[test]
    fn test_tempo_pipeline_waits_for_tracker_audio() {
        let settings = ShowSettings::default();
        let ring = SampleRing::new(44100 * 8);
        ring.push(&vec![0.0; 44100]);
        let mut pipeline = TempoPipeline::new(&settings, Some(ring), 44100);
        assert!(pipeline.has_tracker());

        // one second of silence is not enough for the tracker, onsets carry it
        for i in 0..8 {
            pipeline.push_onset(&onset(i as f64 * 0.5));
        }
        let estimate = pipeline.update(3.5).unwrap();
        assert!((estimate.bpm - 120.0).abs() < 1e-6);
    }

    /// Decaying 86 Hz pulses every `period` seconds
    fn pulses(sample_rate: u32, period: f64, secs: f64) -> Vec<f32> {
        let sr = sample_rate as f64;
        let len = (secs * sr) as usize;
        let mut out = vec![0.0f32; len];
        let mut beat = 0.1;
        while beat < secs {
            let start = (beat * sr) as usize;
            for i in 0..(sample_rate as usize / 8) {
                if start + i >= len {
                    break;
                }
                let t = i as f32 / sample_rate as f32;
                out[start + i] += 0.8 * (-t * 30.0).exp() * (2.0 * PI * 86.0 * t).sin();
            }
            beat += period;
        }
        out
    }

    #[test]
    fn test_tempo_pipeline_tracks_at_device_rate() {
        let settings = ShowSettings::default();
        let ring = SampleRing::new(48000 * 8);
        ring.push(&pulses(48000, 0.5, 8.0));

        // device gave 48 kHz instead of the configured 44.1 kHz
        let mut pipeline = TempoPipeline::new(&settings, Some(ring), 48000);
        let estimate = pipeline.update(8.0).unwrap();
        assert!((estimate.bpm - 120.0).abs() < 2.0, "bpm = {}", estimate.bpm);
    }

    #[test]
    fn test_energy_pipeline_respects_interval() {
        let config = EnergyConfig {
            sample_rate: 8000,
            ..Default::default()
        };
        let ring = SampleRing::new(config.window_samples());
        let mut pipeline = EnergyPipeline::new(EnergyClassifier::new(config), ring.clone());

        // not enough audio yet
        assert!(pipeline.update(0.0).is_none());

        let mut rng = StdRng::seed_from_u64(1);
        let noise: Vec<f32> = (0..16000)
            .map(|n| {
                0.5 * (2.0 * PI * 440.0 * n as f32 / 8000.0).sin() + rng.random_range(-0.1..0.1)
            })
            .collect();
        ring.push(&noise);

        assert!(pipeline.update(0.5).is_none());
        let snapshot = pipeline.update(1.0).unwrap();
        assert!(snapshot.total_energy > 0.0);
        assert!(pipeline.update(1.5).is_none());
        assert!(pipeline.update(2.0).is_some());
    }

    #[test]
    fn test_energy_pipeline_silence_is_very_low() {
        let config = EnergyConfig {
            sample_rate: 8000,
            ..Default::default()
        };
        let ring = SampleRing::new(config.window_samples());
        ring.push(&vec![0.0; config.window_samples()]);
        let mut pipeline = EnergyPipeline::new(EnergyClassifier::new(config), ring);
        let snapshot = pipeline.update(0.0).unwrap();
        assert_eq!(snapshot.level, EnergyLevel::VeryLow);
    }
}
