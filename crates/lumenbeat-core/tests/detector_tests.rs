use lumenbeat_core::audio::{
    ArbiterConfig, BlockAssembler, KickDetector, KickDetectorConfig, SampleRing, TempoArbiter,
    TempoConfig, TempoEstimator,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;

const SAMPLE_RATE: u32 = 44100;
const BLOCK: usize = 1024;
/// Kick every 22 blocks (~117.5 BPM)
const KICK_EVERY: usize = 22;

/// Continuous mono signal: noise floor plus a two-block 86 Hz burst every
/// `KICK_EVERY` blocks, starting at block `KICK_EVERY`
fn render(blocks: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let freq = SAMPLE_RATE as f32 / BLOCK as f32 * 2.0;
    (0..blocks * BLOCK)
        .map(|n| {
            let block = n / BLOCK;
            let noise = rng.random_range(-0.01f32..0.01);
            if block >= KICK_EVERY && block % KICK_EVERY < 2 {
                noise + 0.8 * (2.0 * PI * freq * n as f32 / SAMPLE_RATE as f32).sin()
            } else {
                noise
            }
        })
        .collect()
}

/// Feed `signal` in uneven callback-sized chunks through the assembler
fn detect(signal: &[f32]) -> Vec<f64> {
    let mut detector = KickDetector::new(KickDetectorConfig::default());
    let mut assembler = BlockAssembler::new(BLOCK);
    let block_secs = BLOCK as f64 / SAMPLE_RATE as f64;
    let mut onsets = Vec::new();
    let mut block_index = 0usize;

    for chunk in signal.chunks(441) {
        assembler.push(chunk, |block| {
            let t = block_index as f64 * block_secs;
            if let Some(onset) = detector.process_block(block, t) {
                onsets.push(onset.timestamp);
            }
            block_index += 1;
        });
    }
    onsets
}

#[test]
fn test_kick_to_tempo_pipeline() {
    let signal = render(KICK_EVERY * 16, 11);
    let onsets = detect(&signal);
    assert_eq!(onsets.len(), 15, "onsets: {:?}", onsets);

    let refractory = KickDetectorConfig::default().refractory_secs;
    for pair in onsets.windows(2) {
        assert!(pair[1] - pair[0] >= refractory);
    }

    let mut estimator = TempoEstimator::new(TempoConfig::default());
    for &t in &onsets {
        estimator.push_onset(t);
    }
    let now = *onsets.last().unwrap();
    let estimate = estimator.estimate(now).expect("tempo");

    let expected = 60.0 / (KICK_EVERY as f64 * BLOCK as f64 / SAMPLE_RATE as f64);
    assert!((estimate.bpm - expected).abs() < 0.5, "bpm = {}", estimate.bpm);
    assert_eq!(estimate.last_beat, Some(now));
}

#[test]
fn test_tempo_estimates_stay_in_bounds() {
    let config = TempoConfig::default();
    let mut rng = StdRng::seed_from_u64(3);
    let mut estimator = TempoEstimator::new(config.clone());
    let mut t = 0.0;
    for _ in 0..400 {
        t += rng.random_range(0.05..1.5);
        estimator.push_onset(t);
        if let Some(estimate) = estimator.estimate(t) {
            assert!(estimate.bpm > 0.0);
            assert!(estimate.bpm >= config.min_bpm && estimate.bpm <= config.max_bpm);
        }
    }
}

#[test]
fn test_constant_periods_converge() {
    for period in [0.4, 0.5, 0.6, 0.75] {
        let config = TempoConfig::default();
        let mut estimator = TempoEstimator::new(config.clone());
        let mut last = None;
        for i in 0..20 {
            let t = i as f64 * period;
            estimator.push_onset(t);
            if let Some(estimate) = estimator.estimate(t) {
                last = Some(estimate.bpm);
            }
        }
        let bpm = last.expect("estimate");
        let expected = config.octave_correct(60.0 / period);
        assert!((bpm - expected).abs() < 1e-6, "period {} gave {}", period, bpm);
    }
}

#[test]
fn test_arbiter_with_only_onset_source() {
    let mut estimator = TempoEstimator::new(TempoConfig::default());
    let mut arbiter = TempoArbiter::new(ArbiterConfig::default(), 60.0, 180.0);
    let mut published = None;
    for i in 0..16 {
        let t = i as f64 * 0.5;
        estimator.push_onset(t);
        if let Some(estimate) = arbiter.select(estimator.estimate(t), None) {
            published = Some(estimate.bpm);
        }
    }
    assert!((published.unwrap() - 120.0).abs() < 1e-6);
}

#[test]
fn test_sample_ring_feeds_snapshot_window() {
    let ring = SampleRing::new(SAMPLE_RATE as usize * 2);
    let writer = ring.clone();
    let signal = render(200, 5);
    for chunk in signal.chunks(512) {
        writer.push(chunk);
    }
    let window = ring.snapshot();
    assert_eq!(window.len(), SAMPLE_RATE as usize * 2);
    assert_eq!(window.last(), signal.last());
    assert_eq!(ring.total_written(), signal.len() as u64);
}
