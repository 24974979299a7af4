//! Spectral front end shared by every detector
//!
//! [`SpectralFrontEnd`] turns a fixed-size block of mono samples into a
//! Hann-windowed magnitude spectrum. [`Spectrum`] is a borrowed view over the
//! latest result with helpers for band energies and band-limited slices.
//!
//! [`ButterworthLowPass`] is the optional pre-filter. It keeps its integrator
//! state between calls so consecutive blocks join without edge clicks.

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::ops::Range;
use std::sync::Arc;

/// Pre-compute a symmetric Hann window of `size` points
pub fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            let t = i as f32 / (size - 1) as f32;
            0.5 * (1.0 - (2.0 * PI * t).cos())
        })
        .collect()
}

/// Windowed real FFT over fixed-size blocks
pub struct SpectralFrontEnd {
    /// FFT instance
    fft: Arc<dyn Fft<f32>>,
    sample_rate: u32,
    block_size: usize,
    /// Hann window coefficients
    window: Vec<f32>,
    fft_buffer: Vec<Complex<f32>>,
    scratch_buffer: Vec<Complex<f32>>,
    /// Magnitudes for bins 0..=block_size/2
    magnitudes: Vec<f32>,
}

impl SpectralFrontEnd {
    /// Create a front end for `block_size` samples at `sample_rate`
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        let block_size = block_size.max(2);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(block_size);
        let scratch_len = fft.get_inplace_scratch_len();

        Self {
            fft,
            sample_rate,
            block_size,
            window: hann_window(block_size),
            fft_buffer: vec![Complex::new(0.0, 0.0); block_size],
            scratch_buffer: vec![Complex::new(0.0, 0.0); scratch_len],
            magnitudes: vec![0.0; block_size / 2 + 1],
        }
    }

    /// Block size in samples
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Width of one FFT bin in Hz
    pub fn bin_width(&self) -> f32 {
        self.sample_rate as f32 / self.block_size as f32
    }

    /// Window and transform one block.
    ///
    /// Blocks shorter than the configured size are zero-padded, longer ones
    /// are truncated. Non-finite samples are treated as silence.
    pub fn analyze(&mut self, block: &[f32]) -> Spectrum<'_> {
        for (i, (slot, w)) in self.fft_buffer.iter_mut().zip(&self.window).enumerate() {
            let sample = block
                .get(i)
                .copied()
                .filter(|s| s.is_finite())
                .unwrap_or(0.0);
            *slot = Complex::new(sample * w, 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.fft_buffer, &mut self.scratch_buffer);

        for (mag, bin) in self.magnitudes.iter_mut().zip(&self.fft_buffer) {
            *mag = bin.norm();
        }

        Spectrum {
            magnitudes: &self.magnitudes,
            bin_width: self.sample_rate as f32 / self.block_size as f32,
        }
    }
}

/// Borrowed view over one magnitude spectrum
#[derive(Debug, Clone, Copy)]
pub struct Spectrum<'a> {
    magnitudes: &'a [f32],
    bin_width: f32,
}

impl<'a> Spectrum<'a> {
    /// Wrap an existing magnitude slice
    pub fn from_magnitudes(magnitudes: &'a [f32], bin_width: f32) -> Self {
        Self {
            magnitudes,
            bin_width,
        }
    }

    /// All magnitudes, bin 0 (DC) first
    pub fn magnitudes(&self) -> &'a [f32] {
        self.magnitudes
    }

    /// Centre frequency of `bin` in Hz
    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.bin_width
    }

    /// Bins whose centre frequency falls inside `[low_hz, high_hz]`
    pub fn bin_range(&self, low_hz: f32, high_hz: f32) -> Range<usize> {
        if self.bin_width <= 0.0 || high_hz < low_hz {
            return 0..0;
        }
        let start = (low_hz.max(0.0) / self.bin_width).ceil() as usize;
        let end = ((high_hz / self.bin_width).floor() as usize + 1).min(self.magnitudes.len());
        if start >= end {
            0..0
        } else {
            start..end
        }
    }

    /// Magnitudes of the bins inside `[low_hz, high_hz]`
    pub fn band(&self, low_hz: f32, high_hz: f32) -> &'a [f32] {
        &self.magnitudes[self.bin_range(low_hz, high_hz)]
    }

    /// Sum of squared magnitudes inside `[low_hz, high_hz]`
    pub fn band_energy(&self, low_hz: f32, high_hz: f32) -> f32 {
        self.band(low_hz, high_hz).iter().map(|m| m * m).sum()
    }

    /// Sum of squared magnitudes over the whole spectrum
    pub fn total_energy(&self) -> f32 {
        self.magnitudes.iter().map(|m| m * m).sum()
    }
}

/// Damping of the two second-order sections of a 4th-order Butterworth
/// (k = 1/Q = 2cos(π/8) and 2cos(3π/8))
const BUTTERWORTH4_DAMPING: [f32; 2] = [1.847_759, 0.765_366_9];

/// One topology-preserving state-variable section, low-pass output only
#[derive(Debug, Clone, Copy)]
struct SvfSection {
    k: f32,
    ic1eq: f32,
    ic2eq: f32,
}

impl SvfSection {
    fn new(k: f32) -> Self {
        Self {
            k,
            ic1eq: 0.0,
            ic2eq: 0.0,
        }
    }

    #[inline]
    fn lowpass(&mut self, sample: f32, g: f32) -> f32 {
        let h = 1.0 / (1.0 + g * (g + self.k));
        let v3 = sample - self.ic2eq;
        let v1 = h * (self.ic1eq + g * v3);
        let v2 = self.ic2eq + g * v1;

        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;
        v2
    }
}

/// 4th-order Butterworth low-pass with state carried across blocks
#[derive(Debug, Clone)]
pub struct ButterworthLowPass {
    sections: [SvfSection; 2],
    g: f32,
    cutoff_hz: f32,
}

impl ButterworthLowPass {
    /// Create a low-pass at `cutoff_hz`, clamped below Nyquist
    pub fn new(sample_rate: u32, cutoff_hz: f32) -> Self {
        let nyquist = sample_rate as f32 / 2.0;
        let cutoff_hz = cutoff_hz.clamp(1.0, nyquist * 0.99);
        let g = (PI * cutoff_hz / sample_rate as f32).tan();

        Self {
            sections: [
                SvfSection::new(BUTTERWORTH4_DAMPING[0]),
                SvfSection::new(BUTTERWORTH4_DAMPING[1]),
            ],
            g,
            cutoff_hz,
        }
    }

    /// Cutoff frequency in Hz
    pub fn cutoff_hz(&self) -> f32 {
        self.cutoff_hz
    }

    /// Filter a block in place
    pub fn process(&mut self, block: &mut [f32]) {
        let g = self.g;
        for sample in block.iter_mut() {
            let input = if sample.is_finite() { *sample } else { 0.0 };
            let stage1 = self.sections[0].lowpass(input, g);
            *sample = self.sections[1].lowpass(stage1, g);
        }
    }

    /// Clear the filter memory
    pub fn reset(&mut self) {
        for section in &mut self.sections {
            section.ic1eq = 0.0;
            section.ic2eq = 0.0;
        }
    }
}
