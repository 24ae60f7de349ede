use rustfft::{num_complex::Complex, FftPlanner};
use std::sync::Arc;

use super::BufferLength;

const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;
const SMOOTHING: f32 = 0.8;

/// Turns a time-domain window into smoothed byte magnitudes, one per bin up
/// to Nyquist.
pub struct SpectrumAnalyzer {
    fft_size: usize,
    fft: Arc<dyn rustfft::Fft<f32>>,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl SpectrumAnalyzer {
    pub fn new(length: BufferLength) -> Self {
        let fft_size = length.samples();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        Self {
            fft_size,
            fft,
            window: Self::hann_window(fft_size),
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            smoothed: vec![0.0; fft_size / 2],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    fn hann_window(size: usize) -> Vec<f32> {
        (0..size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32;
                0.5 * (1.0 - phase.cos())
            })
            .collect()
    }

    /// Transforms `time_domain` and writes byte magnitudes into `out`.
    /// Missing input samples are zero-padded; extra output bins are zeroed.
    pub fn analyze(&mut self, time_domain: &[f32], out: &mut [u8]) {
        let len = self.fft_size.min(time_domain.len());
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let sample = if i < len { time_domain[i] * self.window[i] } else { 0.0 };
            *slot = Complex::new(sample, 0.0);
        }

        self.fft.process(&mut self.scratch);

        let scale = 1.0 / self.fft_size as f32;
        for (smoothed, bin) in self.smoothed.iter_mut().zip(&self.scratch) {
            let magnitude = bin.norm() * scale;
            *smoothed = SMOOTHING * *smoothed + (1.0 - SMOOTHING) * magnitude;
            if !smoothed.is_finite() {
                *smoothed = 0.0;
            }
        }

        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.smoothed.get(i).map_or(0, |&m| Self::to_byte(m));
        }
    }

    fn to_byte(magnitude: f32) -> u8 {
        if magnitude <= 0.0 {
            return 0;
        }
        let db = 20.0 * magnitude.log10();
        let scaled = 255.0 * (db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS);
        scaled.clamp(0.0, 255.0) as u8
    }
}
