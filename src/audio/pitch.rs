use super::{BufferLength, FrameSource};
use log::trace;

/// Below this RMS the buffer is treated as silence.
const SILENCE_RMS: f32 = 0.01;
/// Minimum lag score before a lag can be accepted as the period.
const GOOD_ENOUGH_CORRELATION: f32 = 0.9;
/// Fallback floor for an unrefined estimate.
const MIN_CORRELATION: f32 = 0.01;

/// Monophonic pitch detection by average magnitude difference over lags.
pub struct PitchEstimator {
    buffer: Vec<f32>,
    correlations: Vec<f32>,
}

impl PitchEstimator {
    pub fn new(window: BufferLength) -> Self {
        Self {
            buffer: vec![0.0; window.samples()],
            correlations: vec![0.0; window.frequency_bins()],
        }
    }

    pub fn window_size(&self) -> usize {
        self.buffer.len()
    }

    /// Reallocates the sampling buffer. No other state is touched.
    pub fn set_window_size(&mut self, window: BufferLength) {
        self.buffer = vec![0.0; window.samples()];
        self.correlations = vec![0.0; window.frequency_bins()];
    }

    /// Reads the current window from `source` into the internal buffer and
    /// estimates its fundamental.
    pub fn estimate_from(&mut self, source: &mut dyn FrameSource) -> Option<f32> {
        source.read_time_domain(&mut self.buffer);
        let sample_rate = source.sample_rate();
        autocorrelate(&self.buffer, sample_rate, &mut self.correlations)
    }

    /// Estimates the fundamental frequency of `time_domain`, or `None` when
    /// the signal is too quiet or has no clear period.
    pub fn estimate(&mut self, time_domain: &[f32], sample_rate: f32) -> Option<f32> {
        autocorrelate(time_domain, sample_rate, &mut self.correlations)
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|x| x * x).sum::<f32>() / samples.len() as f32).sqrt()
}

/// The search stops at the first peak above `GOOD_ENOUGH_CORRELATION`: the
/// first lag that no longer rises after an acceptance ends it. A later,
/// higher peak is never considered.
fn autocorrelate(buf: &[f32], sample_rate: f32, correlations: &mut Vec<f32>) -> Option<f32> {
    if rms(buf) < SILENCE_RMS || sample_rate <= 0.0 {
        return None;
    }

    let half = buf.len() / 2;
    if half < 3 {
        return None;
    }
    correlations.clear();
    correlations.resize(half, 0.0);
    correlations[0] = 1.0;

    let mut best_offset = 0;
    let mut best_correlation = 0.0f32;
    let mut last_correlation = 1.0f32;
    let mut found_good_correlation = false;

    for offset in 1..half {
        let distance: f32 = buf[..half]
            .iter()
            .zip(&buf[offset..offset + half])
            .map(|(a, b)| (a - b).abs())
            .sum();
        let correlation = 1.0 - distance / half as f32;
        correlations[offset] = correlation;

        if correlation > GOOD_ENOUGH_CORRELATION && correlation > last_correlation {
            found_good_correlation = true;
            if correlation > best_correlation {
                best_correlation = correlation;
                best_offset = offset;
            }
        } else if found_good_correlation {
            // Accepted lags rise strictly, so `offset == best_offset + 1` here.
            let period = best_offset as f32
                + parabolic_offset(
                    correlations[best_offset - 1],
                    correlations[best_offset],
                    correlations[best_offset + 1],
                );
            trace!(
                "pitch: lag {} (refined {:.3}) score {:.4}",
                best_offset,
                period,
                best_correlation
            );
            return Some(sample_rate / period);
        }
        last_correlation = correlation;
    }

    if best_correlation > MIN_CORRELATION {
        return Some(sample_rate / best_offset as f32);
    }
    None
}

/// Vertex of the parabola through three equally spaced points, relative to
/// the middle one, in the range [-0.5, 0.5].
fn parabolic_offset(left: f32, center: f32, right: f32) -> f32 {
    let curvature = left - 2.0 * center + right;
    if curvature.abs() < f32::EPSILON {
        return 0.0;
    }
    (0.5 * (left - right) / curvature).clamp(-0.5, 0.5)
}
