pub mod beat_detector;
pub mod capture;
pub mod engine;
pub mod fft;
pub mod history;
pub mod key_estimator;
pub mod note;
pub mod pitch;
pub mod source;

pub use beat_detector::{BeatEstimator, BpmBucket, TempoEstimate};
pub use capture::MicrophoneSource;
pub use engine::{AnalysisEngine, AnalysisReport};
pub use fft::SpectrumAnalyzer;
pub use history::BoundedHistory;
pub use key_estimator::{Key, KeyEstimate, KeyEstimator, KeyVote, Mode};
pub use note::{frequency_to_note, NoteEvent, PitchClass};
pub use pitch::PitchEstimator;
pub use source::SampleFrameSource;

use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Analysis window length in samples. Only powers of two from 512 to 8192
/// are representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct BufferLength(usize);

impl BufferLength {
    pub const SUPPORTED: [usize; 5] = [512, 1024, 2048, 4096, 8192];

    pub fn new(samples: usize) -> Result<Self> {
        if Self::SUPPORTED.contains(&samples) {
            Ok(Self(samples))
        } else {
            Err(AnalysisError::InvalidConfiguration { requested: samples })
        }
    }

    pub fn samples(self) -> usize {
        self.0
    }

    /// Number of bins in the matching frequency-domain snapshot.
    pub fn frequency_bins(self) -> usize {
        self.0 / 2
    }
}

impl Default for BufferLength {
    fn default() -> Self {
        Self(2048)
    }
}

impl TryFrom<usize> for BufferLength {
    type Error = AnalysisError;

    fn try_from(samples: usize) -> Result<Self> {
        Self::new(samples)
    }
}

impl From<BufferLength> for usize {
    fn from(length: BufferLength) -> Self {
        length.0
    }
}

impl fmt::Display for BufferLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Supplier of analysis frames, polled once per tick.
///
/// Implementations copy their most recent window into caller-owned buffers so
/// the estimators can keep their own sampling buffers across ticks.
pub trait FrameSource {
    /// Fills `out` with normalized samples in [-1, 1]. `out` is expected to be
    /// `buffer_length()` long; shorter buffers receive the most recent samples.
    fn read_time_domain(&mut self, out: &mut [f32]);

    /// Fills `out` with byte magnitudes (0-255), `buffer_length() / 2` bins.
    fn read_frequency_domain(&mut self, out: &mut [u8]);

    fn sample_rate(&self) -> f32;

    fn buffer_length(&self) -> BufferLength;

    /// Reallocates the source's own buffers for the new length.
    fn reconfigure(&mut self, length: BufferLength) -> Result<()>;

    /// Takes a full owned snapshot of the current window.
    fn snapshot(&mut self) -> AudioFrame {
        let length = self.buffer_length();
        let mut time_domain = vec![0.0; length.samples()];
        let mut frequency_domain = vec![0; length.frequency_bins()];
        self.read_time_domain(&mut time_domain);
        self.read_frequency_domain(&mut frequency_domain);

        AudioFrame {
            time_domain,
            frequency_domain,
            sample_rate: self.sample_rate(),
            buffer_length: length,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub time_domain: Vec<f32>,
    pub frequency_domain: Vec<u8>,
    pub sample_rate: f32,
    pub buffer_length: BufferLength,
}

impl Default for AudioFrame {
    fn default() -> Self {
        let buffer_length = BufferLength::default();
        Self {
            time_domain: vec![0.0; buffer_length.samples()],
            frequency_domain: vec![0; buffer_length.frequency_bins()],
            sample_rate: 44100.0,
            buffer_length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_length_accepts_supported_sizes() {
        for &samples in &BufferLength::SUPPORTED {
            let length = BufferLength::new(samples).expect("supported size");
            assert_eq!(length.samples(), samples);
            assert_eq!(length.frequency_bins(), samples / 2);
        }
    }

    #[test]
    fn test_buffer_length_rejects_other_sizes() {
        for samples in [0, 256, 1000, 3000, 16384] {
            assert_eq!(
                BufferLength::new(samples),
                Err(AnalysisError::InvalidConfiguration { requested: samples })
            );
        }
    }

    #[test]
    fn test_buffer_length_serde() {
        let length: BufferLength = serde_json::from_str("4096").unwrap();
        assert_eq!(length.samples(), 4096);
        assert!(serde_json::from_str::<BufferLength>("4000").is_err());
        assert_eq!(serde_json::to_string(&length).unwrap(), "4096");
    }
}
