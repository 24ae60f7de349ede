use super::{BufferLength, FrameSource, SpectrumAnalyzer};
use crate::error::Result;
use log::info;
use std::collections::VecDeque;

/// A frame source over samples pushed by the caller: file playback, capture
/// callbacks, or synthetic test signals. Holds the most recent window only.
pub struct SampleFrameSource {
    sample_rate: f32,
    length: BufferLength,
    samples: VecDeque<f32>,
    window: Vec<f32>,
    spectrum: SpectrumAnalyzer,
}

impl SampleFrameSource {
    pub fn new(sample_rate: f32, length: BufferLength) -> Self {
        Self {
            sample_rate,
            length,
            samples: VecDeque::from(vec![0.0; length.samples()]),
            window: vec![0.0; length.samples()],
            spectrum: SpectrumAnalyzer::new(length),
        }
    }

    /// Appends samples, discarding whatever falls out of the window.
    /// Non-finite samples are stored as silence.
    pub fn push_samples(&mut self, samples: &[f32]) {
        let capacity = self.length.samples();
        let incoming = if samples.len() > capacity {
            &samples[samples.len() - capacity..]
        } else {
            samples
        };

        let overflow = (self.samples.len() + incoming.len()).saturating_sub(capacity);
        self.samples.drain(..overflow);
        self.samples.extend(
            incoming
                .iter()
                .map(|s| if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 }),
        );
    }

    fn refresh_window(&mut self) {
        self.window.clear();
        self.window.extend(self.samples.iter().copied());
    }
}

impl FrameSource for SampleFrameSource {
    fn read_time_domain(&mut self, out: &mut [f32]) {
        let available = self.samples.len();
        let take = out.len().min(available);
        let (padding, tail) = out.split_at_mut(out.len() - take);
        padding.fill(0.0);
        for (slot, &sample) in tail.iter_mut().zip(self.samples.iter().skip(available - take)) {
            *slot = sample;
        }
    }

    fn read_frequency_domain(&mut self, out: &mut [u8]) {
        self.refresh_window();
        self.spectrum.analyze(&self.window, out);
    }

    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn buffer_length(&self) -> BufferLength {
        self.length
    }

    fn reconfigure(&mut self, length: BufferLength) -> Result<()> {
        if length == self.length {
            return Ok(());
        }
        info!("Frame source: buffer length {} -> {}", self.length, length);

        let capacity = length.samples();
        let keep = self.samples.len().min(capacity);
        let mut samples = VecDeque::with_capacity(capacity);
        samples.extend(std::iter::repeat(0.0).take(capacity - keep));
        samples.extend(self.samples.iter().skip(self.samples.len() - keep).copied());

        self.samples = samples;
        self.window = vec![0.0; capacity];
        self.spectrum = SpectrumAnalyzer::new(length);
        self.length = length;
        Ok(())
    }
}
