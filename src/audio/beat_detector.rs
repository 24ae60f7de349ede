use super::history::BoundedHistory;
use super::{BufferLength, FrameSource};
use log::debug;
use serde::{Deserialize, Serialize};

const ENERGY_HISTORY_SIZE: usize = 43; // ~1 s at 60 ticks/s
const BEAT_THRESHOLD: f64 = 1.3;
const MIN_BEAT_INTERVAL_MS: f64 = 300.0;
const BEAT_TIMESTAMP_HISTORY_SIZE: usize = 8;
const BPM_HISTORY_SIZE: usize = 30;
const MIN_BPM: f64 = 40.0;
const MAX_BPM: f64 = 240.0;
/// Fraction of the spectrum, from the bottom, treated as bass.
const BASS_FRACTION: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BpmBucket {
    /// Tempo rounded to the nearest even BPM.
    pub bpm: u32,
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoEstimate {
    /// False until the energy history has filled once.
    pub ready: bool,
    pub beat_detected: bool,
    pub bpm: f64,
    pub confidence: f64,
    pub consensus_bpm: f64,
    pub consensus_confidence: f64,
    /// Sorted by percentage, highest first.
    pub histogram: Vec<BpmBucket>,
    pub bass_energy: f64,
}

impl TempoEstimate {
    fn warming_up(bass_energy: f64) -> Self {
        Self {
            ready: false,
            beat_detected: false,
            bpm: 0.0,
            confidence: 0.0,
            consensus_bpm: 0.0,
            consensus_confidence: 0.0,
            histogram: Vec::new(),
            bass_energy,
        }
    }
}

/// Bass-energy onset detector with interval-based tempo tracking.
pub struct BeatEstimator {
    frequency_data: Vec<u8>,
    energy_history: BoundedHistory<f64>,
    beat_times: BoundedHistory<f64>,
    bpm_history: BoundedHistory<u32>,
    last_beat_time: Option<f64>,
    current_bpm: f64,
}

impl BeatEstimator {
    pub fn new(window: BufferLength) -> Self {
        Self {
            frequency_data: vec![0; window.frequency_bins()],
            energy_history: BoundedHistory::new(ENERGY_HISTORY_SIZE),
            beat_times: BoundedHistory::new(BEAT_TIMESTAMP_HISTORY_SIZE),
            bpm_history: BoundedHistory::new(BPM_HISTORY_SIZE),
            last_beat_time: None,
            current_bpm: 0.0,
        }
    }

    pub fn window_size(&self) -> usize {
        self.frequency_data.len() * 2
    }

    /// Reallocates the frequency buffer. Histories and beat timing survive.
    pub fn set_window_size(&mut self, window: BufferLength) {
        self.frequency_data = vec![0; window.frequency_bins()];
    }

    /// Back to the freshly constructed state, keeping the window size.
    pub fn reset(&mut self) {
        self.energy_history.clear();
        self.beat_times.clear();
        self.bpm_history.clear();
        self.last_beat_time = None;
        self.current_bpm = 0.0;
    }

    pub fn energy_history(&self) -> &BoundedHistory<f64> {
        &self.energy_history
    }

    pub fn beat_times(&self) -> &BoundedHistory<f64> {
        &self.beat_times
    }

    pub fn bpm_history(&self) -> &BoundedHistory<u32> {
        &self.bpm_history
    }

    /// Mean squared magnitude over the lowest tenth of the bins.
    pub fn compute_energy(frequency_data: &[u8]) -> f64 {
        if frequency_data.is_empty() {
            return 0.0;
        }
        let bins = ((frequency_data.len() as f64 * BASS_FRACTION) as usize).max(1);
        let sum: f64 = frequency_data[..bins]
            .iter()
            .map(|&m| {
                let m = m as f64;
                m * m
            })
            .sum();
        sum / bins as f64
    }

    /// Reads the current spectrum from `source` into the internal buffer and
    /// runs one detection step.
    pub fn detect_beat_from(&mut self, source: &mut dyn FrameSource, now_ms: f64) -> TempoEstimate {
        source.read_frequency_domain(&mut self.frequency_data);
        let energy = Self::compute_energy(&self.frequency_data);
        self.update(energy, now_ms)
    }

    /// One detection step over `frequency_data` observed at `now_ms`.
    pub fn detect_beat(&mut self, frequency_data: &[u8], now_ms: f64) -> TempoEstimate {
        self.update(Self::compute_energy(frequency_data), now_ms)
    }

    fn update(&mut self, energy: f64, now_ms: f64) -> TempoEstimate {
        self.energy_history.push(energy);

        if !self.energy_history.is_full() {
            return TempoEstimate::warming_up(energy);
        }

        let average = self.energy_history.mean();
        let can_beat = self
            .last_beat_time
            .map_or(true, |last| now_ms - last >= MIN_BEAT_INTERVAL_MS);
        let beat_detected = energy > average * BEAT_THRESHOLD && can_beat;

        if beat_detected {
            self.last_beat_time = Some(now_ms);
            self.beat_times.push(now_ms);

            if let Some(bpm) = self.instantaneous_bpm() {
                self.current_bpm = bpm;
                self.bpm_history.push(bpm.round() as u32);
            }
            debug!(
                "beat at {:.0} ms: energy {:.1} vs avg {:.1}, bpm {:.1}",
                now_ms, energy, average, self.current_bpm
            );
        }

        let confidence = self.interval_confidence();
        let histogram = self.bpm_histogram();
        let (consensus_bpm, consensus_confidence) = match histogram.first() {
            Some(top) => (top.bpm as f64, top.percentage as f64),
            None => (self.current_bpm, 0.0),
        };

        TempoEstimate {
            ready: true,
            beat_detected,
            bpm: self.current_bpm,
            confidence,
            consensus_bpm,
            consensus_confidence,
            histogram,
            bass_energy: energy,
        }
    }

    fn intervals(&self) -> Vec<f64> {
        let times = self.beat_times.to_vec();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }

    fn instantaneous_bpm(&self) -> Option<f64> {
        let intervals = self.intervals();
        if intervals.is_empty() {
            return None;
        }
        let mean_interval = intervals.iter().sum::<f64>() / intervals.len() as f64;
        if mean_interval <= 0.0 {
            return None;
        }
        Some((60_000.0 / mean_interval).clamp(MIN_BPM, MAX_BPM))
    }

    /// 100 minus the coefficient of variation of the beat intervals.
    fn interval_confidence(&self) -> f64 {
        if self.beat_times.len() < 3 {
            return 0.0;
        }
        let intervals = self.intervals();
        let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
        if mean <= 0.0 {
            return 0.0;
        }
        let variance = intervals.iter().map(|&x| (x - mean).powi(2)).sum::<f64>()
            / intervals.len() as f64;
        let cv = variance.sqrt() / mean * 100.0;
        (100.0 - cv).clamp(0.0, 100.0)
    }

    fn bpm_histogram(&self) -> Vec<BpmBucket> {
        let mut counts: Vec<(u32, usize)> = Vec::new();
        for &bpm in self.bpm_history.iter() {
            let bucket = ((bpm as f64 / 2.0).round() * 2.0) as u32;
            match counts.iter_mut().find(|(b, _)| *b == bucket) {
                Some((_, count)) => *count += 1,
                None => counts.push((bucket, 1)),
            }
        }

        let total = self.bpm_history.len() as f64;
        let mut histogram: Vec<BpmBucket> = counts
            .into_iter()
            .map(|(bpm, count)| BpmBucket {
                bpm,
                percentage: (count as f64 / total * 100.0).round() as u32,
            })
            .collect();
        histogram.sort_by(|a, b| b.percentage.cmp(&a.percentage));
        histogram
    }
}
