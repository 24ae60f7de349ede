use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::{
    frequency_to_note, BeatEstimator, BufferLength, FrameSource, KeyEstimate, KeyEstimator,
    NoteEvent, PitchEstimator, TempoEstimate,
};
use crate::config::AnalyzerConfig;
use crate::error::Result;

/// Everything one tick produced. Disabled pipelines leave their fields empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub tick: u64,
    pub timestamp_ms: f64,
    pub frequency: Option<f32>,
    pub note: Option<NoteEvent>,
    /// Latest key estimate; only recomputed on ticks that yield a note.
    pub key: Option<KeyEstimate>,
    pub tempo: Option<TempoEstimate>,
}

/// Drives the pitch → note → key pipeline and the beat pipeline from one
/// frame source. The pipelines share no state and run in a fixed order.
pub struct AnalysisEngine {
    config: AnalyzerConfig,
    pitch: PitchEstimator,
    key: KeyEstimator,
    beat: BeatEstimator,
    last_key: Option<KeyEstimate>,
    started: Instant,
    ticks: u64,
}

impl AnalysisEngine {
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        config.validate()?;
        let length = config.buffer_length;
        info!(
            "Analysis engine: {} samples, {:.0} Hz ticks, pitch {}, beat {}",
            length,
            config.tick_rate_hz,
            if config.pitch_enabled { "on" } else { "off" },
            if config.beat_enabled { "on" } else { "off" }
        );

        Ok(Self {
            config,
            pitch: PitchEstimator::new(length),
            key: KeyEstimator::new(),
            beat: BeatEstimator::new(length),
            last_key: None,
            started: Instant::now(),
            ticks: 0,
        })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn key_estimator(&self) -> &KeyEstimator {
        &self.key
    }

    pub fn beat_estimator(&self) -> &BeatEstimator {
        &self.beat
    }

    pub fn pitch_estimator(&self) -> &PitchEstimator {
        &self.pitch
    }

    pub fn set_pitch_enabled(&mut self, enabled: bool) {
        self.config.pitch_enabled = enabled;
    }

    pub fn set_beat_enabled(&mut self, enabled: bool) {
        self.config.beat_enabled = enabled;
    }

    /// Runs one tick stamped with the time elapsed since construction.
    pub fn tick(&mut self, source: &mut dyn FrameSource) -> AnalysisReport {
        let now_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        self.tick_at(source, now_ms)
    }

    /// Runs one tick at an explicit timestamp, for replay and tests.
    pub fn tick_at(&mut self, source: &mut dyn FrameSource, now_ms: f64) -> AnalysisReport {
        self.ticks += 1;
        self.sync_window(source.buffer_length());

        let mut report = AnalysisReport {
            tick: self.ticks,
            timestamp_ms: now_ms,
            frequency: None,
            note: None,
            key: None,
            tempo: None,
        };

        if self.config.pitch_enabled {
            report.frequency = self.pitch.estimate_from(source);
            report.note = report.frequency.and_then(frequency_to_note);
            if let Some(note) = &report.note {
                self.key.add_note(note.pitch_class);
                self.last_key = Some(self.key.estimate_key());
            }
            report.key = self.last_key.clone();
        }

        if self.config.beat_enabled {
            report.tempo = Some(self.beat.detect_beat_from(source, now_ms));
        }

        if self.ticks % 120 == 0 {
            debug!(
                "tick {}: note {:?}, key {:?}, bpm {:?}",
                self.ticks,
                report.note.as_ref().map(|n| n.label.as_str()),
                report.key.as_ref().and_then(|k| k.consensus_key).map(|k| k.to_string()),
                report.tempo.as_ref().map(|t| t.consensus_bpm)
            );
        }

        report
    }

    /// Changes the analysis window on the source and both estimators.
    /// An unsupported length is rejected before anything is touched.
    pub fn reconfigure(&mut self, source: &mut dyn FrameSource, samples: usize) -> Result<()> {
        let length = BufferLength::new(samples).map_err(|e| {
            warn!("Rejected reconfiguration: {}", e);
            e
        })?;

        source.reconfigure(length)?;
        self.pitch.set_window_size(length);
        self.beat.set_window_size(length);
        self.config.buffer_length = length;
        info!("Reconfigured analysis window to {} samples", length);
        Ok(())
    }

    /// Clears key and tempo history. Window size and switches are kept.
    pub fn reset(&mut self) {
        self.key.clear();
        self.beat.reset();
        self.last_key = None;
        info!("Analysis state reset");
    }

    fn sync_window(&mut self, length: BufferLength) {
        if length != self.config.buffer_length {
            warn!(
                "Frame source reports {} samples, engine expected {}; following the source",
                length, self.config.buffer_length
            );
            self.pitch.set_window_size(length);
            self.beat.set_window_size(length);
            self.config.buffer_length = length;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{Key, Mode, PitchClass, SampleFrameSource};
    use crate::error::AnalysisError;

    const SAMPLE_RATE: f32 = 44100.0;

    fn sine(freq: f32, start: usize, len: usize) -> Vec<f32> {
        (start..start + len)
            .map(|i| 0.6 * (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE).sin())
            .collect()
    }

    fn engine() -> AnalysisEngine {
        AnalysisEngine::new(AnalyzerConfig::default()).unwrap()
    }

    #[test]
    fn test_tick_detects_note() {
        let mut engine = engine();
        let mut source = SampleFrameSource::new(SAMPLE_RATE, BufferLength::default());
        source.push_samples(&sine(440.0, 0, 2048));

        let report = engine.tick_at(&mut source, 0.0);
        let note = report.note.expect("note");
        assert_eq!(note.pitch_class, PitchClass::A);
        assert_eq!(note.octave, 4);
        assert!(report.tempo.is_some());
        assert_eq!(engine.key_estimator().note_history().len(), 1);
    }

    #[test]
    fn test_key_after_ten_ticks() {
        let mut engine = engine();
        let mut source = SampleFrameSource::new(SAMPLE_RATE, BufferLength::default());
        source.push_samples(&sine(261.63, 0, 2048));

        let mut report = engine.tick_at(&mut source, 0.0);
        assert!(!report.key.as_ref().unwrap().is_ready());
        for tick in 1..10 {
            source.push_samples(&sine(261.63, 2048 + (tick - 1) * 735, 735));
            report = engine.tick_at(&mut source, tick as f64 * 16.7);
            assert_eq!(report.note.as_ref().unwrap().label, "C4");
        }

        let key = report.key.expect("key estimate");
        assert_eq!(key.key, Some(Key::new(PitchClass::C, Mode::Major)));
        assert_eq!(key.consensus_confidence, 100.0);
    }

    #[test]
    fn test_disabled_pipelines_report_nothing() {
        let mut engine = engine();
        let mut source = SampleFrameSource::new(SAMPLE_RATE, BufferLength::default());
        source.push_samples(&sine(440.0, 0, 2048));

        engine.set_pitch_enabled(false);
        let report = engine.tick_at(&mut source, 0.0);
        assert!(report.frequency.is_none() && report.note.is_none() && report.key.is_none());
        assert!(report.tempo.is_some());
        assert!(engine.key_estimator().note_history().is_empty());

        engine.set_pitch_enabled(true);
        engine.set_beat_enabled(false);
        let report = engine.tick_at(&mut source, 16.0);
        assert!(report.note.is_some());
        assert!(report.tempo.is_none());
        assert_eq!(engine.beat_estimator().energy_history().len(), 1);
    }

    #[test]
    fn test_invalid_reconfigure_changes_nothing() {
        let mut engine = engine();
        let mut source = SampleFrameSource::new(SAMPLE_RATE, BufferLength::default());

        let err = engine.reconfigure(&mut source, 3000).unwrap_err();
        assert_eq!(err, AnalysisError::InvalidConfiguration { requested: 3000 });
        assert_eq!(source.buffer_length().samples(), 2048);
        assert_eq!(engine.pitch_estimator().window_size(), 2048);
        assert_eq!(engine.beat_estimator().window_size(), 2048);
        assert_eq!(engine.config().buffer_length.samples(), 2048);
    }

    #[test]
    fn test_reconfigure_resizes_everything() {
        let mut engine = engine();
        let mut source = SampleFrameSource::new(SAMPLE_RATE, BufferLength::default());

        engine.reconfigure(&mut source, 4096).unwrap();
        assert_eq!(source.buffer_length().samples(), 4096);
        assert_eq!(engine.pitch_estimator().window_size(), 4096);
        assert_eq!(engine.beat_estimator().window_size(), 4096);
    }

    #[test]
    fn test_follows_source_length() {
        let mut engine = engine();
        let mut source = SampleFrameSource::new(SAMPLE_RATE, BufferLength::new(1024).unwrap());
        source.push_samples(&sine(440.0, 0, 1024));
        engine.tick_at(&mut source, 0.0);
        assert_eq!(engine.pitch_estimator().window_size(), 1024);
        assert_eq!(engine.config().buffer_length.samples(), 1024);
    }

    #[test]
    fn test_reset() {
        let mut engine = engine();
        let mut source = SampleFrameSource::new(SAMPLE_RATE, BufferLength::default());
        source.push_samples(&sine(440.0, 0, 2048));
        for tick in 0..20 {
            engine.tick_at(&mut source, tick as f64 * 16.7);
        }
        engine.reset();
        assert!(engine.key_estimator().note_history().is_empty());
        assert!(engine.key_estimator().vote_history().is_empty());
        assert!(engine.beat_estimator().energy_history().is_empty());

        let mut quiet = SampleFrameSource::new(SAMPLE_RATE, BufferLength::default());
        let report = engine.tick_at(&mut quiet, 400.0);
        assert!(report.key.is_none());
    }
}
