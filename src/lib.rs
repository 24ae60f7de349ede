//! # Arrvee analysis
//!
//! Real-time musical analysis for the visualizer: the pitch being played,
//! the key it implies, and the tempo of the beat.
//!
//! An [`AnalysisEngine`] is ticked at a fixed rate (typically once per
//! display refresh). Each tick it reads one window from a [`FrameSource`]
//! and runs two independent pipelines:
//!
//! - time domain → [`PitchEstimator`] → [`frequency_to_note`] → [`KeyEstimator`]
//! - frequency domain → [`BeatEstimator`]
//!
//! ```no_run
//! use arrvee_analysis::{AnalysisEngine, AnalyzerConfig, SampleFrameSource};
//!
//! let config = AnalyzerConfig::default();
//! let mut source = SampleFrameSource::new(44100.0, config.buffer_length);
//! let mut engine = AnalysisEngine::new(config)?;
//!
//! source.push_samples(&[0.0; 735]);
//! let report = engine.tick(&mut source);
//! if let Some(note) = report.note {
//!     println!("{} ({:+} cents)", note.label, note.cents);
//! }
//! # Ok::<(), arrvee_analysis::AnalysisError>(())
//! ```

pub mod audio;
pub mod config;
pub mod error;

pub use audio::{
    frequency_to_note, AnalysisEngine, AnalysisReport, AudioFrame, BeatEstimator, BpmBucket,
    BufferLength, FrameSource, Key, KeyEstimate, KeyEstimator, KeyVote, MicrophoneSource, Mode,
    NoteEvent, PitchClass, PitchEstimator, SampleFrameSource, TempoEstimate,
};
pub use config::AnalyzerConfig;
pub use error::AnalysisError;
