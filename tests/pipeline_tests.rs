use arrvee_analysis::{
    frequency_to_note, AnalysisEngine, AnalyzerConfig, BeatEstimator, BufferLength, FrameSource,
    Key, KeyEstimator, Mode, PitchClass, PitchEstimator, SampleFrameSource,
};

const SAMPLE_RATE: f32 = 44100.0;
const TICK_MS: f64 = 1000.0 / 60.0;

fn generate_sine(freq: f32, start: usize, len: usize, amplitude: f32) -> Vec<f32> {
    (start..start + len)
        .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE).sin())
        .collect()
}

fn bass_spectrum(bass: u8) -> Vec<u8> {
    let mut data = vec![10u8; 1024];
    for bin in data.iter_mut().take(102) {
        *bin = bass;
    }
    data
}

#[test]
fn test_a440_end_to_end() {
    let mut source = SampleFrameSource::new(SAMPLE_RATE, BufferLength::default());
    source.push_samples(&generate_sine(440.0, 0, 2048, 0.5));
    let mut pitch = PitchEstimator::new(BufferLength::default());

    let frequency = pitch.estimate_from(&mut source).expect("pitch");
    assert!((frequency - 440.0).abs() <= 2.0, "got {frequency}");

    let note = frequency_to_note(frequency).expect("note");
    assert_eq!(note.pitch_class, PitchClass::A);
    assert_eq!(note.label, "A4");
    assert!(note.cents.abs() <= 10, "cents {}", note.cents);
}

#[test]
fn test_silence_yields_no_note() {
    let mut source = SampleFrameSource::new(SAMPLE_RATE, BufferLength::default());
    source.push_samples(&vec![0.0; 2048]);
    let mut engine = AnalysisEngine::new(AnalyzerConfig::default()).unwrap();

    let report = engine.tick_at(&mut source, 0.0);
    assert!(report.frequency.is_none());
    assert!(report.note.is_none());
    assert!(engine.key_estimator().note_history().is_empty());
}

#[test]
fn test_fewer_than_ten_notes_has_no_key() {
    let mut estimator = KeyEstimator::new();
    for _ in 0..9 {
        estimator.add_note(PitchClass::C);
    }
    let estimate = estimator.estimate_key();
    assert!(estimate.key.is_none());
    assert_eq!(estimate.confidence, 0.0);
    assert!(estimator.vote_history().is_empty());
}

#[test]
fn test_repeated_c_converges_to_c_major() {
    let mut estimator = KeyEstimator::new();
    for _ in 0..50 {
        estimator.add_note(PitchClass::C);
    }

    let first = estimator.estimate_key();
    assert_eq!(first.key, Some(Key::new(PitchClass::C, Mode::Major)));
    assert!(first.confidence > 90.0, "confidence {}", first.confidence);

    let mut last = first;
    for _ in 0..29 {
        last = estimator.estimate_key();
    }
    assert_eq!(estimator.vote_history().len(), 30);
    assert_eq!(last.consensus_key, Some(Key::new(PitchClass::C, Mode::Major)));
    assert_eq!(last.consensus_confidence, 100.0);
}

#[test]
fn test_key_vote_percentages_cover_history() {
    let mut estimator = KeyEstimator::new();
    for name in ["C", "D", "E", "F", "G", "A", "B", "C", "E", "G"] {
        estimator.add_note_name(name).unwrap();
    }
    for _ in 0..5 {
        estimator.estimate_key();
    }
    for name in ["A", "C", "E", "A", "B", "A", "G#", "E", "A", "D"] {
        estimator.add_note_name(name).unwrap();
    }
    let estimate = (0..5).map(|_| estimator.estimate_key()).last().unwrap();

    let sum: u32 = estimate.votes.iter().map(|v| v.percentage).sum();
    let slack = estimate.votes.len() as u32;
    assert!(sum + slack >= 100 && sum <= 100 + slack, "sum {sum}");
    assert!(estimate.votes.windows(2).all(|w| w[0].percentage >= w[1].percentage));
}

#[test]
fn test_spikes_every_500ms_read_120_bpm() {
    let mut beat = BeatEstimator::new(BufferLength::default());
    let quiet = bass_spectrum(20);
    let loud = bass_spectrum(250);

    let mut last = None;
    for tick in 0..600 {
        let frame = if tick % 30 == 0 { &loud } else { &quiet };
        last = Some(beat.detect_beat(frame, tick as f64 * TICK_MS));
    }

    let beats = beat.beat_times().to_vec();
    assert!(beats.len() >= 3);
    assert!(beats.windows(2).all(|w| w[1] - w[0] >= 300.0));

    let tempo = last.unwrap();
    assert!(tempo.ready);
    assert!((tempo.bpm - 120.0).abs() <= 2.0, "bpm {}", tempo.bpm);
    assert!((tempo.consensus_bpm - 120.0).abs() <= 2.0);
    assert!(tempo.confidence > 95.0);

    let sum: u32 = tempo.histogram.iter().map(|b| b.percentage).sum();
    let slack = tempo.histogram.len() as u32;
    assert!(sum + slack >= 100 && sum <= 100 + slack, "sum {sum}");
}

#[test]
fn test_reconfigure_keeps_histories() {
    let mut engine = AnalysisEngine::new(AnalyzerConfig::default()).unwrap();
    let mut source = SampleFrameSource::new(SAMPLE_RATE, BufferLength::default());
    source.push_samples(&generate_sine(261.63, 0, 2048, 0.6));
    for tick in 0..60 {
        source.push_samples(&generate_sine(261.63, 2048 + tick * 735, 735, 0.6));
        engine.tick_at(&mut source, tick as f64 * TICK_MS);
    }

    let notes = engine.key_estimator().note_history().to_vec();
    let votes = engine.key_estimator().vote_history().to_vec();
    let energy = engine.beat_estimator().energy_history().to_vec();
    assert!(!notes.is_empty());

    for samples in BufferLength::SUPPORTED {
        engine.reconfigure(&mut source, samples).unwrap();
        assert_eq!(source.buffer_length().samples(), samples);
        assert_eq!(engine.pitch_estimator().window_size(), samples);
        assert_eq!(engine.beat_estimator().window_size(), samples);
        assert_eq!(engine.key_estimator().note_history().to_vec(), notes);
        assert_eq!(engine.key_estimator().vote_history().to_vec(), votes);
        assert_eq!(engine.beat_estimator().energy_history().to_vec(), energy);
    }

    assert!(engine.reconfigure(&mut source, 1000).is_err());
    assert_eq!(engine.config().buffer_length.samples(), 8192);
}

#[test]
fn test_clear_and_reset_match_fresh_state() {
    let mut key = KeyEstimator::new();
    for _ in 0..20 {
        key.add_note(PitchClass::G);
        key.estimate_key();
    }
    key.clear();
    let fresh = KeyEstimator::new();
    assert_eq!(key.note_history(), fresh.note_history());
    assert_eq!(key.vote_history(), fresh.vote_history());

    let mut beat = BeatEstimator::new(BufferLength::default());
    for tick in 0..200 {
        let frame = bass_spectrum(if tick % 30 == 0 { 250 } else { 20 });
        beat.detect_beat(&frame, tick as f64 * TICK_MS);
    }
    beat.reset();
    let fresh = BeatEstimator::new(BufferLength::default());
    assert_eq!(beat.energy_history(), fresh.energy_history());
    assert_eq!(beat.beat_times(), fresh.beat_times());
    assert_eq!(beat.bpm_history(), fresh.bpm_history());

    // A reset estimator warms up again exactly like a new one.
    let estimate = beat.detect_beat(&bass_spectrum(250), 10_000.0);
    assert!(!estimate.ready);
}
