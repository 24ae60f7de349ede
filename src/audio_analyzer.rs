use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use arrvee_analysis::{
    AnalysisEngine, AnalysisReport, AnalyzerConfig, BufferLength, KeyEstimate, SampleFrameSource,
    TempoEstimate,
};

#[derive(Parser)]
#[command(name = "arrvee-file-analyzer")]
#[command(about = "Replays a WAV file through the live analysis engine and writes a JSON report")]
struct Args {
    /// Audio file to analyze (WAV)
    #[arg(default_value = "sample.wav")]
    audio_file: String,

    /// Output JSON file path
    #[arg(long, short, default_value = "analysis_results.json")]
    output: String,

    /// Include every tick's report (creates large files)
    #[arg(long)]
    frame_by_frame: bool,

    /// Analysis window in samples (512, 1024, 2048, 4096 or 8192)
    #[arg(long, default_value = "2048")]
    buffer_length: usize,

    /// Simulated ticks per second
    #[arg(long, default_value = "60")]
    tick_rate: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct FeatureStats {
    min: f32,
    max: f32,
    mean: f32,
    median: f32,
    std_dev: f32,
    samples: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct FileInfo {
    filename: String,
    duration_seconds: f32,
    sample_rate: f32,
    total_samples: usize,
    total_ticks: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct BeatEvent {
    timestamp_ms: f64,
    bass_energy: f64,
    bpm: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnalysisResults {
    file_info: FileInfo,
    config: AnalyzerConfig,

    voiced_ticks: usize,
    /// Ticks per detected pitch class
    pitch_class_counts: BTreeMap<String, usize>,
    frequency_stats: FeatureStats,
    cents_stats: FeatureStats,
    bass_energy_stats: FeatureStats,

    beat_events: Vec<BeatEvent>,
    final_key: Option<KeyEstimate>,
    final_tempo: Option<TempoEstimate>,

    frame_data: Option<Vec<AnalysisReport>>,
}

fn calculate_stats(data: &[f32]) -> FeatureStats {
    if data.is_empty() {
        return FeatureStats {
            min: 0.0, max: 0.0, mean: 0.0, median: 0.0, std_dev: 0.0, samples: 0,
        };
    }

    let mut sorted_data = data.to_vec();
    sorted_data.sort_by(|a, b| a.total_cmp(b));

    let min = sorted_data[0];
    let max = sorted_data[sorted_data.len() - 1];
    let mean = data.iter().sum::<f32>() / data.len() as f32;
    let median = sorted_data[sorted_data.len() / 2];
    let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / data.len() as f32;

    FeatureStats {
        min, max, mean, median,
        std_dev: variance.sqrt(),
        samples: data.len(),
    }
}

/// Reads a WAV file and mixes it down to mono f32.
fn load_wav(path: &Path) -> Result<(Vec<f32>, f32)> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        bail!("{} has no channels", path.display());
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let mono = interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();
    Ok((mono, spec.sample_rate as f32))
}

fn analyze_file(args: &Args) -> Result<AnalysisResults> {
    let config = AnalyzerConfig {
        buffer_length: BufferLength::new(args.buffer_length)?,
        tick_rate_hz: args.tick_rate,
        ..AnalyzerConfig::default()
    };
    config.validate()?;

    info!("Loading audio file: {}", args.audio_file);
    let (samples, sample_rate) = load_wav(Path::new(&args.audio_file))?;
    let total_duration = samples.len() as f32 / sample_rate;
    info!("Processing {} samples ({:.2}s duration)", samples.len(), total_duration);

    let tick_ms = config.tick_interval_ms();
    let samples_per_tick = ((sample_rate as f64 * tick_ms / 1000.0).round() as usize).max(1);
    let mut source = SampleFrameSource::new(sample_rate, config.buffer_length);
    let mut engine = AnalysisEngine::new(config.clone())?;

    let mut frequencies = Vec::new();
    let mut cents = Vec::new();
    let mut energies = Vec::new();
    let mut pitch_class_counts = BTreeMap::new();
    let mut beat_events = Vec::new();
    let mut frame_data = Vec::new();
    let mut last_report: Option<AnalysisReport> = None;

    for (tick, chunk) in samples.chunks(samples_per_tick).enumerate() {
        source.push_samples(chunk);
        let report = engine.tick_at(&mut source, tick as f64 * tick_ms);

        if let Some(note) = &report.note {
            frequencies.push(note.frequency);
            cents.push(note.cents as f32);
            *pitch_class_counts.entry(note.pitch_class.to_string()).or_insert(0) += 1;
        }
        if let Some(tempo) = &report.tempo {
            energies.push(tempo.bass_energy as f32);
            if tempo.beat_detected {
                beat_events.push(BeatEvent {
                    timestamp_ms: report.timestamp_ms,
                    bass_energy: tempo.bass_energy,
                    bpm: tempo.bpm,
                });
            }
        }

        if (tick + 1) % 1000 == 0 {
            info!("Processed {} ticks ({:.1}s of {:.1}s)", tick + 1, report.timestamp_ms / 1000.0, total_duration);
        }
        if args.frame_by_frame {
            frame_data.push(report.clone());
        }
        last_report = Some(report);
    }

    let total_ticks = last_report.as_ref().map_or(0, |r| r.tick as usize);
    info!("Analysis complete. Processed {} ticks ({:.2}s)", total_ticks, total_duration);

    Ok(AnalysisResults {
        file_info: FileInfo {
            filename: args.audio_file.clone(),
            duration_seconds: total_duration,
            sample_rate,
            total_samples: samples.len(),
            total_ticks,
        },
        config,
        voiced_ticks: frequencies.len(),
        pitch_class_counts,
        frequency_stats: calculate_stats(&frequencies),
        cents_stats: calculate_stats(&cents),
        bass_energy_stats: calculate_stats(&energies),
        beat_events,
        final_key: last_report.as_ref().and_then(|r| r.key.clone()),
        final_tempo: last_report.and_then(|r| r.tempo),
        frame_data: args.frame_by_frame.then_some(frame_data),
    })
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    info!("🎵 Starting file analysis");
    info!("File: {}", args.audio_file);
    info!("Output: {}", args.output);
    info!("Buffer length: {} samples at {} ticks/s", args.buffer_length, args.tick_rate);

    let results = analyze_file(&args)?;

    let json_output = serde_json::to_string_pretty(&results)?;
    let mut file = File::create(&args.output)
        .with_context(|| format!("creating {}", args.output))?;
    file.write_all(json_output.as_bytes())?;

    info!("✅ Analysis Complete!");
    info!("  Duration: {:.2}s", results.file_info.duration_seconds);
    info!("  Voiced ticks: {} of {}", results.voiced_ticks, results.file_info.total_ticks);
    info!("  Beats detected: {}", results.beat_events.len());
    if let Some(key) = results.final_key.as_ref().filter(|k| k.is_ready()) {
        if let Some(consensus) = key.consensus_key {
            info!("  Key: {} ({:.0}% of recent votes)", consensus, key.consensus_confidence);
        }
    }
    if let Some(tempo) = results.final_tempo.as_ref().filter(|t| t.ready) {
        info!("  Tempo: {:.0} BPM ({:.0}% of recent readings)", tempo.consensus_bpm, tempo.consensus_confidence);
    }
    info!("📄 Detailed results written to: {}", args.output);

    Ok(())
}
