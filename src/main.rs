use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use arrvee_analysis::{AnalysisEngine, AnalysisReport, AnalyzerConfig, BufferLength, MicrophoneSource};

#[derive(Parser)]
#[command(name = "arrvee-listen")]
#[command(about = "Live pitch, key and tempo readout from the default microphone")]
struct Args {
    /// JSON config file (buffer_length, tick_rate_hz, pitch_enabled, beat_enabled)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Analysis window in samples (512, 1024, 2048, 4096 or 8192)
    #[arg(long)]
    buffer_length: Option<usize>,

    /// Ticks per second
    #[arg(long)]
    tick_rate: Option<f32>,

    /// Disable the pitch/key pipeline
    #[arg(long)]
    no_pitch: bool,

    /// Disable the beat/tempo pipeline
    #[arg(long)]
    no_beat: bool,

    /// Stop after this many seconds (runs until killed otherwise)
    #[arg(long)]
    duration: Option<f32>,

    /// Print every tick as a JSON line instead of a status line
    #[arg(long)]
    json: bool,
}

fn build_config(args: &Args) -> Result<AnalyzerConfig> {
    let mut config = match &args.config {
        Some(path) => AnalyzerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AnalyzerConfig::default(),
    };

    if let Some(samples) = args.buffer_length {
        config.buffer_length = BufferLength::new(samples)?;
    }
    if let Some(rate) = args.tick_rate {
        config.tick_rate_hz = rate;
    }
    if args.no_pitch {
        config.pitch_enabled = false;
    }
    if args.no_beat {
        config.beat_enabled = false;
    }
    config.validate()?;
    Ok(config)
}

fn status_line(report: &AnalysisReport) -> String {
    let note = report
        .note
        .as_ref()
        .map(|n| format!("{:<4} {:+3}c {:7.1} Hz", n.label, n.cents, n.frequency))
        .unwrap_or_else(|| "--".to_string());

    let key = match &report.key {
        Some(k) if k.is_ready() => format!(
            "{} ({:.0}%)",
            k.consensus_key.map(|key| key.to_string()).unwrap_or_default(),
            k.consensus_confidence
        ),
        Some(_) => "collecting".to_string(),
        None => "--".to_string(),
    };

    let tempo = match &report.tempo {
        Some(t) if t.ready => format!(
            "{}{:.0} BPM ({:.0}%)",
            if t.beat_detected { "* " } else { "  " },
            t.consensus_bpm,
            t.consensus_confidence
        ),
        Some(_) => "warming up".to_string(),
        None => "--".to_string(),
    };

    format!("note {:<22} key {:<20} tempo {}", note, key, tempo)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = build_config(&args)?;

    info!("Starting Arrvee live analysis");
    let mut source = MicrophoneSource::new(config.buffer_length)
        .context("opening the default input device")?;
    let tick_interval = Duration::from_secs_f64(config.tick_interval_ms() / 1000.0);
    let mut engine = AnalysisEngine::new(config)?;

    let started = Instant::now();
    let mut next_tick = started;
    loop {
        if let Some(limit) = args.duration {
            if started.elapsed().as_secs_f32() >= limit {
                break;
            }
        }

        let report = engine.tick(&mut source);
        if args.json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!("{}", status_line(&report));
        }

        next_tick += tick_interval;
        let now = Instant::now();
        if next_tick > now {
            std::thread::sleep(next_tick - now);
        } else {
            next_tick = now;
        }
    }

    info!("Stopped after {:.1}s", started.elapsed().as_secs_f32());
    Ok(())
}
