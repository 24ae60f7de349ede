use crate::audio::BufferLength;
use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine settings. Missing fields in a config file fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default)]
    pub buffer_length: BufferLength,
    #[serde(default = "default_tick_rate")]
    pub tick_rate_hz: f32,
    #[serde(default = "default_enabled")]
    pub pitch_enabled: bool,
    #[serde(default = "default_enabled")]
    pub beat_enabled: bool,
}

fn default_tick_rate() -> f32 { 60.0 }
fn default_enabled() -> bool { true }

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            buffer_length: BufferLength::default(),
            tick_rate_hz: default_tick_rate(),
            pitch_enabled: default_enabled(),
            beat_enabled: default_enabled(),
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.tick_rate_hz.is_finite() || self.tick_rate_hz <= 0.0 || self.tick_rate_hz > 1000.0 {
            return Err(AnalysisError::Config(format!(
                "tick rate must be in (0, 1000] Hz, got {}",
                self.tick_rate_hz
            )));
        }
        Ok(())
    }

    pub fn tick_interval_ms(&self) -> f64 {
        1000.0 / self.tick_rate_hz as f64
    }

    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| AnalysisError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| AnalysisError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save settings to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| AnalysisError::Config(e.to_string()))?;
        std::fs::write(path, json)
            .map_err(|e| AnalysisError::Config(format!("{}: {}", path.display(), e)))
    }
}
