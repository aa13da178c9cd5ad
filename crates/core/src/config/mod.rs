use std::{path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{ClickTrackError, Result};

/// Top-level configuration for a generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Largest plan rendered in a single mixer pass.
    pub direct_limit: usize,
    /// Placements per intermediate file in the chunked strategy.
    pub chunk_size: usize,
    /// Silence kept after the last event so the final sound can ring out.
    pub tail_seconds: f64,
    /// Upper bound of the rapid-click threshold.
    pub rapid_ceiling_seconds: f64,
    /// Tick rate assumed for JSON macros that do not carry one.
    pub default_tps: f64,
    /// File extensions recognised as sound assets.
    pub sound_extensions: Vec<String>,
    pub render: RenderConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            direct_limit: 500,
            chunk_size: 50,
            tail_seconds: 2.0,
            rapid_ceiling_seconds: 0.15,
            default_tps: 240.0,
            sound_extensions: vec!["mp3".to_string()],
            render: RenderConfig::default(),
        }
    }
}

impl GeneratorConfig {
    /// Loads a (possibly partial) TOML file on top of the defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ClickTrackError::SourceNotFound {
                what: "config file",
                path: path.to_path_buf(),
            });
        }

        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|err| ClickTrackError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ClickTrackError::Config("chunk_size must be at least 1".into()));
        }
        if !(self.default_tps.is_finite() && self.default_tps > 0.0) {
            return Err(ClickTrackError::Config(format!(
                "default_tps must be positive, got {}",
                self.default_tps
            )));
        }
        if !(self.tail_seconds.is_finite() && self.tail_seconds >= 0.0) {
            return Err(ClickTrackError::Config(format!(
                "tail_seconds must not be negative, got {}",
                self.tail_seconds
            )));
        }
        if self.render.timeout_seconds == 0 {
            return Err(ClickTrackError::Config(
                "render.timeout_seconds must be at least 1".into(),
            ));
        }
        if self.sound_extensions.is_empty() {
            return Err(ClickTrackError::Config(
                "sound_extensions must list at least one extension".into(),
            ));
        }
        Ok(())
    }
}

/// Settings for the external mixer and its intermediate files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub ffmpeg_binary: PathBuf,
    pub timeout_seconds: u64,
    pub max_output_bytes: usize,
    pub limiter: LimiterConfig,
    pub chunk_sample_rate: u32,
    pub chunk_channels: u16,
    /// Parent of the per-run scratch directory. Defaults to the system temp dir.
    pub temp_root: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_binary: PathBuf::from("ffmpeg"),
            timeout_seconds: 900,
            max_output_bytes: 100 * 1024 * 1024,
            limiter: LimiterConfig::default(),
            chunk_sample_rate: 48_000,
            chunk_channels: 2,
            temp_root: None,
        }
    }
}

impl RenderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn temp_root(&self) -> PathBuf {
        self.temp_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Peak limiter applied to every final mix.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    pub limit: f64,
    pub attack_ms: f64,
    pub release_ms: f64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            limit: 0.95,
            attack_ms: 1.0,
            release_ms: 50.0,
        }
    }
}
