//! Configuration
//!
//! All settings have defaults, so an empty JSON object is a valid config
//! file. Environment variables override the file for the external programs.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::io::ExportEncoding;
use crate::error::{DuetError, Result};

/// Largest accepted attenuation limit in dB
pub const MAX_ATTENUATION_LIMIT_DB: f32 = 100.0;

/// How to reach the model bridge process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Python interpreter
    pub python: String,
    /// Module run with `python -m`
    pub module: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            python: "python".to_string(),
            module: "duet_bridge".to_string(),
        }
    }
}

/// Settings for enhancement and playback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuetConfig {
    /// Pipeline window length in seconds
    pub window_secs: f64,
    /// Noise attenuation limit in dB (0 = unlimited)
    pub attenuation_limit_db: f32,
    /// Rate recordings are decoded to; `None` keeps the file's rate
    pub target_sample_rate: Option<u32>,
    /// Requested device block size in frames
    pub block_frames: u32,
    /// Position readout interval in milliseconds (at least 200)
    pub position_refresh_ms: u64,
    /// Transcoder executable
    pub transcoder: String,
    pub bridge: BridgeConfig,
    pub export_encoding: ExportEncoding,
}

impl Default for DuetConfig {
    fn default() -> Self {
        Self {
            window_secs: 30.0,
            attenuation_limit_db: 0.0,
            target_sample_rate: Some(48000),
            block_frames: 4096,
            position_refresh_ms: 200,
            transcoder: "ffmpeg".to_string(),
            bridge: BridgeConfig::default(),
            export_encoding: ExportEncoding::Float32,
        }
    }
}

impl DuetConfig {
    /// Load a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DuetError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let config: DuetConfig = serde_json::from_str(&content).map_err(|e| {
            DuetError::InvalidConfig {
                reason: format!("{}: {}", path.display(), e),
            }
        })?;

        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Apply `DUET_PYTHON_PATH`, `DUET_BRIDGE_MODULE` and `DUET_TRANSCODER`
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(python) = std::env::var("DUET_PYTHON_PATH") {
            self.bridge.python = python;
        }
        if let Ok(module) = std::env::var("DUET_BRIDGE_MODULE") {
            self.bridge.module = module;
        }
        if let Ok(transcoder) = std::env::var("DUET_TRANSCODER") {
            self.transcoder = transcoder;
        }
        self
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !(self.window_secs.is_finite() && self.window_secs > 0.0) {
            return Err(invalid(format!("window_secs must be positive, got {}", self.window_secs)));
        }
        if !(0.0..=MAX_ATTENUATION_LIMIT_DB).contains(&self.attenuation_limit_db) {
            return Err(invalid(format!(
                "attenuation_limit_db must be within 0..={}, got {}",
                MAX_ATTENUATION_LIMIT_DB, self.attenuation_limit_db
            )));
        }
        if self.target_sample_rate == Some(0) {
            return Err(invalid("target_sample_rate must be positive".to_string()));
        }
        if self.block_frames == 0 {
            return Err(invalid("block_frames must be positive".to_string()));
        }
        if self.transcoder.trim().is_empty() {
            return Err(invalid("transcoder must not be empty".to_string()));
        }
        Ok(())
    }

    /// Window length in frames at `sample_rate`
    pub fn window_frames(&self, sample_rate: u32) -> usize {
        (self.window_secs * sample_rate as f64).round() as usize
    }

    /// Position readout interval
    pub fn position_refresh(&self) -> Duration {
        Duration::from_millis(self.position_refresh_ms)
    }
}

fn invalid(reason: String) -> DuetError {
    DuetError::InvalidConfig { reason }
}
