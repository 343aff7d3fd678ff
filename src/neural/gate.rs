//! Built-in noise gate enhancer
//!
//! Not a neural model. A deterministic, stateless stand-in that works
//! without the model bridge: frames whose peak sits below a threshold are
//! treated as noise and attenuated, capped by the attenuation limit.

use crate::engine::buffer::{db_to_linear, AudioBuffer};
use crate::error::{DuetError, Result};

use super::model::{Enhancer, EnhancerInfo};

/// Default gate threshold (-40 dBFS)
pub const DEFAULT_THRESHOLD_DB: f32 = -40.0;

/// Stateless per-frame noise gate
pub struct NoiseGate {
    info: EnhancerInfo,
    threshold: f32,
}

impl NoiseGate {
    pub fn new(threshold_db: f32) -> Self {
        Self {
            info: EnhancerInfo {
                id: "gate".to_string(),
                name: "Noise Gate".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                sample_rate: None,
                stateful: false,
            },
            threshold: db_to_linear(threshold_db),
        }
    }

    /// Gain applied to gated frames
    ///
    /// A limit of 0 dB means unlimited suppression (full mute).
    pub fn floor_gain(attenuation_limit_db: f32) -> f32 {
        if attenuation_limit_db <= 0.0 {
            0.0
        } else {
            db_to_linear(-attenuation_limit_db)
        }
    }
}

impl Default for NoiseGate {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_DB)
    }
}

impl Enhancer for NoiseGate {
    fn info(&self) -> &EnhancerInfo {
        &self.info
    }

    fn enhance(&self, window: &AudioBuffer, attenuation_limit_db: f32) -> Result<AudioBuffer> {
        if !window.is_finite() {
            return Err(DuetError::Enhancer {
                reason: "window contains NaN or infinite samples".to_string(),
            });
        }

        let floor = Self::floor_gain(attenuation_limit_db);
        let channels = window.channels();
        let mut out = Vec::with_capacity(window.samples().len());

        for frame in window.samples().chunks_exact(channels) {
            let peak = frame.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
            let gain = if peak < self.threshold { floor } else { 1.0 };
            out.extend(frame.iter().map(|s| s * gain));
        }

        AudioBuffer::from_interleaved(out, channels, window.sample_rate())
    }
}
