//! Enhancer interfaces and implementations
//!
//! This module provides:
//! - `Enhancer` trait, the boundary to the denoising model
//! - `NoiseGate`, a deterministic built-in enhancer
//! - `DeepFilterBridge`, the DeepFilterNet model behind a Python process

mod bridge;
mod gate;
mod model;

use std::sync::Arc;

pub use bridge::{DeepFilterBridge, DEEPFILTER_SAMPLE_RATE};
pub use gate::{NoiseGate, DEFAULT_THRESHOLD_DB};
pub use model::{Enhancer, EnhancerInfo};

use crate::config::DuetConfig;
use crate::error::{DuetError, Result};

/// Build an enhancer by id ("gate" or "deepfilter")
pub fn create_enhancer(id: &str, config: &DuetConfig) -> Result<Arc<dyn Enhancer>> {
    match id {
        "gate" => Ok(Arc::new(NoiseGate::default())),
        "deepfilter" => Ok(Arc::new(DeepFilterBridge::from_config(&config.bridge))),
        other => Err(DuetError::InvalidConfig {
            reason: format!("unknown model '{}' (available: gate, deepfilter)", other),
        }),
    }
}
