//! Enhancer trait and core types
//!
//! Defines the boundary to the denoising model. The pipeline treats every
//! implementation as opaque: one window in, one window out, same frame and
//! channel count.

use serde::{Deserialize, Serialize};

use crate::engine::buffer::AudioBuffer;
use crate::error::Result;

/// Information about an enhancer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancerInfo {
    /// Identifier (e.g. "gate", "deepfilter")
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Version string
    pub version: String,

    /// Sample rate the model expects, if it has one
    pub sample_rate: Option<u32>,

    /// Whether the model carries state between calls
    ///
    /// Chunked processing restarts such a model at every window, so its
    /// output can differ from one-shot processing at window seams.
    pub stateful: bool,
}

/// The external transform: `enhance(window, attenuation_limit_db) -> window`
///
/// Implementations may block for seconds and are only ever called from the
/// worker thread, never from the audio callback.
pub trait Enhancer: Send + Sync {
    /// Get enhancer information
    fn info(&self) -> &EnhancerInfo;

    /// Denoise one window
    ///
    /// `attenuation_limit_db` caps how much noise is removed: 0 means no
    /// limit, larger values keep more of the noise floor.
    fn enhance(&self, window: &AudioBuffer, attenuation_limit_db: f32) -> Result<AudioBuffer>;

    /// Check if the enhancer is ready to use
    fn is_available(&self) -> bool {
        true
    }

    /// Get enhancer ID (convenience method)
    fn id(&self) -> &str {
        &self.info().id
    }
}
