//! Audio Buffer
//!
//! Provides the immutable audio buffer shared by the enhancement pipeline and
//! the playback engine, plus level helpers used for reporting.

use sha2::{Digest, Sha256};

use crate::error::{DuetError, Result};

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Calculate the RMS level of an audio buffer in dB
///
/// Returns -f32::INFINITY for empty or silent buffers.
pub fn calculate_rms(buffer: &AudioBuffer) -> f32 {
    if buffer.samples.is_empty() {
        return f32::NEG_INFINITY;
    }

    let sum_squares: f64 = buffer
        .samples
        .iter()
        .map(|&s| (s as f64) * (s as f64))
        .sum();

    let rms = (sum_squares / buffer.samples.len() as f64).sqrt() as f32;
    linear_to_db(rms)
}

/// Calculate the peak level of an audio buffer in dB
pub fn calculate_peak(buffer: &AudioBuffer) -> f32 {
    let peak = buffer
        .samples
        .iter()
        .map(|&s| s.abs())
        .fold(0.0_f32, f32::max);

    linear_to_db(peak)
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Fixed-length multichannel sample store
///
/// Samples are interleaved (`L0, R0, L1, R1, ...`), which is the layout the
/// output device asks for, so a block copy is a single slice copy.
///
/// A buffer has no mutating methods. Once built it can be shared behind an
/// `Arc` and read from any number of threads, the realtime callback included.
///
/// # Example
/// ```
/// use duet::engine::AudioBuffer;
///
/// let buffer = AudioBuffer::silence(48000, 2, 48000);
/// assert_eq!(buffer.channels(), 2);
/// assert_eq!(buffer.frame_count(), 48000);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Box<[f32]>,
    channels: usize,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Create a buffer from interleaved sample data
    ///
    /// # Errors
    /// * `InvalidBuffer` - zero channels, zero sample rate, or a sample count
    ///   that is not a whole number of frames
    pub fn from_interleaved(samples: Vec<f32>, channels: usize, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(DuetError::InvalidBuffer {
                reason: "channel count must be positive".to_string(),
            });
        }
        if sample_rate == 0 {
            return Err(DuetError::InvalidBuffer {
                reason: "sample rate must be positive".to_string(),
            });
        }
        if samples.len() % channels != 0 {
            return Err(DuetError::InvalidBuffer {
                reason: format!(
                    "Interleaved data length {} is not divisible by channel count {}",
                    samples.len(),
                    channels
                ),
            });
        }

        Ok(Self {
            samples: samples.into_boxed_slice(),
            channels,
            sample_rate,
        })
    }

    /// Create a buffer from one `Vec` per channel
    pub fn from_planar(planes: &[Vec<f32>], sample_rate: u32) -> Result<Self> {
        let channels = planes.len();
        let frames = planes.first().map_or(0, Vec::len);
        if planes.iter().any(|p| p.len() != frames) {
            return Err(DuetError::InvalidBuffer {
                reason: "channels have different lengths".to_string(),
            });
        }

        let mut interleaved = Vec::with_capacity(frames * channels);
        for frame in 0..frames {
            for plane in planes {
                interleaved.push(plane[frame]);
            }
        }

        Self::from_interleaved(interleaved, channels, sample_rate)
    }

    /// Create a buffer of digital silence
    pub fn silence(frames: usize, channels: usize, sample_rate: u32) -> Self {
        Self {
            samples: vec![0.0; frames * channels.max(1)].into_boxed_slice(),
            channels: channels.max(1),
            sample_rate: sample_rate.max(1),
        }
    }

    /// Concatenate buffers along the frame axis
    ///
    /// All parts must share channel count and sample rate. No crossfade or
    /// resampling happens at the joins.
    pub fn concat(parts: &[AudioBuffer]) -> Result<Self> {
        let first = parts.first().ok_or_else(|| DuetError::InvalidBuffer {
            reason: "nothing to concatenate".to_string(),
        })?;

        let total: usize = parts.iter().map(|p| p.samples.len()).sum();
        let mut samples = Vec::with_capacity(total);
        for part in parts {
            if part.channels != first.channels || part.sample_rate != first.sample_rate {
                return Err(DuetError::InvalidBuffer {
                    reason: format!(
                        "cannot join {}ch/{}Hz with {}ch/{}Hz",
                        first.channels, first.sample_rate, part.channels, part.sample_rate
                    ),
                });
            }
            samples.extend_from_slice(&part.samples);
        }

        Self::from_interleaved(samples, first.channels, first.sample_rate)
    }

    /// Number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Sample rate in Hz
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (samples per channel)
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels
    }

    /// Check if the buffer holds no frames
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// All interleaved samples
    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Interleaved samples for `frames` frames starting at `start`
    ///
    /// The range is clipped to the end of the buffer.
    #[inline]
    pub fn frames(&self, start: usize, frames: usize) -> &[f32] {
        let total = self.frame_count();
        let start = start.min(total);
        let end = start.saturating_add(frames).min(total);
        &self.samples[start * self.channels..end * self.channels]
    }

    /// Iterate over one channel's samples
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = f32> + '_ {
        self.samples
            .iter()
            .skip(channel)
            .step_by(self.channels)
            .copied()
            .take(if channel < self.channels { usize::MAX } else { 0 })
    }

    /// Copy a run of frames into a new buffer
    pub fn window(&self, start: usize, frames: usize) -> AudioBuffer {
        AudioBuffer {
            samples: self.frames(start, frames).into(),
            channels: self.channels,
            sample_rate: self.sample_rate,
        }
    }

    /// Convert to one `Vec` per channel
    pub fn to_planar(&self) -> Vec<Vec<f32>> {
        (0..self.channels).map(|ch| self.channel(ch).collect()).collect()
    }

    /// Check that every sample is finite
    pub fn is_finite(&self) -> bool {
        self.samples.iter().all(|s| s.is_finite())
    }

    /// SHA-256 of the sample data, channel count and rate as lowercase hex
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update((self.channels as u32).to_le_bytes());
        hasher.update(self.sample_rate.to_le_bytes());
        for sample in self.samples.iter() {
            hasher.update(sample.to_le_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
