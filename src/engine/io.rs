//! Audio file I/O for Duet
//!
//! Decodes WAV files into [`AudioBuffer`]s and writes enhanced buffers back
//! out as uncompressed PCM. Other containers go through the transcoder first
//! (see [`crate::engine::transcode`]).
//!
//! Sample rate conversion uses linear interpolation.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::buffer::AudioBuffer;
use crate::error::{DuetError, Result};

/// Sample encoding of exported WAV files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportEncoding {
    /// IEEE 32-bit float, lossless for our internal format
    #[default]
    Float32,
    /// Signed 16-bit integer PCM
    Pcm16,
}

impl ExportEncoding {
    fn spec(self, channels: u16, sample_rate: u32) -> WavSpec {
        match self {
            ExportEncoding::Float32 => WavSpec {
                channels,
                sample_rate,
                bits_per_sample: 32,
                sample_format: SampleFormat::Float,
            },
            ExportEncoding::Pcm16 => WavSpec {
                channels,
                sample_rate,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            },
        }
    }
}

impl std::str::FromStr for ExportEncoding {
    type Err = DuetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "float32" | "f32" => Ok(ExportEncoding::Float32),
            "pcm16" | "s16" | "i16" => Ok(ExportEncoding::Pcm16),
            other => Err(DuetError::UnsupportedFormat {
                format: format!("export encoding '{}' (use float32 or pcm16)", other),
            }),
        }
    }
}

/// Import a WAV file
///
/// Reads any integer bit depth or 32-bit float and converts to f32. If
/// `target_rate` is set and differs from the file's rate, every channel is
/// resampled to it.
///
/// # Errors
/// * `FileNotFound` - If the file does not exist
/// * `Decode` - If the file is not a valid WAV file
/// * `UnsupportedFormat` - For bit depths hound cannot represent
/// * `EmptyAudio` - If the file holds no frames
pub fn import_audio(path: &Path, target_rate: Option<u32>) -> Result<AudioBuffer> {
    if !path.exists() {
        return Err(DuetError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let reader = WavReader::open(path).map_err(|e| DuetError::Decode {
        reason: format!("Failed to open WAV file: {}", e),
        source: Some(Box::new(e)),
    })?;

    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(DuetError::decode("WAV header declares zero channels"));
    }

    let samples = decode_samples(reader)?;
    if samples.len() < channels {
        return Err(DuetError::EmptyAudio);
    }

    let buffer = AudioBuffer::from_interleaved(samples, channels, spec.sample_rate)?;
    debug!(
        path = %path.display(),
        channels,
        sample_rate = spec.sample_rate,
        frames = buffer.frame_count(),
        "decoded WAV"
    );

    match target_rate {
        Some(rate) if rate != buffer.sample_rate() => resample(&buffer, rate),
        _ => Ok(buffer),
    }
}

/// Export an AudioBuffer to a WAV file at the buffer's own sample rate
pub fn export_audio(buffer: &AudioBuffer, path: &Path, encoding: ExportEncoding) -> Result<()> {
    let channels = u16::try_from(buffer.channels()).map_err(|_| DuetError::Export {
        reason: format!("{} channels do not fit a WAV header", buffer.channels()),
    })?;
    let spec = encoding.spec(channels, buffer.sample_rate());

    let mut writer = WavWriter::create(path, spec).map_err(export_error)?;

    match encoding {
        ExportEncoding::Float32 => {
            for &sample in buffer.samples() {
                writer.write_sample(sample).map_err(export_error)?;
            }
        }
        ExportEncoding::Pcm16 => {
            for &sample in buffer.samples() {
                let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer.write_sample(scaled).map_err(export_error)?;
            }
        }
    }

    writer.finalize().map_err(export_error)?;
    debug!(path = %path.display(), ?encoding, "wrote WAV");

    Ok(())
}

/// Resample a buffer to `target_rate` with linear interpolation
///
/// Works frame by frame on the interleaved data. The last input frame is
/// held for output positions that fall past it.
pub fn resample(buffer: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
    if target_rate == 0 {
        return Err(DuetError::InvalidBuffer {
            reason: "target sample rate must be positive".to_string(),
        });
    }
    if target_rate == buffer.sample_rate() {
        return Ok(buffer.clone());
    }

    let channels = buffer.channels();
    let frames_in = buffer.frame_count();
    let step = buffer.sample_rate() as f64 / target_rate as f64;
    let frames_out = (frames_in as f64 / step).ceil() as usize;
    let last = frames_in.saturating_sub(1);
    let src = buffer.samples();

    let mut out = Vec::with_capacity(frames_out * channels);
    for n in 0..frames_out {
        let pos = n as f64 * step;
        let i = pos as usize;
        let t = (pos - i as f64) as f32;
        let (a, b) = (i.min(last) * channels, (i + 1).min(last) * channels);
        for ch in 0..channels {
            let (x0, x1) = (src[a + ch], src[b + ch]);
            out.push(x0 + (x1 - x0) * t);
        }
    }

    AudioBuffer::from_interleaved(out, channels, target_rate)
}

/// Generate a mono sine tone
pub fn generate_test_tone(frequency: f32, duration_secs: f32, sample_rate: u32) -> AudioBuffer {
    generate_stereo_test_tone(frequency, frequency, duration_secs, sample_rate, 1)
}

/// Generate a tone with different frequencies on the first two channels
///
/// With `channels == 1` only `freq_left` is used.
pub fn generate_stereo_test_tone(
    freq_left: f32,
    freq_right: f32,
    duration_secs: f32,
    sample_rate: u32,
    channels: usize,
) -> AudioBuffer {
    let channels = channels.clamp(1, 2);
    let frames = (duration_secs * sample_rate as f32) as usize;
    let w_l = 2.0 * std::f32::consts::PI * freq_left / sample_rate as f32;
    let w_r = 2.0 * std::f32::consts::PI * freq_right / sample_rate as f32;

    let mut samples = Vec::with_capacity(frames * channels);
    for i in 0..frames {
        samples.push((w_l * i as f32).sin());
        if channels == 2 {
            samples.push((w_r * i as f32).sin());
        }
    }

    AudioBuffer::from_interleaved(samples, channels, sample_rate)
        .unwrap_or_else(|_| AudioBuffer::silence(frames, channels, sample_rate))
}

// ============================================================================
// Internal helper functions
// ============================================================================

fn export_error(e: hound::Error) -> DuetError {
    match e {
        hound::Error::IoError(io) => DuetError::Io(io),
        other => DuetError::Export {
            reason: other.to_string(),
        },
    }
}

fn decode_error(spec: WavSpec, e: hound::Error) -> DuetError {
    DuetError::Decode {
        reason: format!(
            "bad {}-bit {:?} sample data: {}",
            spec.bits_per_sample, spec.sample_format, e
        ),
        source: Some(Box::new(e)),
    }
}

/// Decode every sample to f32, integers scaled into [-1, 1)
fn decode_samples<R: std::io::Read>(mut reader: WavReader<R>) -> Result<Vec<f32>> {
    let spec = reader.spec();
    match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(|e| decode_error(spec, e)),
        // hound widens every integer depth up to 32 bits into i32
        (SampleFormat::Int, bits @ 1..=32) => {
            let scale = 1.0 / (1u64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| decode_error(spec, e))
        }
        (format, bits) => Err(DuetError::UnsupportedFormat {
            format: format!("{}-bit {:?} WAV", bits, format),
        }),
    }
}

// ============================================================================
// Tests
// ============================================================================
