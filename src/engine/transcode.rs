//! External transcoder
//!
//! Compressed containers (m4a, mp3, aac, ...) are converted to WAV by an
//! external program before decoding. The transcoder is opaque: it either
//! produces a file or exits nonzero with diagnostic text on stderr.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::engine::buffer::AudioBuffer;
use crate::engine::io::import_audio;
use crate::error::{DuetError, Result};

/// Extensions decoded directly without the transcoder
const NATIVE_EXTENSIONS: &[&str] = &["wav", "wave"];

/// Check whether a file must be transcoded before decoding
pub fn needs_transcoding(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => !NATIVE_EXTENSIONS
            .iter()
            .any(|native| ext.eq_ignore_ascii_case(native)),
        None => true,
    }
}

/// Wrapper around the transcoder executable (ffmpeg-compatible CLI)
#[derive(Debug, Clone)]
pub struct Transcoder {
    program: String,
}

impl Default for Transcoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Transcoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Convert `input` to a WAV file at `output`
    ///
    /// Runs `<program> -y -i <input> <output>` and waits for it.
    ///
    /// # Errors
    /// * `FileNotFound` - input does not exist
    /// * `Transcode` - the program could not be spawned or exited nonzero
    pub fn to_wav(&self, input: &Path, output: &Path) -> Result<()> {
        if !input.exists() {
            return Err(DuetError::FileNotFound {
                path: input.display().to_string(),
            });
        }

        debug!(program = %self.program, input = %input.display(), "transcoding");

        let result = Command::new(&self.program)
            .arg("-y")
            .arg("-i")
            .arg(input)
            .arg(output)
            .output()
            .map_err(|e| DuetError::Transcode {
                program: self.program.clone(),
                status: "spawn failed".to_string(),
                stderr: e.to_string(),
            })?;

        if !result.status.success() {
            return Err(DuetError::Transcode {
                program: self.program.clone(),
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        if !output.exists() {
            return Err(DuetError::Transcode {
                program: self.program.clone(),
                status: result.status.to_string(),
                stderr: format!("no output written to {}", output.display()),
            });
        }

        Ok(())
    }
}

/// Load a recording from any supported file
///
/// WAV files are decoded directly. Everything else is transcoded into a
/// scratch directory first; the scratch file is removed when this returns,
/// whether decoding succeeded or not.
pub fn load_recording(
    path: &Path,
    transcoder: &Transcoder,
    target_rate: Option<u32>,
) -> Result<AudioBuffer> {
    if !path.exists() {
        return Err(DuetError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let buffer = if needs_transcoding(path) {
        let scratch = tempfile::Builder::new().prefix("duet-transcode").tempdir()?;
        let wav: PathBuf = scratch.path().join("converted.wav");
        transcoder.to_wav(path, &wav)?;
        import_audio(&wav, target_rate)?
    } else {
        import_audio(path, target_rate)?
    };

    info!(
        path = %path.display(),
        frames = buffer.frame_count(),
        channels = buffer.channels(),
        sample_rate = buffer.sample_rate(),
        "recording loaded"
    );

    Ok(buffer)
}

/// Default output path: `<stem>_enhanced.wav` beside the input
pub fn enhanced_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}_enhanced.wav", stem))
}
