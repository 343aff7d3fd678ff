//! Error handling for Duet
//!
//! Decode, device and configuration errors are recoverable locally (the user
//! can retry with another file or device). Transform errors abort the whole
//! enhancement job and never deliver partial output.

use thiserror::Error;

/// Result type alias for Duet operations
pub type Result<T> = std::result::Result<T, DuetError>;

/// Failures of a chunked enhancement job
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Enhancement failed on window {index}: {source}")]
    WindowFailed {
        index: usize,
        #[source]
        source: Box<DuetError>,
    },

    #[error("Window {index} changed length: expected {expected} frames, got {actual}")]
    LengthMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Window {index} changed channel count: expected {expected}, got {actual}")]
    ChannelMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid window size: {frames} frames")]
    InvalidWindow { frames: usize },

    #[error("Job cancelled after {completed_windows} window(s)")]
    Cancelled { completed_windows: usize },
}

/// Main error type for Duet operations
#[derive(Error, Debug)]
pub enum DuetError {
    // Decode Errors
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Could not decode audio: {reason}")]
    Decode {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Transcoder '{program}' failed ({status}): {stderr}")]
    Transcode {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Audio contains no samples")]
    EmptyAudio,

    #[error("Invalid audio buffer: {reason}")]
    InvalidBuffer { reason: String },

    // Session Errors
    #[error("Sources differ in {what}: A has {a}, B has {b}")]
    SessionMismatch { what: &'static str, a: u64, b: u64 },

    // Processing Errors
    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("Enhancer error: {reason}")]
    Enhancer { reason: String },

    // Device Errors
    #[error("Audio device error: {reason}")]
    Device { reason: String },

    // Configuration / Output Errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Export failed: {reason}")]
    Export { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DuetError {
    /// Shorthand for a decode error without an underlying cause
    pub fn decode(reason: impl Into<String>) -> Self {
        DuetError::Decode {
            reason: reason.into(),
            source: None,
        }
    }

    /// Get a stable error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            DuetError::FileNotFound { .. } => "FILE_NOT_FOUND",
            DuetError::Decode { .. } => "DECODE_ERROR",
            DuetError::Transcode { .. } => "TRANSCODE_ERROR",
            DuetError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            DuetError::EmptyAudio => "EMPTY_AUDIO",
            DuetError::InvalidBuffer { .. } => "INVALID_BUFFER",
            DuetError::SessionMismatch { .. } => "SESSION_MISMATCH",
            DuetError::Transform(TransformError::WindowFailed { .. }) => "WINDOW_FAILED",
            DuetError::Transform(TransformError::LengthMismatch { .. }) => "LENGTH_MISMATCH",
            DuetError::Transform(TransformError::ChannelMismatch { .. }) => "CHANNEL_MISMATCH",
            DuetError::Transform(TransformError::InvalidWindow { .. }) => "INVALID_WINDOW",
            DuetError::Transform(TransformError::Cancelled { .. }) => "CANCELLED",
            DuetError::Enhancer { .. } => "ENHANCER_ERROR",
            DuetError::Device { .. } => "DEVICE_ERROR",
            DuetError::InvalidConfig { .. } => "INVALID_CONFIG",
            DuetError::Export { .. } => "EXPORT_ERROR",
            DuetError::Io(_) => "IO_ERROR",
            DuetError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether the user can retry locally (another file, device or setting)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DuetError::FileNotFound { .. }
                | DuetError::Decode { .. }
                | DuetError::Transcode { .. }
                | DuetError::UnsupportedFormat { .. }
                | DuetError::EmptyAudio
                | DuetError::Device { .. }
                | DuetError::InvalidConfig { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            DuetError::FileNotFound { .. } => vec![
                "Check the file path is correct",
                "Verify the file hasn't been moved or deleted",
            ],
            DuetError::Decode { .. } | DuetError::UnsupportedFormat { .. } => vec![
                "Try converting the file to WAV format first",
                "Check if the file plays in another application",
            ],
            DuetError::Transcode { .. } => vec![
                "Make sure ffmpeg is installed and on PATH",
                "Set DUET_TRANSCODER to the transcoder binary",
            ],
            DuetError::Device { .. } => vec![
                "Check that an output device is connected",
                "Try a different output device",
            ],
            DuetError::Transform(TransformError::WindowFailed { .. }) => vec![
                "Check the enhancement model is installed",
                "Try a shorter window size",
            ],
            DuetError::InvalidConfig { .. } => vec!["Fix the configuration file and try again"],
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = DuetError::FileNotFound {
            path: "test.wav".to_string(),
        };
        assert_eq!(err.error_code(), "FILE_NOT_FOUND");

        let err: DuetError = TransformError::LengthMismatch {
            index: 2,
            expected: 100,
            actual: 99,
        }
        .into();
        assert_eq!(err.error_code(), "LENGTH_MISMATCH");
    }

    #[test]
    fn test_transform_errors_are_not_recoverable() {
        let err: DuetError = TransformError::WindowFailed {
            index: 0,
            source: Box::new(DuetError::Enhancer {
                reason: "model crashed".to_string(),
            }),
        }
        .into();
        assert!(!err.is_recoverable());
        assert!(!err.recovery_suggestions().is_empty());
        assert!(err.to_string().contains("window 0"));
    }

    #[test]
    fn test_device_errors_are_recoverable() {
        let err = DuetError::Device {
            reason: "no output device".to_string(),
        };
        assert!(err.is_recoverable());
        assert_eq!(err.error_code(), "DEVICE_ERROR");
    }
}
