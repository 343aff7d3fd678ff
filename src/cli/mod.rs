//! CLI Module
//!
//! Command-line interface for Duet.

pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::engine::ExportEncoding;

/// Duet - compare original and AI-denoised audio
#[derive(Parser, Debug)]
#[command(name = "duet")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Denoise a recording and write the enhanced version
    #[command(name = "enhance")]
    Enhance(EnhanceArgs),

    /// Print format and level information for an audio file
    #[command(name = "info")]
    Info {
        /// Audio file
        file: PathBuf,
    },

    /// Play original and enhanced versions with A/B switching
    #[cfg(feature = "device")]
    #[command(name = "play")]
    Play {
        /// Original recording (source A)
        original: PathBuf,

        /// Enhanced recording (source B)
        enhanced: PathBuf,

        /// Output device name
        #[arg(short, long)]
        device: Option<String>,
    },

    /// Enhance a recording in memory, then A/B it against the original
    #[cfg(feature = "device")]
    #[command(name = "compare")]
    Compare {
        /// Recording to enhance and compare
        input: PathBuf,

        #[command(flatten)]
        model: ModelArgs,

        /// Output device name
        #[arg(short, long)]
        device: Option<String>,
    },

    /// List audio output devices
    #[cfg(feature = "device")]
    #[command(name = "devices")]
    Devices,
}

#[derive(Args, Debug)]
pub struct EnhanceArgs {
    /// Input recording
    pub input: PathBuf,

    /// Output WAV (default: <input>_enhanced.wav)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Output sample encoding (float32 or pcm16)
    #[arg(long)]
    pub encoding: Option<ExportEncoding>,

    /// Write a JSON processing report here
    #[arg(long)]
    pub report: Option<PathBuf>,
}

/// Enhancement options shared by `enhance` and `compare`
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Noise attenuation limit in dB (0 = unlimited)
    #[arg(long = "atten-lim")]
    pub atten_lim: Option<f32>,

    /// Window length in seconds
    #[arg(long)]
    pub window_secs: Option<f64>,

    /// Enhancement model
    #[arg(long, default_value = "gate")]
    pub model: String,
}

impl Default for ModelArgs {
    fn default() -> Self {
        Self {
            atten_lim: None,
            window_secs: None,
            model: "gate".to_string(),
        }
    }
}
