//! Duet - A/B comparison of original and denoised audio
//!
//! Duet runs a noisy recording through a speech enhancement model and plays
//! the original and enhanced versions back in lockstep, so a listener can
//! flip between them at any point without losing their place.
//!
//! # Architecture
//!
//! - [`pipeline`]: windowed enhancement of a whole recording, with progress
//! - [`neural`]: the [`Enhancer`](neural::Enhancer) boundary and its implementations
//! - [`engine`]: buffers, file I/O and the playback side (session, realtime
//!   engine, seeking, position readout, transport)
//!
//! Both sources of a [`PlaybackSession`](engine::PlaybackSession) share one
//! position. Switching source changes only which buffer the next block is
//! read from.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod neural;
pub mod pipeline;

pub use config::DuetConfig;
pub use error::{DuetError, Result, TransformError};
