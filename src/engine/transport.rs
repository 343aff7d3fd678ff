//! Transport control
//!
//! The control thread's view of playback: play, stop, A/B source switching
//! and replacing the loaded session. The realtime side lives in
//! [`PlaybackEngine`]; the hardware side sits behind [`OutputDevice`].

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::engine::playback::PlaybackEngine;
use crate::engine::seek::SeekController;
use crate::engine::session::{PlaybackSession, Source};
use crate::error::{DuetError, Result};

/// Hardware output boundary
///
/// `start` hands the engine to the driver, which calls
/// [`PlaybackEngine::render`] once per block. A failed start must leave no
/// stream behind.
pub trait OutputDevice {
    /// Open a stream that pulls blocks of `block_frames` from `engine`
    fn start(&mut self, engine: PlaybackEngine, block_frames: u32) -> Result<()>;

    /// Close the stream if one is open
    fn stop(&mut self);

    /// Whether a stream is currently open
    fn is_running(&self) -> bool;
}

/// Transport states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Stopped => write!(f, "Stopped"),
            TransportState::Playing => write!(f, "Playing"),
        }
    }
}

/// Control-thread owner of a session and its output device
pub struct Transport<D: OutputDevice> {
    session: Arc<PlaybackSession>,
    device: D,
    block_frames: u32,
}

impl<D: OutputDevice> Transport<D> {
    /// Create a stopped transport for `session`
    pub fn new(session: Arc<PlaybackSession>, device: D, block_frames: u32) -> Self {
        Self {
            session,
            device,
            block_frames: block_frames.max(1),
        }
    }

    pub fn session(&self) -> &Arc<PlaybackSession> {
        &self.session
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn block_frames(&self) -> u32 {
        self.block_frames
    }

    /// Seek controller bound to the current session
    pub fn seek_controller(&self) -> SeekController {
        SeekController::new(self.session.clone())
    }

    // ========================================================================
    // Standard Transport Controls
    // ========================================================================

    /// Start playback from the current position
    ///
    /// Playing from the very end rewinds to the start first. If the device
    /// fails to start, the session stays stopped and the error is returned.
    pub fn play(&mut self) -> Result<()> {
        self.reap();
        if self.session.is_playing() {
            debug!("[TRANSPORT] Already playing");
            return Ok(());
        }

        if self.session.at_end() {
            self.session.seek(0);
        }

        self.session.set_playing(true);
        let engine = PlaybackEngine::new(self.session.clone());
        if let Err(e) = self.device.start(engine, self.block_frames) {
            self.session.set_playing(false);
            self.device.stop();
            warn!(error = %e, "[TRANSPORT] Output device failed to start");
            return Err(match e {
                DuetError::Device { .. } => e,
                other => DuetError::Device {
                    reason: other.to_string(),
                },
            });
        }

        info!(
            position = self.session.position(),
            source = %self.session.active_source(),
            "[TRANSPORT] Play"
        );
        Ok(())
    }

    /// Stop playback, keeping the position
    pub fn stop(&mut self) {
        self.session.set_playing(false);
        self.session.take_finished();
        if self.device.is_running() {
            self.device.stop();
        }
        debug!(position = self.session.position(), "[TRANSPORT] Stopped");
    }

    /// Play if stopped, stop if playing
    pub fn toggle(&mut self) -> Result<TransportState> {
        match self.state() {
            TransportState::Playing => self.stop(),
            TransportState::Stopped => self.play()?,
        }
        Ok(self.state())
    }

    /// Make `source` audible from the next block on
    pub fn select_source(&self, source: Source) {
        self.session.set_active_source(source);
        debug!(%source, position = self.session.position(), "[TRANSPORT] Source selected");
    }

    /// Flip between original and enhanced
    pub fn toggle_source(&self) -> Source {
        let source = self.session.toggle_source();
        debug!(%source, position = self.session.position(), "[TRANSPORT] Source toggled");
        source
    }

    /// Replace the loaded recording
    ///
    /// The old session is stopped and released; nothing carries over.
    pub fn load(&mut self, session: Arc<PlaybackSession>) {
        self.stop();
        self.session = session;
        info!(frames = self.session.frame_count(), "[TRANSPORT] New session loaded");
    }

    // ========================================================================
    // State Queries
    // ========================================================================

    pub fn state(&self) -> TransportState {
        if self.session.is_playing() {
            TransportState::Playing
        } else {
            TransportState::Stopped
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state() == TransportState::Playing
    }

    pub fn position(&self) -> u64 {
        self.session.position()
    }

    /// Close a stream whose engine already stopped at end of buffer
    ///
    /// Call this whenever the engine may have run off the end, e.g. on every
    /// position update. Returns `true` if playback had finished since the
    /// last call.
    pub fn reap(&mut self) -> bool {
        let finished = self.session.take_finished();
        if (finished || !self.session.is_playing()) && self.device.is_running() {
            self.device.stop();
            debug!(position = self.session.position(), "[TRANSPORT] Finished stream closed");
        }
        finished
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
