//! Seek controller
//!
//! Turns timeline gestures into position writes. Dragging only moves a
//! visual preview; the session position is written exactly once, on release
//! or on a plain click, so playback continues undisturbed while scrubbing.

use std::sync::Arc;

use tracing::debug;

use crate::engine::session::PlaybackSession;

/// Mediates user-driven position changes for one session
///
/// Owned by the control/UI thread.
#[derive(Debug)]
pub struct SeekController {
    session: Arc<PlaybackSession>,
    /// Preview frame while a press/drag is in progress
    preview: Option<u64>,
}

impl SeekController {
    pub fn new(session: Arc<PlaybackSession>) -> Self {
        Self {
            session,
            preview: None,
        }
    }

    /// Whether a drag is in progress
    pub fn is_dragging(&self) -> bool {
        self.preview.is_some()
    }

    /// Preview frame shown while dragging
    pub fn preview(&self) -> Option<u64> {
        self.preview
    }

    /// Pointer pressed on the timeline
    ///
    /// The preview starts at the current play position.
    pub fn press_start(&mut self) {
        self.preview = Some(self.session.position());
    }

    /// Pointer moved while pressed; updates the preview only
    pub fn drag_to(&mut self, frame: u64) {
        if self.preview.is_some() {
            self.preview = Some(self.clamp(frame));
        }
    }

    /// Pointer released at `frame`; commits the seek
    ///
    /// Returns the committed position.
    pub fn press_release(&mut self, frame: u64) -> u64 {
        self.preview = None;
        self.commit(frame)
    }

    /// Direct click on the timeline without dragging
    pub fn click_to(&mut self, frame: u64) -> u64 {
        self.preview = None;
        self.commit(frame)
    }

    /// Position to show in the readout
    ///
    /// While dragging this is the preview; otherwise the polled position.
    pub fn display_position(&self, polled: u64) -> u64 {
        self.preview.unwrap_or(polled)
    }

    fn clamp(&self, frame: u64) -> u64 {
        frame.min(self.session.frame_count())
    }

    fn commit(&self, frame: u64) -> u64 {
        let committed = self.session.seek(frame);
        debug!(frame = committed, "seek committed");
        committed
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
