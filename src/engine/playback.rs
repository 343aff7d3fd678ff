//! Realtime playback engine
//!
//! [`PlaybackEngine::render`] is called from the audio driver's callback.
//! It only reads immutable sample data and a handful of atomics: no locks,
//! no allocation, no logging, no blocking.

use std::sync::Arc;

use crate::engine::session::{PlaybackSession, Source};

/// What the driver should do after the block just rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackFlow {
    /// Keep calling
    Continue,
    /// The block is the last one; stop the stream
    Stop,
}

/// Fills output blocks from the session's active buffer
#[derive(Debug, Clone)]
pub struct PlaybackEngine {
    session: Arc<PlaybackSession>,
    /// Source used for the most recent block
    last_source: Source,
}

impl PlaybackEngine {
    pub fn new(session: Arc<PlaybackSession>) -> Self {
        let last_source = session.active_source();
        Self {
            session,
            last_source,
        }
    }

    pub fn session(&self) -> &Arc<PlaybackSession> {
        &self.session
    }

    /// Source that filled the most recent block
    pub fn last_source(&self) -> Source {
        self.last_source
    }

    /// Render one interleaved block
    ///
    /// `out.len() / channels` is the block's frame capacity. The active
    /// source and the position are read once at the start, so a source
    /// switch takes effect on the next block, never inside this one.
    /// A block too short to hold one frame is rendered as silence and
    /// leaves the position alone.
    pub fn render(&mut self, out: &mut [f32]) -> CallbackFlow {
        let session = &*self.session;

        if !session.is_playing() {
            out.fill(0.0);
            return CallbackFlow::Stop;
        }

        let channels = session.channels();
        let block_frames = (out.len() / channels) as u64;
        let source = session.active_source();
        self.last_source = source;

        let buffer = session.buffer(source);
        let total = buffer.frame_count() as u64;
        let position = session.position().min(total);
        let remaining = total - position;

        let copy_frames = block_frames.min(remaining) as usize;
        let src = buffer.frames(position as usize, copy_frames);
        out[..src.len()].copy_from_slice(src);
        out[src.len()..].fill(0.0);

        if remaining == 0 || remaining < block_frames {
            // Position and notice are published before playing drops, so
            // whoever sees playback stopped also sees it parked at the end
            session.seek(total);
            session.mark_finished();
            session.set_playing(false);
            CallbackFlow::Stop
        } else {
            if block_frames > 0 {
                session.advance(position, position + block_frames);
            }
            CallbackFlow::Continue
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
