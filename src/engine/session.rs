//! Playback Session
//!
//! One loaded recording: the original (source A) and the enhanced version
//! (source B), one authoritative play position shared by both, the active
//! source selector and the playing flag.
//!
//! The two buffers are never swapped or mutated. Loading a new recording
//! builds a new session. The only mutable state is a few atomics, which the
//! realtime callback, the control thread and the position monitor all touch
//! without locks.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crate::engine::buffer::AudioBuffer;
use crate::error::{DuetError, Result};

/// Which of the two time-aligned buffers is audible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Source {
    /// Source A: the recording as loaded
    Original,
    /// Source B: the denoised recording
    #[default]
    Enhanced,
}

impl Source {
    /// The other source
    pub fn other(self) -> Self {
        match self {
            Source::Original => Source::Enhanced,
            Source::Enhanced => Source::Original,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Source::Original => 0,
            Source::Enhanced => 1,
        }
    }

    fn from_u8(value: u8) -> Self {
        if value == 0 {
            Source::Original
        } else {
            Source::Enhanced
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Original => write!(f, "Original"),
            Source::Enhanced => write!(f, "Enhanced"),
        }
    }
}

/// Two time-aligned buffers plus lock-free playback state
#[derive(Debug)]
pub struct PlaybackSession {
    original: Arc<AudioBuffer>,
    enhanced: Arc<AudioBuffer>,
    /// Play position in frames, always within `[0, frame_count]`
    position: AtomicU64,
    active: AtomicU8,
    playing: AtomicBool,
    /// Set by the engine when playback ran off the end; consumed by the transport
    finished: AtomicBool,
}

impl PlaybackSession {
    /// Pair an original recording with its enhanced version
    ///
    /// # Errors
    /// * `SessionMismatch` - the buffers differ in frame count, sample rate
    ///   or channel count
    pub fn new(original: Arc<AudioBuffer>, enhanced: Arc<AudioBuffer>) -> Result<Self> {
        check_equal("frame count", original.frame_count() as u64, enhanced.frame_count() as u64)?;
        check_equal("sample rate", original.sample_rate() as u64, enhanced.sample_rate() as u64)?;
        check_equal("channel count", original.channels() as u64, enhanced.channels() as u64)?;

        Ok(Self {
            original,
            enhanced,
            position: AtomicU64::new(0),
            active: AtomicU8::new(Source::default().to_u8()),
            playing: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        })
    }

    /// Buffer for the given source
    #[inline]
    pub fn buffer(&self, source: Source) -> &AudioBuffer {
        match source {
            Source::Original => &self.original,
            Source::Enhanced => &self.enhanced,
        }
    }

    /// Frames in either buffer
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.original.frame_count() as u64
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.original.channels()
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.original.sample_rate()
    }

    // ========================================================================
    // Position
    // ========================================================================

    /// Current play position in frames (lock-free)
    #[inline]
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    /// Overwrite the play position, clamped to `[0, frame_count]`
    ///
    /// Returns the position actually stored.
    pub fn seek(&self, frame: u64) -> u64 {
        let clamped = frame.min(self.frame_count());
        self.position.store(clamped, Ordering::Release);
        clamped
    }

    /// Move the position from `from` to `to` unless someone seeked meanwhile
    ///
    /// Used by the playback engine after filling a block. If a seek landed
    /// between the engine's read and this write, the seek wins and `false`
    /// is returned.
    #[inline]
    pub(crate) fn advance(&self, from: u64, to: u64) -> bool {
        self.position
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    // ========================================================================
    // Source selection
    // ========================================================================

    /// Currently audible source (lock-free)
    #[inline]
    pub fn active_source(&self) -> Source {
        Source::from_u8(self.active.load(Ordering::Acquire))
    }

    /// Select the audible source; the position is left untouched
    pub fn set_active_source(&self, source: Source) {
        self.active.store(source.to_u8(), Ordering::Release);
    }

    /// Flip between original and enhanced, returning the new source
    pub fn toggle_source(&self) -> Source {
        let previous = self.active.fetch_xor(1, Ordering::AcqRel);
        Source::from_u8(previous ^ 1)
    }

    // ========================================================================
    // Playing flag
    // ========================================================================

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    /// Record that playback reached the end and the stream should be reaped
    #[inline]
    pub(crate) fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    /// Consume the end-of-playback notice left by the engine
    ///
    /// Returns `true` at most once per run-off.
    pub fn take_finished(&self) -> bool {
        self.finished.swap(false, Ordering::AcqRel)
    }

    /// Whether the position has reached the end of the buffers
    #[inline]
    pub fn at_end(&self) -> bool {
        self.position() >= self.frame_count()
    }

    /// Position in seconds
    pub fn position_secs(&self) -> f64 {
        self.position() as f64 / self.sample_rate() as f64
    }
}

fn check_equal(what: &'static str, a: u64, b: u64) -> Result<()> {
    if a == b {
        Ok(())
    } else {
        Err(DuetError::SessionMismatch { what, a, b })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn session(frames: usize) -> PlaybackSession {
        let a = Arc::new(AudioBuffer::silence(frames, 2, 48000));
        let b = Arc::new(AudioBuffer::silence(frames, 2, 48000));
        PlaybackSession::new(a, b).unwrap()
    }

    #[test]
    fn test_new_session_defaults() {
        let s = session(1000);
        assert_eq!(s.position(), 0);
        assert_eq!(s.active_source(), Source::Enhanced);
        assert!(!s.is_playing());
        assert_eq!(s.frame_count(), 1000);
    }

    #[test]
    fn test_mismatched_frame_count_rejected() {
        let a = Arc::new(AudioBuffer::silence(1000, 2, 48000));
        let b = Arc::new(AudioBuffer::silence(999, 2, 48000));
        match PlaybackSession::new(a, b) {
            Err(DuetError::SessionMismatch { what, a, b }) => {
                assert_eq!(what, "frame count");
                assert_eq!((a, b), (1000, 999));
            }
            other => panic!("expected SessionMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_mismatched_rate_and_channels_rejected() {
        let a = Arc::new(AudioBuffer::silence(100, 2, 48000));
        let b = Arc::new(AudioBuffer::silence(100, 2, 44100));
        assert!(PlaybackSession::new(a.clone(), b).is_err());

        let c = Arc::new(AudioBuffer::silence(100, 1, 48000));
        assert!(PlaybackSession::new(a, c).is_err());
    }

    #[test]
    fn test_seek_clamps_to_frame_count() {
        let s = session(1000);
        assert_eq!(s.seek(500), 500);
        assert_eq!(s.seek(5000), 1000);
        assert!(s.at_end());
    }

    #[test]
    fn test_toggle_source_keeps_position() {
        let s = session(1000);
        s.seek(321);
        assert_eq!(s.toggle_source(), Source::Original);
        assert_eq!(s.position(), 321);
        assert_eq!(s.toggle_source(), Source::Enhanced);
        assert_eq!(s.position(), 321);
    }

    #[test]
    fn test_advance_loses_to_concurrent_seek() {
        let s = session(1000);
        s.seek(100);
        assert!(s.advance(100, 164));
        assert_eq!(s.position(), 164);

        // A seek between the engine's read and its write wins
        s.seek(10);
        assert!(!s.advance(164, 228));
        assert_eq!(s.position(), 10);
    }

    #[test]
    fn test_finished_notice_is_taken_once() {
        let s = session(10);
        assert!(!s.take_finished());
        s.mark_finished();
        assert!(s.take_finished());
        assert!(!s.take_finished());
    }
}
