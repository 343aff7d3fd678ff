//! Position readout
//!
//! A non-realtime thread polls the session position at a bounded rate and
//! publishes it over a channel. The audio callback never calls into UI code;
//! the UI only ever sees what this thread sends.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use tracing::debug;

use crate::engine::session::{PlaybackSession, Source};
use crate::error::Result;

/// Fastest allowed refresh (5 updates per second)
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(200);

/// Format `"MM:SS / MM:SS"` for a position and a total, both in frames
pub fn format_clock(current_frames: u64, total_frames: u64, sample_rate: u32) -> String {
    let rate = sample_rate.max(1) as u64;
    let cur = current_frames / rate;
    let tot = total_frames / rate;
    format!(
        "{:02}:{:02} / {:02}:{:02}",
        cur / 60,
        cur % 60,
        tot / 60,
        tot % 60
    )
}

/// Snapshot of the playback state for display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionUpdate {
    pub frame: u64,
    pub total_frames: u64,
    pub sample_rate: u32,
    pub playing: bool,
    pub source: Source,
}

impl PositionUpdate {
    pub fn capture(session: &PlaybackSession) -> Self {
        Self {
            frame: session.position(),
            total_frames: session.frame_count(),
            sample_rate: session.sample_rate(),
            playing: session.is_playing(),
            source: session.active_source(),
        }
    }

    /// Clock label for this update
    pub fn label(&self) -> String {
        format_clock(self.frame, self.total_frames, self.sample_rate)
    }
}

/// Background poller publishing [`PositionUpdate`]s
///
/// Dropping the monitor stops and joins its thread.
pub struct PositionMonitor {
    interval: Duration,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PositionMonitor {
    /// Start polling `session` every `interval` (raised to at least 200 ms)
    ///
    /// An update is sent on the first tick and afterwards only when
    /// something changed. The thread exits when the receiver is dropped or
    /// the monitor is stopped.
    pub fn spawn(
        session: Arc<PlaybackSession>,
        interval: Duration,
    ) -> Result<(Self, Receiver<PositionUpdate>)> {
        let interval = interval.max(MIN_REFRESH_INTERVAL);
        let (update_tx, update_rx) = channel::unbounded();
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name("duet-position".to_string())
            .spawn(move || poll_loop(session, interval, update_tx, stop_rx))?;

        debug!(interval_ms = interval.as_millis() as u64, "position monitor started");

        Ok((
            Self {
                interval,
                stop_tx: Some(stop_tx),
                handle: Some(handle),
            },
            update_rx,
        ))
    }

    /// Effective refresh interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Stop polling and wait for the thread to exit
    pub fn stop(&mut self) {
        // Dropping the sender disconnects the stop channel
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PositionMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll_loop(
    session: Arc<PlaybackSession>,
    interval: Duration,
    updates: Sender<PositionUpdate>,
    stop: Receiver<()>,
) {
    let ticker = channel::tick(interval);
    let mut last: Option<PositionUpdate> = None;

    loop {
        crossbeam::select! {
            recv(ticker) -> _ => {
                let update = PositionUpdate::capture(&session);
                if last == Some(update) {
                    continue;
                }
                if updates.send(update).is_err() {
                    break;
                }
                last = Some(update);
            }
            recv(stop) -> _ => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::AudioBuffer;

    fn session() -> Arc<PlaybackSession> {
        let a = Arc::new(AudioBuffer::silence(48000 * 90, 1, 48000));
        Arc::new(PlaybackSession::new(a.clone(), a).unwrap())
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0, 48000 * 90, 48000), "00:00 / 01:30");
        assert_eq!(format_clock(48000 * 61 + 10, 48000 * 3600, 48000), "01:01 / 60:00");
    }

    #[test]
    fn test_interval_is_rate_limited() {
        let (monitor, _rx) = PositionMonitor::spawn(session(), Duration::from_millis(10)).unwrap();
        assert_eq!(monitor.interval(), MIN_REFRESH_INTERVAL);
    }

    #[test]
    fn test_monitor_publishes_position() {
        let s = session();
        s.seek(48000 * 5);
        let (mut monitor, rx) = PositionMonitor::spawn(s.clone(), MIN_REFRESH_INTERVAL).unwrap();

        let update = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(update.frame, 48000 * 5);
        assert_eq!(update.label(), "00:05 / 01:30");
        assert!(!update.playing);

        s.seek(48000 * 6);
        let update = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(update.frame, 48000 * 6);

        monitor.stop();
        // After stop the sender is gone, so the channel drains and disconnects
        while rx.try_recv().is_ok() {}
        assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());
    }
}
