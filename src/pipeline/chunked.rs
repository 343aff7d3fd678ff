//! Chunked transform pipeline
//!
//! Feeds a recording through an [`Enhancer`] in fixed-size, non-overlapping
//! windows, strictly in order, and joins the results back together.
//!
//! Windows are cut at a fixed frame count, not at signal features, and the
//! enhancer starts fresh on every window. An enhancer that keeps internal
//! state across samples therefore produces slightly different audio around
//! each seam than one-shot processing would. That is accepted behaviour.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DuetConfig;
use crate::engine::buffer::AudioBuffer;
use crate::error::{DuetError, TransformError};
use crate::neural::Enhancer;

// ============================================================================
// Progress
// ============================================================================

/// Receives job progress as a percentage
///
/// Calls are non-decreasing, end with exactly one `100` on success and stop
/// altogether once a job fails.
pub trait ProgressSink {
    fn report(&mut self, percent: u8);
}

impl<F: FnMut(u8)> ProgressSink for F {
    fn report(&mut self, percent: u8) {
        self(percent)
    }
}

/// Sink that discards progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&mut self, _percent: u8) {}
}

/// Shared flag used to cancel a running job
///
/// Checked before each window and again when a window returns, so a job
/// cancelled during its last window still fails instead of completing.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ============================================================================
// Processing Job
// ============================================================================

/// Lifecycle of a processing job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed(String),
}

/// One enhancement request over a borrowed input buffer
///
/// Created per request and never reused.
#[derive(Debug)]
pub struct ProcessingJob<'a> {
    id: Uuid,
    input: &'a AudioBuffer,
    window_frames: usize,
    completed_frames: usize,
    state: JobState,
}

impl<'a> ProcessingJob<'a> {
    /// # Errors
    /// * `InvalidWindow` - `window_frames` is zero
    pub fn new(input: &'a AudioBuffer, window_frames: usize) -> Result<Self, TransformError> {
        if window_frames == 0 {
            return Err(TransformError::InvalidWindow {
                frames: window_frames,
            });
        }

        Ok(Self {
            id: Uuid::new_v4(),
            input,
            window_frames,
            completed_frames: 0,
            state: JobState::Pending,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn input(&self) -> &AudioBuffer {
        self.input
    }

    pub fn window_frames(&self) -> usize {
        self.window_frames
    }

    pub fn total_frames(&self) -> usize {
        self.input.frame_count()
    }

    pub fn completed_frames(&self) -> usize {
        self.completed_frames
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    /// Number of windows; the last one may be shorter
    pub fn window_count(&self) -> usize {
        self.total_frames().div_ceil(self.window_frames)
    }

    /// Frame ranges of every window, in order
    pub fn windows(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        let total = self.total_frames();
        (0..total)
            .step_by(self.window_frames)
            .map(move |start| start..(start + self.window_frames).min(total))
    }

    /// Completed share of the input, clamped to `0..=100`
    pub fn progress_percent(&self) -> u8 {
        let total = self.total_frames();
        if total == 0 {
            return 100;
        }
        ((self.completed_frames as u128 * 100 / total as u128).min(100)) as u8
    }

    fn fail(&mut self, error: TransformError) -> TransformError {
        warn!(job_id = %self.id, error = %error, "enhancement job failed");
        self.state = JobState::Failed(error.to_string());
        error
    }
}

// ============================================================================
// Report
// ============================================================================

/// Summary of a finished job
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingReport {
    pub job_id: Uuid,
    pub enhancer: String,
    pub windows: usize,
    pub window_frames: usize,
    pub frames: usize,
    pub channels: usize,
    pub sample_rate: u32,
    pub attenuation_limit_db: f32,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// SHA-256 of the output samples
    pub checksum: String,
}

/// Enhanced buffer plus its report
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub buffer: AudioBuffer,
    pub report: ProcessingReport,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Runs an enhancer over a recording window by window
#[derive(Clone)]
pub struct ChunkedTransformPipeline {
    enhancer: Arc<dyn Enhancer>,
    window_frames: usize,
    cancel: CancelToken,
}

impl ChunkedTransformPipeline {
    pub fn new(enhancer: Arc<dyn Enhancer>, window_frames: usize) -> Self {
        Self {
            enhancer,
            window_frames,
            cancel: CancelToken::new(),
        }
    }

    /// Pipeline with the configured window length at `sample_rate`
    pub fn from_config(enhancer: Arc<dyn Enhancer>, config: &DuetConfig, sample_rate: u32) -> Self {
        Self::new(enhancer, config.window_frames(sample_rate))
    }

    /// Share a cancel token with whoever may abort the job
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn window_frames(&self) -> usize {
        self.window_frames
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Enhance `input` and return the joined output
    pub fn run(
        &self,
        input: &AudioBuffer,
        attenuation_limit_db: f32,
        sink: &mut dyn ProgressSink,
    ) -> Result<AudioBuffer, TransformError> {
        let mut job = ProcessingJob::new(input, self.window_frames)?;
        self.run_job(&mut job, attenuation_limit_db, sink)
            .map(|output| output.buffer)
    }

    /// Drive `job` to completion
    ///
    /// On any failure the job is marked `Failed`, everything transformed so
    /// far is dropped and no further progress is reported.
    pub fn run_job(
        &self,
        job: &mut ProcessingJob<'_>,
        attenuation_limit_db: f32,
        sink: &mut dyn ProgressSink,
    ) -> Result<PipelineOutput, TransformError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let input = job.input;
        let channels = input.channels();
        let ranges: Vec<Range<usize>> = job.windows().collect();

        job.state = JobState::Running;
        info!(
            job_id = %job.id,
            enhancer = self.enhancer.id(),
            frames = job.total_frames(),
            windows = ranges.len(),
            window_frames = job.window_frames,
            "enhancement job started"
        );

        let mut samples: Vec<f32> = Vec::with_capacity(input.samples().len());

        for (index, range) in ranges.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(job.fail(TransformError::Cancelled {
                    completed_windows: index,
                }));
            }

            let window = input.window(range.start, range.len());
            let enhanced = match self.enhancer.enhance(&window, attenuation_limit_db) {
                Ok(enhanced) => enhanced,
                Err(source) => {
                    return Err(job.fail(TransformError::WindowFailed {
                        index,
                        source: Box::new(source),
                    }))
                }
            };

            if enhanced.channels() != channels {
                return Err(job.fail(TransformError::ChannelMismatch {
                    index,
                    expected: channels,
                    actual: enhanced.channels(),
                }));
            }
            if enhanced.frame_count() != range.len() {
                return Err(job.fail(TransformError::LengthMismatch {
                    index,
                    expected: range.len(),
                    actual: enhanced.frame_count(),
                }));
            }
            if enhanced.sample_rate() != input.sample_rate() {
                return Err(job.fail(TransformError::WindowFailed {
                    index,
                    source: Box::new(DuetError::Enhancer {
                        reason: format!(
                            "sample rate changed from {} to {} Hz",
                            input.sample_rate(),
                            enhanced.sample_rate()
                        ),
                    }),
                }));
            }

            // Cancelled while this window ran: its output is discarded
            if self.cancel.is_cancelled() {
                return Err(job.fail(TransformError::Cancelled {
                    completed_windows: index,
                }));
            }

            samples.extend_from_slice(enhanced.samples());
            job.completed_frames = range.end;

            let percent = job.progress_percent();
            debug!(job_id = %job.id, window = index, frames = range.len(), percent, "window done");
            sink.report(percent);
        }

        // An empty input has no windows but still completes
        if ranges.is_empty() {
            sink.report(100);
        }

        let buffer = AudioBuffer::from_interleaved(samples, channels, input.sample_rate())
            .map_err(|e| {
                job.fail(TransformError::WindowFailed {
                    index: ranges.len().saturating_sub(1),
                    source: Box::new(e),
                })
            })?;

        job.state = JobState::Completed;
        let elapsed_ms = clock.elapsed().as_millis() as u64;
        info!(job_id = %job.id, elapsed_ms, "enhancement job completed");

        let report = ProcessingReport {
            job_id: job.id,
            enhancer: self.enhancer.id().to_string(),
            windows: ranges.len(),
            window_frames: job.window_frames,
            frames: buffer.frame_count(),
            channels,
            sample_rate: buffer.sample_rate(),
            attenuation_limit_db,
            started_at,
            elapsed_ms,
            checksum: buffer.checksum(),
        };

        Ok(PipelineOutput { buffer, report })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::neural::{EnhancerInfo, NoiseGate};
    use std::sync::Mutex;

    fn info(id: &str) -> EnhancerInfo {
        EnhancerInfo {
            id: id.to_string(),
            name: id.to_string(),
            version: "test".to_string(),
            sample_rate: None,
            stateful: false,
        }
    }

    /// Halves every sample and records window lengths
    struct Halve {
        info: EnhancerInfo,
        calls: Mutex<Vec<usize>>,
    }

    impl Halve {
        fn new() -> Self {
            Self {
                info: info("halve"),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl Enhancer for Halve {
        fn info(&self) -> &EnhancerInfo {
            &self.info
        }

        fn enhance(&self, window: &AudioBuffer, _db: f32) -> Result<AudioBuffer> {
            self.calls.lock().unwrap().push(window.frame_count());
            let out = window.samples().iter().map(|s| s * 0.5).collect();
            AudioBuffer::from_interleaved(out, window.channels(), window.sample_rate())
        }
    }

    fn ramp(frames: usize) -> AudioBuffer {
        AudioBuffer::from_interleaved((0..frames * 2).map(|i| i as f32).collect(), 2, 48000).unwrap()
    }

    #[test]
    fn test_zero_window_rejected() {
        let input = ramp(10);
        assert!(matches!(
            ProcessingJob::new(&input, 0),
            Err(TransformError::InvalidWindow { frames: 0 })
        ));
    }

    #[test]
    fn test_job_windows() {
        let input = ramp(25);
        let job = ProcessingJob::new(&input, 10).unwrap();
        let windows: Vec<_> = job.windows().collect();
        assert_eq!(windows, vec![0..10, 10..20, 20..25]);
        assert_eq!(job.window_count(), 3);
        assert_eq!(job.state(), &JobState::Pending);
        assert_eq!(job.progress_percent(), 0);
    }

    #[test]
    fn test_run_preserves_order_and_length() {
        let halve = Arc::new(Halve::new());
        let pipeline = ChunkedTransformPipeline::new(halve.clone(), 10);
        let input = ramp(25);

        let mut reports = Vec::new();
        let output = pipeline
            .run(&input, 0.0, &mut |p: u8| reports.push(p))
            .unwrap();

        assert_eq!(output.frame_count(), 25);
        assert_eq!(output.samples()[49], 24.5);
        assert_eq!(*halve.calls.lock().unwrap(), vec![10, 10, 5]);
        assert_eq!(reports, vec![40, 80, 100]);
    }

    #[test]
    fn test_job_state_and_report() {
        let pipeline = ChunkedTransformPipeline::new(Arc::new(NoiseGate::default()), 10);
        let input = ramp(25);
        let mut job = ProcessingJob::new(&input, 10).unwrap();

        let output = pipeline.run_job(&mut job, 6.0, &mut NullProgress).unwrap();
        assert_eq!(job.state(), &JobState::Completed);
        assert_eq!(job.completed_frames(), 25);
        assert_eq!(output.report.windows, 3);
        assert_eq!(output.report.enhancer, "gate");
        assert_eq!(output.report.checksum, output.buffer.checksum());
        assert_eq!(output.report.job_id, job.id());
    }

    #[test]
    fn test_empty_input_reports_100_once() {
        let pipeline = ChunkedTransformPipeline::new(Arc::new(Halve::new()), 10);
        let input = AudioBuffer::silence(0, 2, 48000);

        let mut reports = Vec::new();
        let output = pipeline.run(&input, 0.0, &mut |p: u8| reports.push(p)).unwrap();
        assert!(output.is_empty());
        assert_eq!(reports, vec![100]);
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancelToken::new();
        let pipeline =
            ChunkedTransformPipeline::new(Arc::new(Halve::new()), 10).with_cancel_token(cancel.clone());
        cancel.cancel();

        let input = ramp(25);
        let mut job = ProcessingJob::new(&input, 10).unwrap();
        let mut reports = Vec::new();
        let err = pipeline
            .run_job(&mut job, 0.0, &mut |p: u8| reports.push(p))
            .unwrap_err();

        assert!(matches!(err, TransformError::Cancelled { completed_windows: 0 }));
        assert!(matches!(job.state(), JobState::Failed(_)));
        assert!(reports.is_empty());
    }
}
