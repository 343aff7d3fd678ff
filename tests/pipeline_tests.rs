//! Pipeline Integration Tests
//!
//! Windowing, ordering, progress and failure behaviour of the chunked
//! enhancement pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use duet::engine::AudioBuffer;
use duet::neural::{Enhancer, EnhancerInfo, NoiseGate};
use duet::pipeline::{
    CancelToken, ChunkedTransformPipeline, EnhanceOptions, EnhanceWorker, JobEvent, JobState,
    ProcessingJob,
};
use duet::{DuetConfig, DuetError, Result, TransformError};

fn test_info(id: &str) -> EnhancerInfo {
    EnhancerInfo {
        id: id.to_string(),
        name: id.to_string(),
        version: "test".to_string(),
        sample_rate: None,
        stateful: false,
    }
}

/// Returns its input unchanged and records every window length
struct Passthrough {
    info: EnhancerInfo,
    windows: Mutex<Vec<usize>>,
}

impl Passthrough {
    fn new() -> Self {
        Self {
            info: test_info("passthrough"),
            windows: Mutex::new(Vec::new()),
        }
    }

    fn windows(&self) -> Vec<usize> {
        self.windows.lock().unwrap().clone()
    }
}

impl Enhancer for Passthrough {
    fn info(&self) -> &EnhancerInfo {
        &self.info
    }

    fn enhance(&self, window: &AudioBuffer, _db: f32) -> Result<AudioBuffer> {
        self.windows.lock().unwrap().push(window.frame_count());
        Ok(window.clone())
    }
}

/// Fails on the window with the given index
struct FailsAt {
    info: EnhancerInfo,
    index: usize,
    calls: AtomicUsize,
}

impl FailsAt {
    fn new(index: usize) -> Self {
        Self {
            info: test_info("fails"),
            index,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Enhancer for FailsAt {
    fn info(&self) -> &EnhancerInfo {
        &self.info
    }

    fn enhance(&self, window: &AudioBuffer, _db: f32) -> Result<AudioBuffer> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.index {
            return Err(DuetError::Enhancer {
                reason: "model crashed".to_string(),
            });
        }
        Ok(window.clone())
    }
}

/// Drops the last frame of every window
struct Truncates {
    info: EnhancerInfo,
}

impl Enhancer for Truncates {
    fn info(&self) -> &EnhancerInfo {
        &self.info
    }

    fn enhance(&self, window: &AudioBuffer, _db: f32) -> Result<AudioBuffer> {
        Ok(window.window(0, window.frame_count().saturating_sub(1)))
    }
}

/// Folds every frame down to mono
struct Downmix {
    info: EnhancerInfo,
}

impl Enhancer for Downmix {
    fn info(&self) -> &EnhancerInfo {
        &self.info
    }

    fn enhance(&self, window: &AudioBuffer, _db: f32) -> Result<AudioBuffer> {
        let mono = window
            .samples()
            .chunks_exact(window.channels())
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();
        AudioBuffer::from_interleaved(mono, 1, window.sample_rate())
    }
}

/// One-pole smoother whose state starts from zero on every call
struct Smoother {
    info: EnhancerInfo,
}

impl Enhancer for Smoother {
    fn info(&self) -> &EnhancerInfo {
        &self.info
    }

    fn enhance(&self, window: &AudioBuffer, _db: f32) -> Result<AudioBuffer> {
        let mut state = 0.0_f32;
        let out = window
            .samples()
            .iter()
            .map(|&x| {
                state = 0.5 * x + 0.5 * state;
                state
            })
            .collect();
        AudioBuffer::from_interleaved(out, 1, window.sample_rate())
    }
}

/// Cancels its job from inside the window with the given index
struct CancelsDuring {
    info: EnhancerInfo,
    index: usize,
    calls: AtomicUsize,
    cancel: CancelToken,
}

impl Enhancer for CancelsDuring {
    fn info(&self) -> &EnhancerInfo {
        &self.info
    }

    fn enhance(&self, window: &AudioBuffer, _db: f32) -> Result<AudioBuffer> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.index {
            self.cancel.cancel();
        }
        Ok(window.clone())
    }
}

fn mono_ramp(frames: usize) -> AudioBuffer {
    AudioBuffer::from_interleaved((0..frames).map(|i| i as f32).collect(), 1, 48000).unwrap()
}

// === Windowing ===

#[test]
fn test_recording_shorter_than_window_is_one_call() {
    // 28.125 s of stereo at 48 kHz against the default 30 s window
    let input = AudioBuffer::silence(1_350_000, 2, 48000);
    let passthrough = Arc::new(Passthrough::new());
    let pipeline =
        ChunkedTransformPipeline::from_config(passthrough.clone(), &DuetConfig::default(), 48000);
    assert_eq!(pipeline.window_frames(), 1_440_000);

    let mut reports = Vec::new();
    let output = pipeline
        .run(&input, 0.0, &mut |p: u8| reports.push(p))
        .unwrap();

    assert_eq!(passthrough.windows(), vec![1_350_000]);
    assert_eq!(reports, vec![100]);
    assert_eq!(output.frame_count(), 1_350_000);
    assert_eq!(output.channels(), 2);
}

#[test]
fn test_long_recording_splits_into_windows() {
    let input = AudioBuffer::silence(3_000_000, 1, 48000);
    let passthrough = Arc::new(Passthrough::new());
    let pipeline = ChunkedTransformPipeline::new(passthrough.clone(), 1_440_000);

    let mut reports = Vec::new();
    let output = pipeline
        .run(&input, 0.0, &mut |p: u8| reports.push(p))
        .unwrap();

    assert_eq!(passthrough.windows(), vec![1_440_000, 1_440_000, 120_000]);
    assert_eq!(reports, vec![48, 96, 100]);
    assert_eq!(output.frame_count(), 3_000_000);
}

#[test]
fn test_exact_multiple_has_no_empty_tail() {
    let input = mono_ramp(30);
    let passthrough = Arc::new(Passthrough::new());
    let pipeline = ChunkedTransformPipeline::new(passthrough.clone(), 10);

    pipeline.run(&input, 0.0, &mut |_: u8| {}).unwrap();
    assert_eq!(passthrough.windows(), vec![10, 10, 10]);
}

#[test]
fn test_windows_are_joined_in_order() {
    let input = mono_ramp(95);
    let pipeline = ChunkedTransformPipeline::new(Arc::new(Passthrough::new()), 10);

    let output = pipeline.run(&input, 0.0, &mut |_: u8| {}).unwrap();
    assert_eq!(output, input);
}

#[test]
fn test_progress_is_non_decreasing_and_ends_at_100() {
    let input = mono_ramp(1000);
    let pipeline = ChunkedTransformPipeline::new(Arc::new(NoiseGate::default()), 7);

    let mut reports = Vec::new();
    pipeline.run(&input, 0.0, &mut |p: u8| reports.push(p)).unwrap();

    assert!(reports.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(reports.iter().filter(|&&p| p == 100).count(), 1);
    assert_eq!(reports.last(), Some(&100));
}

#[test]
fn test_rerun_is_deterministic() {
    let input = duet::engine::io::generate_test_tone(220.0, 1.0, 48000);
    let pipeline = ChunkedTransformPipeline::new(Arc::new(NoiseGate::default()), 4800);

    let first = pipeline.run(&input, 12.0, &mut |_: u8| {}).unwrap();
    let second = pipeline.run(&input, 12.0, &mut |_: u8| {}).unwrap();
    assert_eq!(first.checksum(), second.checksum());
}

// === Failures ===

#[test]
fn test_enhancer_failure_aborts_job() {
    let input = mono_ramp(30);
    let pipeline = ChunkedTransformPipeline::new(Arc::new(FailsAt::new(1)), 10);

    let mut job = ProcessingJob::new(&input, 10).unwrap();
    let mut reports = Vec::new();
    let err = pipeline
        .run_job(&mut job, 0.0, &mut |p: u8| reports.push(p))
        .unwrap_err();

    assert!(matches!(err, TransformError::WindowFailed { index: 1, .. }));
    assert!(matches!(job.state(), JobState::Failed(reason) if reason.contains("model crashed")));
    // Only the window before the failure was reported
    assert_eq!(reports, vec![33]);
}

#[test]
fn test_length_change_is_rejected() {
    let input = mono_ramp(30);
    let pipeline = ChunkedTransformPipeline::new(
        Arc::new(Truncates {
            info: test_info("truncates"),
        }),
        10,
    );

    let err = pipeline.run(&input, 0.0, &mut |_: u8| {}).unwrap_err();
    assert!(matches!(
        err,
        TransformError::LengthMismatch {
            index: 0,
            expected: 10,
            actual: 9
        }
    ));
}

#[test]
fn test_channel_change_is_rejected() {
    let input = AudioBuffer::silence(20, 2, 48000);
    let pipeline = ChunkedTransformPipeline::new(
        Arc::new(Downmix {
            info: test_info("downmix"),
        }),
        10,
    );

    let err = pipeline.run(&input, 0.0, &mut |_: u8| {}).unwrap_err();
    assert!(matches!(
        err,
        TransformError::ChannelMismatch {
            index: 0,
            expected: 2,
            actual: 1
        }
    ));
}

#[test]
fn test_cancel_between_windows() {
    let input = mono_ramp(30);
    let cancel = CancelToken::new();
    let pipeline = ChunkedTransformPipeline::new(Arc::new(Passthrough::new()), 10)
        .with_cancel_token(cancel.clone());

    let mut reports = Vec::new();
    let err = pipeline
        .run(&input, 0.0, &mut |p: u8| {
            reports.push(p);
            cancel.cancel();
        })
        .unwrap_err();

    assert!(matches!(err, TransformError::Cancelled { completed_windows: 1 }));
    assert_eq!(reports, vec![33]);
}

#[test]
fn test_cancel_during_last_window_discards_output() {
    let input = mono_ramp(30);
    let cancel = CancelToken::new();
    let enhancer = Arc::new(CancelsDuring {
        info: test_info("cancels"),
        index: 2,
        calls: AtomicUsize::new(0),
        cancel: cancel.clone(),
    });
    let pipeline = ChunkedTransformPipeline::new(enhancer, 10).with_cancel_token(cancel);

    let mut job = ProcessingJob::new(&input, 10).unwrap();
    let mut reports = Vec::new();
    let err = pipeline
        .run_job(&mut job, 0.0, &mut |p: u8| reports.push(p))
        .unwrap_err();

    assert!(matches!(err, TransformError::Cancelled { completed_windows: 2 }));
    assert!(matches!(job.state(), JobState::Failed(_)));
    assert_eq!(reports, vec![33, 66]);
}

// === Window seams ===

#[test]
fn test_stateful_enhancer_differs_only_from_first_seam() {
    // Windows are processed independently, so a filter that builds up state
    // restarts at every seam. This is accepted behaviour.
    let input = AudioBuffer::from_interleaved(vec![1.0; 30], 1, 48000).unwrap();
    let smoother = Arc::new(Smoother {
        info: test_info("smoother"),
    });

    let one_shot = ChunkedTransformPipeline::new(smoother.clone(), 30)
        .run(&input, 0.0, &mut |_: u8| {})
        .unwrap();
    let windowed = ChunkedTransformPipeline::new(smoother, 10)
        .run(&input, 0.0, &mut |_: u8| {})
        .unwrap();

    assert_eq!(windowed.frame_count(), one_shot.frame_count());
    assert_eq!(windowed.samples()[..10], one_shot.samples()[..10]);
    assert_eq!(windowed.samples()[10], 0.5);
    assert!(one_shot.samples()[10] > 0.999);
    assert_eq!(windowed.samples()[20], 0.5);
}

// === Background worker ===

#[test]
fn test_worker_failure_sends_no_progress_after_failed() {
    let handle = EnhanceWorker::spawn(
        Arc::new(mono_ramp(40)),
        Arc::new(FailsAt::new(2)),
        EnhanceOptions {
            window_frames: 10,
            attenuation_limit_db: 0.0,
        },
    )
    .unwrap();

    let events: Vec<JobEvent> = handle.events().iter().collect();
    let err = handle.join().unwrap_err();
    assert_eq!(err.error_code(), "WINDOW_FAILED");

    let failed_at = events
        .iter()
        .position(|e| matches!(e, JobEvent::Failed { .. }))
        .unwrap();
    assert_eq!(failed_at, events.len() - 1);
    let progress: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            JobEvent::Progress(p) => Some(*p),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![25, 50]);
}

#[test]
fn test_worker_result_matches_inline_run() {
    let input = Arc::new(duet::engine::io::generate_test_tone(440.0, 0.5, 48000));
    let inline = ChunkedTransformPipeline::new(Arc::new(NoiseGate::default()), 4000)
        .run(&input, 6.0, &mut |_: u8| {})
        .unwrap();

    let handle = EnhanceWorker::spawn(
        input,
        Arc::new(NoiseGate::default()),
        EnhanceOptions {
            window_frames: 4000,
            attenuation_limit_db: 6.0,
        },
    )
    .unwrap();
    let (buffer, report) = handle.wait(|_| {}).unwrap();

    assert_eq!(*buffer, inline);
    assert_eq!(report.checksum, inline.checksum());
    assert_eq!(report.windows, 6);
}
