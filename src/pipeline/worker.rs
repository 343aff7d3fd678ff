//! Background enhancement
//!
//! Runs a [`ChunkedTransformPipeline`] on its own thread so the control
//! thread stays responsive. Everything the worker has to say arrives as
//! [`JobEvent`]s on a channel, progress included.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Receiver, Sender};
use tracing::debug;
use uuid::Uuid;

use super::chunked::{
    CancelToken, ChunkedTransformPipeline, ProcessingJob, ProcessingReport, ProgressSink,
};
use crate::engine::buffer::AudioBuffer;
use crate::error::{DuetError, Result, TransformError};
use crate::neural::Enhancer;

/// Parameters of one background job
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnhanceOptions {
    pub window_frames: usize,
    pub attenuation_limit_db: f32,
}

/// Messages from a running job
#[derive(Debug, Clone)]
pub enum JobEvent {
    Started {
        job_id: Uuid,
        total_frames: usize,
        windows: usize,
    },
    Progress(u8),
    Completed {
        buffer: Arc<AudioBuffer>,
        report: ProcessingReport,
    },
    Failed {
        reason: String,
    },
}

/// Forwards progress onto the event channel
pub struct ChannelProgressSink {
    tx: Sender<JobEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: Sender<JobEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn report(&mut self, percent: u8) {
        // Nobody listening is not an error for the job itself
        let _ = self.tx.send(JobEvent::Progress(percent));
    }
}

/// Spawns enhancement jobs
pub struct EnhanceWorker;

impl EnhanceWorker {
    /// Start enhancing `input` on a new thread
    pub fn spawn(
        input: Arc<AudioBuffer>,
        enhancer: Arc<dyn Enhancer>,
        options: EnhanceOptions,
    ) -> Result<JobHandle> {
        let (tx, events) = unbounded();
        let cancel = CancelToken::new();
        let pipeline = ChunkedTransformPipeline::new(enhancer, options.window_frames)
            .with_cancel_token(cancel.clone());

        let thread = thread::Builder::new()
            .name("duet-enhance".to_string())
            .spawn(move || run(&pipeline, &input, options.attenuation_limit_db, tx))?;

        Ok(JobHandle {
            events,
            cancel,
            thread: Some(thread),
        })
    }
}

fn run(
    pipeline: &ChunkedTransformPipeline,
    input: &AudioBuffer,
    attenuation_limit_db: f32,
    tx: Sender<JobEvent>,
) -> std::result::Result<(), TransformError> {
    let mut job = match ProcessingJob::new(input, pipeline.window_frames()) {
        Ok(job) => job,
        Err(e) => {
            let _ = tx.send(JobEvent::Failed {
                reason: e.to_string(),
            });
            return Err(e);
        }
    };

    let _ = tx.send(JobEvent::Started {
        job_id: job.id(),
        total_frames: job.total_frames(),
        windows: job.window_count(),
    });

    let mut sink = ChannelProgressSink::new(tx.clone());
    match pipeline.run_job(&mut job, attenuation_limit_db, &mut sink) {
        Ok(output) => {
            let _ = tx.send(JobEvent::Completed {
                buffer: Arc::new(output.buffer),
                report: output.report,
            });
            Ok(())
        }
        Err(e) => {
            let _ = tx.send(JobEvent::Failed {
                reason: e.to_string(),
            });
            Err(e)
        }
    }
}

/// Handle to a running job
pub struct JobHandle {
    events: Receiver<JobEvent>,
    cancel: CancelToken,
    thread: Option<JoinHandle<std::result::Result<(), TransformError>>>,
}

impl JobHandle {
    /// Event stream of the job
    pub fn events(&self) -> &Receiver<JobEvent> {
        &self.events
    }

    /// Ask the job to stop before its next window
    pub fn cancel(&self) {
        debug!("enhancement job cancel requested");
        self.cancel.cancel();
    }

    /// Wait for the worker thread and return the job's error, if any
    pub fn join(mut self) -> Result<()> {
        self.join_thread()
    }

    /// Drain events until the job ends
    ///
    /// `on_progress` sees every progress report. Returns the enhanced buffer
    /// and report, or the typed error the job failed with.
    pub fn wait(
        mut self,
        mut on_progress: impl FnMut(u8),
    ) -> Result<(Arc<AudioBuffer>, ProcessingReport)> {
        let mut completed = None;

        for event in self.events.iter() {
            match event {
                JobEvent::Started { .. } => {}
                JobEvent::Progress(percent) => on_progress(percent),
                JobEvent::Completed { buffer, report } => {
                    completed = Some((buffer, report));
                    break;
                }
                JobEvent::Failed { .. } => break,
            }
        }

        self.join_thread()?;
        completed.ok_or_else(|| DuetError::Enhancer {
            reason: "enhancement worker exited without a result".to_string(),
        })
    }

    fn join_thread(&mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => match thread.join() {
                Ok(outcome) => outcome.map_err(DuetError::from),
                Err(_) => Err(DuetError::Enhancer {
                    reason: "enhancement worker panicked".to_string(),
                }),
            },
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neural::NoiseGate;

    #[test]
    fn test_worker_emits_events_in_order() {
        let input = Arc::new(AudioBuffer::silence(100, 2, 48000));
        let handle = EnhanceWorker::spawn(
            input,
            Arc::new(NoiseGate::default()),
            EnhanceOptions {
                window_frames: 40,
                attenuation_limit_db: 0.0,
            },
        )
        .unwrap();

        let events: Vec<JobEvent> = handle.events().iter().collect();
        handle.join().unwrap();

        assert!(matches!(events[0], JobEvent::Started { windows: 3, total_frames: 100, .. }));
        let progress: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                JobEvent::Progress(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![40, 80, 100]);
        assert!(matches!(events.last(), Some(JobEvent::Completed { .. })));
    }

    #[test]
    fn test_zero_window_fails_without_start() {
        let handle = EnhanceWorker::spawn(
            Arc::new(AudioBuffer::silence(10, 1, 48000)),
            Arc::new(NoiseGate::default()),
            EnhanceOptions {
                window_frames: 0,
                attenuation_limit_db: 0.0,
            },
        )
        .unwrap();

        let err = handle.wait(|_| {}).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_WINDOW");
    }

    #[test]
    fn test_wait_returns_buffer() {
        let input = Arc::new(AudioBuffer::silence(48, 1, 48000));
        let handle = EnhanceWorker::spawn(
            input.clone(),
            Arc::new(NoiseGate::default()),
            EnhanceOptions {
                window_frames: 48,
                attenuation_limit_db: 0.0,
            },
        )
        .unwrap();

        let mut seen = Vec::new();
        let (buffer, report) = handle.wait(|p| seen.push(p)).unwrap();
        assert_eq!(buffer.frame_count(), input.frame_count());
        assert_eq!(report.windows, 1);
        assert_eq!(seen, vec![100]);
    }
}
