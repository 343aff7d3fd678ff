//! Enhancement pipeline
//!
//! Windowed processing of a whole recording through an [`Enhancer`], either
//! inline ([`ChunkedTransformPipeline`]) or on a background thread
//! ([`EnhanceWorker`]).
//!
//! [`Enhancer`]: crate::neural::Enhancer

mod chunked;
mod worker;

pub use chunked::{
    CancelToken, ChunkedTransformPipeline, JobState, NullProgress, PipelineOutput,
    ProcessingJob, ProcessingReport, ProgressSink,
};
pub use worker::{ChannelProgressSink, EnhanceOptions, EnhanceWorker, JobEvent, JobHandle};
