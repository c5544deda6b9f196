//! Pipeline requests, runs and execution.
//!
//! This module provides:
//! - Requests and their validation
//! - Pipeline modes
//! - The orchestrator that drives phases to a terminal run state
//! - Failure tolerance, progress notifications and cancellation

mod cancellation;
mod failure;
mod mode;
mod orchestrator;
mod progress;
mod request;
mod run;

pub use cancellation::{CancelCallback, CancellationToken};
pub use failure::{FailureCollector, FailureRecord, FailureSummary};
pub use mode::{wants_direct_answer, PipelineMode};
pub use orchestrator::PipelineOrchestrator;
pub use progress::{
    notify, CollectingProgress, FnProgress, LoggingProgress, NoOpProgress, ProgressEvent,
    ProgressSink,
};
pub use request::PipelineRequest;
pub use run::{PipelineRun, RunStatus};
