//! # LogicFilter
//!
//! A multi-phase prompt-enhancement pipeline over a local inference service.
//!
//! A prompt passes through six model calls (analysis, generation, vetting,
//! finalization, enhancement, comprehensive review), each consuming the
//! output of the phases before it. The crate provides:
//!
//! - **Model fallback**: each phase resolves through an ordered candidate list
//!   with a per-candidate retry budget and backoff
//! - **Failure isolation**: a failed phase is passed through and the run is
//!   marked degraded instead of aborted
//! - **Progress and cancellation**: per-phase notifications and cooperative
//!   cancellation between phases
//! - **History**: a thread-safe, bounded undo/redo log of completed runs
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use logicfilter::prelude::*;
//! use std::sync::Arc;
//!
//! let config = Arc::new(EnhancerConfig::default().with_env_overrides());
//! let client = Arc::new(OllamaClient::from_config(&config)?);
//! let orchestrator = PipelineOrchestrator::new(config, client)?;
//!
//! let run = orchestrator
//!     .run_simple(PipelineRequest::new("optimize my database query"))
//!     .await?;
//!
//! let history = ProcessingHistory::default();
//! history.record(run);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod client;
pub mod config;
pub mod errors;
pub mod fallback;
pub mod history;
pub mod monitor;
pub mod phases;
pub mod pipeline;
pub mod telemetry;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    #[cfg(feature = "ollama")]
    pub use crate::client::OllamaClient;
    pub use crate::client::{ChatMessage, ChatOptions, ModelClient, Role};
    pub use crate::config::{EnhancerConfig, FallbackTable, ModelAssignments};
    pub use crate::errors::{
        ConfigError, EnhancerError, ErrorKind, ResolutionError, TransportError, ValidationError,
    };
    pub use crate::fallback::{AttemptRecord, FallbackResolver, RetryConfig};
    pub use crate::history::{HistoryEntry, ProcessingHistory};
    pub use crate::monitor::ServiceMonitor;
    pub use crate::phases::{Phase, PhaseExecutor, PhaseResult, PhaseSpec, PhaseStatus};
    pub use crate::pipeline::{
        CancellationToken, FnProgress, PipelineMode, PipelineOrchestrator, PipelineRequest,
        PipelineRun, ProgressEvent, ProgressSink, RunStatus,
    };
}
