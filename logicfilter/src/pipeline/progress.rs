//! Progress notifications.
//!
//! Sinks are called synchronously on the pipeline's task. A panicking sink is
//! contained and logged; it never aborts the run.

use super::{PipelineMode, RunStatus};
use crate::phases::{Phase, PhaseStatus};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn, Level};
use uuid::Uuid;

/// A progress notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// The run was accepted and is about to start.
    Started {
        /// Run id.
        run_id: Uuid,
        /// Mode after resolving `Auto`.
        mode: PipelineMode,
        /// Number of phases planned.
        total_phases: usize,
    },
    /// A phase is about to run.
    PhaseStarted {
        /// 1-based phase index.
        index: usize,
        /// Number of phases planned.
        total_phases: usize,
        /// The phase.
        phase: Phase,
        /// Display name.
        name: String,
    },
    /// A phase returned.
    PhaseFinished {
        /// 1-based phase index.
        index: usize,
        /// The phase.
        phase: Phase,
        /// Outcome, after any pass-through.
        status: PhaseStatus,
        /// The phase's effective output.
        output: String,
    },
    /// The run reached a terminal state.
    Finished {
        /// Run id.
        run_id: Uuid,
        /// Terminal state.
        status: RunStatus,
    },
}

impl ProgressEvent {
    /// Dotted event name, e.g. `phase.started`.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Started { .. } => "run.started",
            Self::PhaseStarted { .. } => "phase.started",
            Self::PhaseFinished { .. } => "phase.finished",
            Self::Finished { .. } => "run.finished",
        }
    }
}

/// Receives progress notifications.
pub trait ProgressSink: Send + Sync {
    /// Handles one event.
    fn on_event(&self, event: &ProgressEvent);
}

/// Delivers an event, containing any panic raised by the sink.
pub fn notify(sink: &dyn ProgressSink, event: &ProgressEvent) {
    if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sink.on_event(event))) {
        let detail = e
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| e.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        warn!(
            event_type = event.event_type(),
            panic = %detail,
            "Progress callback panicked"
        );
    }
}

/// Adapts a closure into a sink.
pub struct FnProgress<F>(F);

impl<F> FnProgress<F>
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    /// Wraps a closure.
    #[must_use]
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> ProgressSink for FnProgress<F>
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_event(&self, event: &ProgressEvent) {
        (self.0)(event);
    }
}

impl<F> std::fmt::Debug for FnProgress<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnProgress").finish_non_exhaustive()
    }
}

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgress;

impl ProgressSink for NoOpProgress {
    fn on_event(&self, _event: &ProgressEvent) {}
}

/// A sink that logs events through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingProgress {
    level: Level,
}

impl Default for LoggingProgress {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingProgress {
    /// Creates a logging sink at the given level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl ProgressSink for LoggingProgress {
    fn on_event(&self, event: &ProgressEvent) {
        if self.level == Level::DEBUG {
            debug!(event_type = event.event_type(), event = ?event, "Pipeline progress");
        } else {
            info!(event_type = event.event_type(), event = ?event, "Pipeline progress");
        }
    }
}

/// A sink that keeps every event, for tests and callers that poll.
#[derive(Debug, Default)]
pub struct CollectingProgress {
    events: RwLock<Vec<ProgressEvent>>,
}

impl CollectingProgress {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.read().clone()
    }

    /// Returns `(index, name)` for every `PhaseStarted` event.
    #[must_use]
    pub fn phase_starts(&self) -> Vec<(usize, String)> {
        self.events
            .read()
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::PhaseStarted { index, name, .. } => Some((*index, name.clone())),
                _ => None,
            })
            .collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl ProgressSink for CollectingProgress {
    fn on_event(&self, event: &ProgressEvent) {
        self.events.write().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn phase_started() -> ProgressEvent {
        ProgressEvent::PhaseStarted {
            index: 1,
            total_phases: 6,
            phase: Phase::Analysis,
            name: "Analysis".to_string(),
        }
    }

    #[test]
    fn test_closure_sink() {
        let count = AtomicUsize::new(0);
        let sink = FnProgress::new(|_: &ProgressEvent| {
            count.fetch_add(1, Ordering::SeqCst);
        });
        notify(&sink, &phase_started());
        notify(&sink, &phase_started());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panicking_sink_is_contained() {
        let sink = FnProgress::new(|_: &ProgressEvent| panic!("ui thread gone"));
        notify(&sink, &phase_started());
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingProgress::new();
        assert!(sink.is_empty());
        notify(&sink, &phase_started());
        assert_eq!(sink.phase_starts(), vec![(1, "Analysis".to_string())]);
    }

    #[test]
    fn test_logging_sink() {
        notify(&LoggingProgress::default(), &phase_started());
        notify(&LoggingProgress::debug(), &phase_started());
        notify(&NoOpProgress, &phase_started());
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(phase_started()).unwrap();
        assert_eq!(json["type"], "phase_started");
        assert_eq!(json["phase"], "analysis");
        assert_eq!(phase_started().event_type(), "phase.started");
    }
}
