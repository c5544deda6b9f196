//! Failure tolerance for a pipeline run.
//!
//! A run tolerates up to a configured number of failed phases. Each failure is
//! recorded; once the count exceeds the threshold the run is aborted.

use crate::errors::ErrorKind;
use crate::phases::{Phase, PhaseResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Record of one failed phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// The phase that failed.
    pub phase: Phase,
    /// Models tried, in order, without repeats.
    pub models_tried: Vec<String>,
    /// Kind of the last error seen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorKind>,
    /// Number of model calls made.
    pub attempts: usize,
    /// When the failure was recorded.
    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    /// Builds a record from a failed phase result.
    #[must_use]
    pub fn from_result(result: &PhaseResult) -> Self {
        let mut models_tried: Vec<String> = Vec::new();
        for attempt in &result.attempts {
            if !models_tried.contains(&attempt.model) {
                models_tried.push(attempt.model.clone());
            }
        }

        Self {
            phase: result.phase,
            models_tried,
            last_error: result.attempts.last().and_then(|a| a.error),
            attempts: result.attempts.len(),
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed after {} attempt(s)", self.phase, self.attempts)?;
        if !self.models_tried.is_empty() {
            write!(f, " on {}", self.models_tried.join(", "))?;
        }
        if let Some(kind) = self.last_error {
            write!(f, " (last error: {kind})")?;
        }
        Ok(())
    }
}

/// Summary of the failures in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureSummary {
    /// Number of phases the run was meant to execute.
    pub total_phases: usize,
    /// Number of phases a model completed.
    pub completed_phases: usize,
    /// Failure records, in phase order.
    pub failures: Vec<FailureRecord>,
    /// True if the run stopped early because of the failures.
    pub aborted: bool,
}

impl FailureSummary {
    /// Number of failed phases.
    #[must_use]
    pub fn failed_phases(&self) -> usize {
        self.failures.len()
    }

    /// Fraction of planned phases a model completed.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.total_phases == 0 {
            return 0.0;
        }
        self.completed_phases as f64 / self.total_phases as f64
    }

    /// Returns true if any phase failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// One-line human-readable summary.
    #[must_use]
    pub fn message(&self) -> String {
        let details: Vec<String> = self.failures.iter().map(ToString::to_string).collect();
        let outcome = if self.aborted { "run aborted" } else { "run degraded" };
        format!(
            "{outcome}: {} of {} phases failed; {}",
            self.failed_phases(),
            self.total_phases,
            details.join("; ")
        )
    }
}

/// Collects failures during a run and decides when to abort.
#[derive(Debug)]
pub struct FailureCollector {
    max_failed_phases: usize,
    failures: Vec<FailureRecord>,
    completed: usize,
}

impl FailureCollector {
    /// Creates a collector tolerating `max_failed_phases` failures.
    #[must_use]
    pub fn new(max_failed_phases: usize) -> Self {
        Self {
            max_failed_phases,
            failures: Vec::new(),
            completed: 0,
        }
    }

    /// Records a failed phase.
    pub fn record_failure(&mut self, result: &PhaseResult) {
        self.failures.push(FailureRecord::from_result(result));
    }

    /// Records a completed phase.
    pub fn record_completion(&mut self) {
        self.completed += 1;
    }

    /// Returns true once the failures exceed the tolerated count.
    #[must_use]
    pub fn should_abort(&self) -> bool {
        self.failures.len() > self.max_failed_phases
    }

    /// Returns true if any phase failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Builds the summary, or `None` if nothing failed.
    #[must_use]
    pub fn summary(&self, total_phases: usize) -> Option<FailureSummary> {
        self.has_failures().then(|| FailureSummary {
            total_phases,
            completed_phases: self.completed,
            failures: self.failures.clone(),
            aborted: self.should_abort(),
        })
    }
}
