//! Completed pipeline runs.

use super::{FailureSummary, PipelineMode, PipelineRequest};
use crate::phases::{PhaseResult, PhaseStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every phase produced its own output.
    Completed,
    /// A tolerated number of phases failed and were passed through.
    Degraded,
    /// Too many phases failed; the run stopped early.
    Failed,
    /// The caller cancelled the run between phases.
    Cancelled,
}

impl RunStatus {
    /// HTTP status a front door should answer with.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Completed | Self::Degraded => 200,
            Self::Failed => 500,
            Self::Cancelled => 499,
        }
    }

    /// Returns true if the run produced a final output.
    #[must_use]
    pub fn has_output(&self) -> bool {
        matches!(self, Self::Completed | Self::Degraded)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// An immutable record of one pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique run id.
    pub id: Uuid,
    /// Monotonically increasing per orchestrator.
    pub sequence: u64,
    /// When the run started.
    pub created_at: DateTime<Utc>,
    /// The request that produced the run.
    pub request: PipelineRequest,
    /// Mode the run executed in, after resolving `Auto`.
    pub mode: PipelineMode,
    /// Terminal state.
    pub status: RunStatus,
    /// Phase results, in execution order.
    pub phases: Vec<PhaseResult>,
    /// Present when any phase failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_summary: Option<FailureSummary>,
    /// Reason given when the run was cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
}

impl PipelineRun {
    /// Output of the last phase, if the run produced one.
    #[must_use]
    pub fn final_output(&self) -> Option<&str> {
        if !self.status.has_output() {
            return None;
        }
        self.phases
            .last()
            .map(|p| p.output.as_str())
            .filter(|s| !s.is_empty())
    }

    /// The original prompt.
    #[must_use]
    pub fn prompt(&self) -> &str {
        self.request.prompt()
    }

    /// Returns true if any phase was passed through or failed.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.phases.iter().any(|p| p.status != PhaseStatus::Succeeded)
    }

    /// Renders every phase with its marker, followed by the failure summary.
    #[must_use]
    pub fn report(&self) -> String {
        let mut out = String::new();
        for (index, phase) in self.phases.iter().enumerate() {
            out.push_str(&format!("[{}] {}\n", index + 1, phase.label()));
            if !phase.output.is_empty() {
                out.push_str(&phase.output);
                out.push('\n');
            }
            out.push('\n');
        }
        if let Some(summary) = &self.failure_summary {
            out.push_str(&summary.message());
            out.push('\n');
        }
        if let Some(reason) = &self.cancel_reason {
            out.push_str(&format!("run cancelled: {reason}\n"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::Phase;

    fn run(status: RunStatus, phases: Vec<PhaseResult>) -> PipelineRun {
        PipelineRun {
            id: Uuid::new_v4(),
            sequence: 1,
            created_at: Utc::now(),
            request: PipelineRequest::new("optimize my database query"),
            mode: PipelineMode::Standard,
            status,
            phases,
            failure_summary: None,
            cancel_reason: None,
        }
    }

    #[test]
    fn test_http_status() {
        assert_eq!(RunStatus::Completed.http_status(), 200);
        assert_eq!(RunStatus::Degraded.http_status(), 200);
        assert_eq!(RunStatus::Failed.http_status(), 500);
    }

    #[test]
    fn test_final_output() {
        let phases = vec![
            PhaseResult::succeeded(Phase::Analysis, "a", "analysis", vec![]),
            PhaseResult::succeeded(Phase::ComprehensiveReview, "r", "final prompt", vec![]),
        ];
        assert_eq!(run(RunStatus::Completed, phases.clone()).final_output(), Some("final prompt"));
        assert_eq!(run(RunStatus::Failed, phases).final_output(), None);
    }

    #[test]
    fn test_report_marks_pass_through() {
        let phases = vec![
            PhaseResult::succeeded(Phase::Analysis, "a", "analysis", vec![]),
            PhaseResult::failed(Phase::Generation, vec![]).into_pass_through("analysis"),
        ];
        let run = run(RunStatus::Degraded, phases);
        assert!(run.is_degraded());
        assert!(run.report().contains("[2] Generation [FAILED - previous output passed through]"));
    }

    #[test]
    fn test_run_serializes() {
        let json = serde_json::to_value(run(RunStatus::Completed, vec![])).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["mode"], "standard");
        assert_eq!(json["request"]["prompt"], "optimize my database query");
    }
}
