//! Pipeline phases.
//!
//! A [`PhaseSpec`] is the static description of one step (role text, default
//! model, sampling options). The [`PhaseExecutor`] turns a spec plus the run's
//! prior results into one [`PhaseResult`].

mod executor;
pub mod prompts;

pub use executor::PhaseExecutor;

use crate::config::ModelAssignments;
use crate::fallback::AttemptRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A pipeline phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Analyse the prompt's goals and constraints.
    Analysis,
    /// Propose concrete improvements.
    Generation,
    /// Validate the proposed improvements.
    Vetting,
    /// Rewrite the prompt with the validated improvements.
    Finalization,
    /// Polish the rewritten prompt.
    Enhancement,
    /// Combine every version into the final prompt.
    ComprehensiveReview,
    /// Solve the problem directly (solve mode).
    Solve,
    /// Check and correct the solved answer (solve mode).
    Verify,
}

impl Phase {
    /// The six phases of the enhancement pipeline, in execution order.
    pub const STANDARD: [Self; 6] = [
        Self::Analysis,
        Self::Generation,
        Self::Vetting,
        Self::Finalization,
        Self::Enhancement,
        Self::ComprehensiveReview,
    ];

    /// The phases of solve mode, in execution order.
    pub const SOLVE: [Self; 2] = [Self::Solve, Self::Verify];

    /// Human-readable name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Analysis => "Analysis",
            Self::Generation => "Generation",
            Self::Vetting => "Vetting",
            Self::Finalization => "Finalization",
            Self::Enhancement => "Enhancement",
            Self::ComprehensiveReview => "Comprehensive Review",
            Self::Solve => "Solve",
            Self::Verify => "Verify",
        }
    }

    /// Short key used in override maps and on the command line.
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Generation => "generation",
            Self::Vetting => "vetting",
            Self::Finalization => "finalization",
            Self::Enhancement => "enhancement",
            Self::ComprehensiveReview => "comprehensive",
            Self::Solve => "solve",
            Self::Verify => "verify",
        }
    }

    /// Parses a phase key, accepting the snake_case variant name as well.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_ascii_lowercase();
        [Self::STANDARD.as_slice(), Self::SOLVE.as_slice()]
            .concat()
            .into_iter()
            .find(|p| p.key() == key || (key == "comprehensive_review" && *p == Self::ComprehensiveReview))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Static configuration of one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSpec {
    /// The phase.
    pub phase: Phase,
    /// Display name.
    pub name: String,
    /// Role description sent as the system message.
    pub role: String,
    /// Model tried first unless overridden.
    pub default_model: String,
    /// Sampling temperature, or the service default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl PhaseSpec {
    /// Creates a spec with the built-in role description for `phase`.
    #[must_use]
    pub fn new(phase: Phase, default_model: impl Into<String>) -> Self {
        Self {
            phase,
            name: phase.name().to_string(),
            role: prompts::role_for(phase).to_string(),
            default_model: default_model.into(),
            temperature: None,
        }
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the role description.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    /// The six standard phases with their configured models.
    #[must_use]
    pub fn standard(models: &ModelAssignments) -> Vec<Self> {
        Phase::STANDARD
            .iter()
            .map(|&phase| Self::new(phase, models.for_phase(phase)))
            .collect()
    }

    /// The six standard phases, all on the boost model when one is configured.
    #[must_use]
    pub fn boost(models: &ModelAssignments) -> Vec<Self> {
        match models.boost.as_deref() {
            Some(model) => Phase::STANDARD
                .iter()
                .map(|&phase| Self::new(phase, model))
                .collect(),
            None => Self::standard(models),
        }
    }

    /// The solve and verify phases, both deterministic.
    #[must_use]
    pub fn solve(models: &ModelAssignments) -> Vec<Self> {
        Phase::SOLVE
            .iter()
            .map(|&phase| Self::new(phase, models.for_phase(phase)).with_temperature(0.0))
            .collect()
    }
}

/// Outcome of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    /// A model produced the output.
    Succeeded,
    /// Every candidate failed; the output is empty.
    Failed,
    /// The phase failed and an earlier output stands in for it.
    PassedThrough,
}

/// Result of running one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    /// The phase.
    pub phase: Phase,
    /// Model that produced the output, if any.
    pub model: Option<String>,
    /// Output text. Empty only when the phase failed.
    pub output: String,
    /// Outcome.
    pub status: PhaseStatus,
    /// Every model call made for this phase, in order.
    pub attempts: Vec<AttemptRecord>,
    /// Model that cleaned up the review output, if the clean-up succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presenter_model: Option<String>,
    /// Wall-clock duration of the phase.
    pub duration_ms: u64,
}

impl PhaseResult {
    /// Creates a successful result.
    #[must_use]
    pub fn succeeded(
        phase: Phase,
        model: impl Into<String>,
        output: impl Into<String>,
        attempts: Vec<AttemptRecord>,
    ) -> Self {
        Self {
            phase,
            model: Some(model.into()),
            output: output.into(),
            status: PhaseStatus::Succeeded,
            attempts,
            presenter_model: None,
            duration_ms: 0,
        }
    }

    /// Creates a failed result with an empty output.
    #[must_use]
    pub fn failed(phase: Phase, attempts: Vec<AttemptRecord>) -> Self {
        Self {
            phase,
            model: None,
            output: String::new(),
            status: PhaseStatus::Failed,
            attempts,
            presenter_model: None,
            duration_ms: 0,
        }
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Replaces a failed output with `substitute`.
    #[must_use]
    pub fn into_pass_through(mut self, substitute: impl Into<String>) -> Self {
        self.output = substitute.into();
        self.model = None;
        self.status = PhaseStatus::PassedThrough;
        self
    }

    /// Returns true if a model produced the output.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == PhaseStatus::Succeeded
    }

    /// Returns true if the phase exhausted its candidates.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    /// Marker shown next to a phase that did not produce its own output.
    #[must_use]
    pub fn marker(&self) -> Option<&'static str> {
        match self.status {
            PhaseStatus::Succeeded => None,
            PhaseStatus::Failed => Some("[FAILED]"),
            PhaseStatus::PassedThrough => Some("[FAILED - previous output passed through]"),
        }
    }

    /// Phase name followed by its marker, if any.
    #[must_use]
    pub fn label(&self) -> String {
        match self.marker() {
            Some(marker) => format!("{} {marker}", self.phase.name()),
            None => self.phase.name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_standard_order() {
        let specs = PhaseSpec::standard(&ModelAssignments::default());
        let names: Vec<_> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Analysis",
                "Generation",
                "Vetting",
                "Finalization",
                "Enhancement",
                "Comprehensive Review"
            ]
        );
        assert_eq!(specs[0].default_model, "llama3.2:latest");
        assert!(specs.iter().all(|s| s.temperature.is_none()));
    }

    #[test]
    fn test_solve_specs_are_deterministic() {
        let specs = PhaseSpec::solve(&ModelAssignments::default());
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].phase, Phase::Solve);
        assert_eq!(specs[0].default_model, "phi4:latest");
        assert_eq!(specs[1].default_model, "deepseek-r1:14b");
        assert!(specs.iter().all(|s| s.temperature == Some(0.0)));
    }

    #[test]
    fn test_boost_uses_single_model() {
        let models = ModelAssignments {
            boost: Some("mistral:latest".to_string()),
            ..ModelAssignments::default()
        };
        assert!(PhaseSpec::boost(&models)
            .iter()
            .all(|s| s.default_model == "mistral:latest"));

        let fallback = PhaseSpec::boost(&ModelAssignments::default());
        assert_eq!(fallback, PhaseSpec::standard(&ModelAssignments::default()));
    }

    #[test]
    fn test_phase_keys() {
        assert_eq!(Phase::from_key("Vetting"), Some(Phase::Vetting));
        assert_eq!(Phase::from_key("comprehensive"), Some(Phase::ComprehensiveReview));
        assert_eq!(Phase::from_key("comprehensive_review"), Some(Phase::ComprehensiveReview));
        assert_eq!(Phase::from_key("presenter"), None);
    }

    #[test]
    fn test_pass_through() {
        let failed = PhaseResult::failed(Phase::Vetting, vec![]);
        assert!(failed.output.is_empty());
        assert_eq!(failed.marker(), Some("[FAILED]"));

        let passed = failed.into_pass_through("generation text");
        assert_eq!(passed.status, PhaseStatus::PassedThrough);
        assert_eq!(passed.output, "generation text");
        assert!(passed.model.is_none());
        assert!(passed.label().starts_with("Vetting [FAILED"));
    }

    #[test]
    fn test_phase_result_serialize() {
        let result = PhaseResult::succeeded(Phase::ComprehensiveReview, "phi4:latest", "done", vec![]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["phase"], "comprehensive_review");
        assert_eq!(json["status"], "succeeded");
        assert!(json.get("presenter_model").is_none());
    }
}
