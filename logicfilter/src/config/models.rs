//! Default model per pipeline purpose.

use crate::phases::Phase;
use serde::{Deserialize, Serialize};

/// Maps each pipeline purpose to its default model identifier.
///
/// Serialised with the purpose names used by the settings store
/// (`"analysis"`, `"generation"`, ..., `"presenter"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelAssignments {
    /// Analysis phase.
    pub analysis: String,
    /// Generation phase.
    pub generation: String,
    /// Vetting phase.
    pub vetting: String,
    /// Finalization phase.
    pub finalization: String,
    /// Enhancement phase.
    pub enhancement: String,
    /// Comprehensive review phase, also used to solve in solve mode.
    pub comprehensive: String,
    /// Presenter clean-up of the review output, also used to verify answers.
    pub presenter: String,
    /// Single model used for every phase in boost mode, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boost: Option<String>,
}

impl Default for ModelAssignments {
    fn default() -> Self {
        Self {
            analysis: "llama3.2:latest".to_string(),
            generation: "olmo2:13b".to_string(),
            vetting: "deepseek-r1".to_string(),
            finalization: "deepseek-r1:14b".to_string(),
            enhancement: "phi4:latest".to_string(),
            comprehensive: "phi4:latest".to_string(),
            presenter: "deepseek-r1:14b".to_string(),
            boost: None,
        }
    }
}

impl ModelAssignments {
    /// Returns the default model for a phase.
    #[must_use]
    pub fn for_phase(&self, phase: Phase) -> &str {
        match phase {
            Phase::Analysis => &self.analysis,
            Phase::Generation => &self.generation,
            Phase::Vetting => &self.vetting,
            Phase::Finalization => &self.finalization,
            Phase::Enhancement => &self.enhancement,
            Phase::ComprehensiveReview | Phase::Solve => &self.comprehensive,
            Phase::Verify => &self.presenter,
        }
    }

    /// Returns every configured `(purpose, model)` pair.
    #[must_use]
    pub fn purposes(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = vec![
            ("analysis", self.analysis.as_str()),
            ("generation", self.generation.as_str()),
            ("vetting", self.vetting.as_str()),
            ("finalization", self.finalization.as_str()),
            ("enhancement", self.enhancement.as_str()),
            ("comprehensive", self.comprehensive.as_str()),
            ("presenter", self.presenter.as_str()),
        ];
        if let Some(ref boost) = self.boost {
            pairs.push(("boost", boost.as_str()));
        }
        pairs
    }
}
