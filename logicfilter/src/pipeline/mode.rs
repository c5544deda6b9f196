//! Pipeline modes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Phrases that mark a prompt as a problem with a fixed answer format.
const SOLVE_CUES: [&str; 5] = [
    "return only",
    "output format",
    "exactly the sample output",
    "answer key",
    "final answers",
];

/// How a request is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    /// The six enhancement phases.
    #[default]
    Standard,
    /// The six phases with self-reflection on every phase.
    Boost,
    /// Solve the problem, then verify the answer.
    Solve,
    /// Solve when the prompt asks for a fixed answer format, otherwise standard.
    Auto,
}

impl PipelineMode {
    /// Resolves `Auto` against a prompt. Other modes are returned unchanged.
    #[must_use]
    pub fn resolve(self, prompt: &str) -> Self {
        match self {
            Self::Auto if wants_direct_answer(prompt) => Self::Solve,
            Self::Auto => Self::Standard,
            other => other,
        }
    }

    /// Lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Boost => "boost",
            Self::Solve => "solve",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "boost" => Ok(Self::Boost),
            "solve" => Ok(Self::Solve),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown mode '{other}'")),
        }
    }
}

/// Returns true if the prompt contains an answer-format cue.
#[must_use]
pub fn wants_direct_answer(prompt: &str) -> bool {
    let lowered = prompt.to_lowercase();
    SOLVE_CUES.iter().any(|cue| lowered.contains(cue))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_detects_cues() {
        assert_eq!(
            PipelineMode::Auto.resolve("Compute the sum. Return ONLY the number."),
            PipelineMode::Solve
        );
        assert_eq!(
            PipelineMode::Auto.resolve("Use the answer key format"),
            PipelineMode::Solve
        );
        assert_eq!(
            PipelineMode::Auto.resolve("optimize my database query"),
            PipelineMode::Standard
        );
    }

    #[test]
    fn test_explicit_modes_unchanged() {
        assert_eq!(PipelineMode::Boost.resolve("return only"), PipelineMode::Boost);
        assert_eq!(PipelineMode::Standard.resolve("return only"), PipelineMode::Standard);
    }

    #[test]
    fn test_parse_and_serialize() {
        assert_eq!("Solve".parse::<PipelineMode>(), Ok(PipelineMode::Solve));
        assert!("turbo".parse::<PipelineMode>().is_err());
        assert_eq!(serde_json::to_string(&PipelineMode::Boost).unwrap(), r#""boost""#);
        assert_eq!(PipelineMode::default(), PipelineMode::Standard);
    }
}
