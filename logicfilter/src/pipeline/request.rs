//! Caller-supplied pipeline request.

use super::PipelineMode;
use crate::errors::ValidationError;
use crate::phases::Phase;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An immutable request to run the pipeline.
///
/// The prompt is trimmed on construction. Validation against the configured
/// length limit happens when the orchestrator accepts the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRequest {
    prompt: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    model_overrides: BTreeMap<Phase, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mode: Option<PipelineMode>,
}

impl PipelineRequest {
    /// Creates a request for a prompt.
    #[must_use]
    pub fn new(prompt: impl AsRef<str>) -> Self {
        Self {
            prompt: prompt.as_ref().trim().to_string(),
            model_overrides: BTreeMap::new(),
            mode: None,
        }
    }

    /// Uses `model` as the first candidate for `phase`.
    #[must_use]
    pub fn with_model_override(mut self, phase: Phase, model: impl Into<String>) -> Self {
        self.model_overrides.insert(phase, model.into());
        self
    }

    /// Requests a specific mode instead of the configured default.
    #[must_use]
    pub fn with_mode(mut self, mode: PipelineMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// The trimmed prompt.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// The override for a phase, if any.
    #[must_use]
    pub fn model_override(&self, phase: Phase) -> Option<&str> {
        self.model_overrides.get(&phase).map(String::as_str)
    }

    /// All overrides.
    #[must_use]
    pub fn model_overrides(&self) -> &BTreeMap<Phase, String> {
        &self.model_overrides
    }

    /// The requested mode, if any.
    #[must_use]
    pub fn mode(&self) -> Option<PipelineMode> {
        self.mode
    }

    /// Checks the prompt and overrides.
    pub fn validate(&self, max_prompt_chars: usize) -> Result<(), ValidationError> {
        if self.prompt.is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }

        let len = self.prompt.chars().count();
        if len > max_prompt_chars {
            return Err(ValidationError::PromptTooLong {
                len,
                max: max_prompt_chars,
            });
        }

        if let Some((phase, _)) = self
            .model_overrides
            .iter()
            .find(|(_, model)| model.trim().is_empty())
        {
            return Err(ValidationError::EmptyModelOverride {
                phase: phase.key().to_string(),
            });
        }

        Ok(())
    }
}
