//! Immutable process-wide configuration.
//!
//! The settings store hands the pipeline one [`EnhancerConfig`] at startup.
//! It is validated once and then shared read-only (usually behind an `Arc`).

mod fallback_table;
mod models;

pub use fallback_table::FallbackTable;
pub use models::ModelAssignments;

use crate::errors::ConfigError;
use crate::fallback::RetryConfig;
use crate::pipeline::PipelineMode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Environment variable holding a JSON model assignment override.
pub const ENV_MODELS_JSON: &str = "LOGIC_FILTER_MODELS_JSON";
/// Environment variable holding a JSON fallback table override.
pub const ENV_FALLBACK_JSON: &str = "LOGIC_FILTER_FALLBACK_JSON";
/// Environment variable holding the per-call model timeout in milliseconds.
pub const ENV_MODEL_TIMEOUT_MS: &str = "LOGIC_FILTER_MODEL_TIMEOUT_MS";
/// Environment variable holding the inference service base URL.
pub const ENV_OLLAMA_URL: &str = "LOGIC_FILTER_OLLAMA_URL";

/// Configuration for the enhancement pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancerConfig {
    /// Base URL of the inference service.
    pub ollama_url: String,
    /// Default model per purpose.
    pub models: ModelAssignments,
    /// Alternates tried after a model fails.
    pub fallback: FallbackTable,
    /// Per-candidate retry budget and backoff.
    pub retry: RetryConfig,
    /// Per-call timeout in milliseconds.
    pub model_timeout_ms: u64,
    /// Interval between service health checks in milliseconds.
    pub health_check_interval_ms: u64,
    /// Maximum number of runs kept in the processing history.
    pub history_capacity: usize,
    /// Maximum prompt length in characters.
    pub max_prompt_chars: usize,
    /// Number of failed phases a run tolerates before it is marked failed.
    pub max_failed_phases: usize,
    /// Mode used when a request does not ask for one.
    pub default_mode: PipelineMode,
}

impl Default for EnhancerConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            models: ModelAssignments::default(),
            fallback: FallbackTable::default(),
            retry: RetryConfig::default(),
            model_timeout_ms: 120_000,
            health_check_interval_ms: 30_000,
            history_capacity: 50,
            max_prompt_chars: 50_000,
            max_failed_phases: 1,
            default_mode: PipelineMode::Standard,
        }
    }
}

impl EnhancerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a settings document. Missing keys keep their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        Ok(config)
    }

    /// Reads and parses a settings file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Applies overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    ///
    /// Malformed values are logged and ignored so a bad override never
    /// replaces a working default.
    #[must_use]
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MODELS_JSON).filter(|s| !s.trim().is_empty()) {
            match serde_json::from_str::<ModelAssignments>(&raw) {
                Ok(models) => self.models = models,
                Err(e) => warn!(var = ENV_MODELS_JSON, error = %e, "Ignoring malformed override"),
            }
        }

        if let Some(raw) = lookup(ENV_FALLBACK_JSON).filter(|s| !s.trim().is_empty()) {
            match serde_json::from_str::<FallbackTable>(&raw) {
                Ok(table) => self.fallback = table,
                Err(e) => warn!(var = ENV_FALLBACK_JSON, error = %e, "Ignoring malformed override"),
            }
        }

        if let Some(raw) = lookup(ENV_MODEL_TIMEOUT_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.model_timeout_ms = ms,
                Err(e) => warn!(var = ENV_MODEL_TIMEOUT_MS, error = %e, "Ignoring malformed override"),
            }
        }

        if let Some(url) = lookup(ENV_OLLAMA_URL).filter(|s| !s.trim().is_empty()) {
            self.ollama_url = url.trim().to_string();
        }

        self
    }

    /// Sets the inference service URL.
    #[must_use]
    pub fn with_ollama_url(mut self, url: impl Into<String>) -> Self {
        self.ollama_url = url.into();
        self
    }

    /// Sets the model assignments.
    #[must_use]
    pub fn with_models(mut self, models: ModelAssignments) -> Self {
        self.models = models;
        self
    }

    /// Sets the fallback table.
    #[must_use]
    pub fn with_fallback(mut self, fallback: FallbackTable) -> Self {
        self.fallback = fallback;
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the history capacity.
    #[must_use]
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Sets the maximum prompt length.
    #[must_use]
    pub fn with_max_prompt_chars(mut self, max: usize) -> Self {
        self.max_prompt_chars = max;
        self
    }

    /// Sets how many failed phases a run tolerates.
    #[must_use]
    pub fn with_max_failed_phases(mut self, max: usize) -> Self {
        self.max_failed_phases = max;
        self
    }

    /// Sets the default pipeline mode.
    #[must_use]
    pub fn with_default_mode(mut self, mode: PipelineMode) -> Self {
        self.default_mode = mode;
        self
    }

    /// Returns the per-call timeout.
    #[must_use]
    pub fn model_timeout(&self) -> Duration {
        Duration::from_millis(self.model_timeout_ms)
    }

    /// Returns the health check interval.
    #[must_use]
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a purpose has no model, a configured model has no
    /// fallback entry, an alternate is blank, or a limit is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (purpose, model) in self.models.purposes() {
            if model.trim().is_empty() {
                return Err(ConfigError::MissingModel {
                    purpose: purpose.to_string(),
                });
            }
            if !self.fallback.contains(model) {
                return Err(ConfigError::MissingFallbackEntry {
                    model: model.to_string(),
                });
            }
        }

        self.fallback.validate()?;

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.model_timeout_ms == 0 {
            return Err(ConfigError::invalid("model_timeout_ms", "must be positive"));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::invalid("history_capacity", "must be positive"));
        }
        if self.max_prompt_chars == 0 {
            return Err(ConfigError::invalid("max_prompt_chars", "must be positive"));
        }
        if self.ollama_url.trim().is_empty() {
            return Err(ConfigError::invalid("ollama_url", "must not be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = EnhancerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.history_capacity, 50);
        assert_eq!(config.max_prompt_chars, 50_000);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.model_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_from_json_partial_keeps_defaults() {
        let config = EnhancerConfig::from_json_str(
            r#"{"history_capacity": 10, "max_failed_phases": 2}"#,
        )
        .unwrap();

        assert_eq!(config.history_capacity, 10);
        assert_eq!(config.max_failed_phases, 2);
        assert_eq!(config.ollama_url, "http://localhost:11434");
        assert_eq!(config.models.analysis, "llama3.2:latest");
    }

    #[test]
    fn test_from_json_invalid() {
        let err = EnhancerConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"ollama_url": "http://gpu-box:11434"}}"#).unwrap();

        let config = EnhancerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.ollama_url, "http://gpu-box:11434");
    }

    #[test]
    fn test_from_missing_file() {
        let err = EnhancerConfig::from_file("/nonexistent/settings.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut vars = HashMap::new();
        vars.insert(
            ENV_FALLBACK_JSON.to_string(),
            r#"{"llama3.2:latest": ["phi4:latest"]}"#.to_string(),
        );
        vars.insert(ENV_MODEL_TIMEOUT_MS.to_string(), "5000".to_string());
        vars.insert(ENV_OLLAMA_URL.to_string(), " http://remote:11434 ".to_string());

        let config = EnhancerConfig::default().with_overrides_from(|k| vars.get(k).cloned());

        assert_eq!(config.fallback.alternates("llama3.2:latest"), ["phi4:latest".to_string()]);
        assert_eq!(config.model_timeout_ms, 5000);
        assert_eq!(config.ollama_url, "http://remote:11434");
    }

    #[test]
    fn test_malformed_env_override_is_ignored() {
        let config = EnhancerConfig::default().with_overrides_from(|k| match k {
            ENV_MODELS_JSON => Some("[broken".to_string()),
            ENV_MODEL_TIMEOUT_MS => Some("soon".to_string()),
            _ => None,
        });

        assert_eq!(config.models, ModelAssignments::default());
        assert_eq!(config.model_timeout_ms, 120_000);
    }

    #[test]
    fn test_validate_missing_fallback_entry() {
        let models = ModelAssignments {
            analysis: "mystery:7b".to_string(),
            ..ModelAssignments::default()
        };
        let config = EnhancerConfig::default().with_models(models);

        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::MissingFallbackEntry {
                model: "mystery:7b".to_string()
            }
        );
    }

    #[test]
    fn test_validate_missing_model() {
        let models = ModelAssignments {
            vetting: "  ".to_string(),
            ..ModelAssignments::default()
        };
        let config = EnhancerConfig::default().with_models(models);

        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingModel { purpose }) if purpose == "vetting"
        ));
    }

    #[test]
    fn test_validate_zero_limits() {
        let config = EnhancerConfig::default().with_history_capacity(0);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));

        let config = EnhancerConfig::default().with_retry(RetryConfig::new().with_max_attempts(0));
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));
    }
}
