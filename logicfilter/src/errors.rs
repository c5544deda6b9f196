//! Error types for the enhancement pipeline.
//!
//! Transport failures and resolution failures are runtime conditions: they are
//! absorbed by the fallback resolver and the orchestrator and end up in attempt
//! logs and run statuses. Only request validation and configuration errors are
//! ever returned to the caller as `Err`.

use crate::fallback::AttemptRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The main error type returned to callers of the pipeline.
#[derive(Debug, Error)]
pub enum EnhancerError {
    /// The request was rejected before any phase ran.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// The configuration is unusable.
    #[error("{0}")]
    Config(#[from] ConfigError),
}

impl EnhancerError {
    /// HTTP status a front door should answer with for this error.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Config(_) => 500,
        }
    }
}

/// Classification of a single failed model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The inference service could not be reached.
    ServiceUnavailable,
    /// The model is not pulled or not known to the service.
    ModelNotFound,
    /// The call exceeded the per-call timeout.
    Timeout,
    /// The service answered with an error or an unusable body.
    UpstreamError,
}

impl ErrorKind {
    /// Returns true if a delay before the next attempt can help.
    #[must_use]
    pub fn should_back_off(&self) -> bool {
        matches!(self, Self::Timeout | Self::ServiceUnavailable)
    }

    /// Returns true if retrying the same model is pointless.
    #[must_use]
    pub fn is_fail_fast(&self) -> bool {
        matches!(self, Self::ModelNotFound)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceUnavailable => write!(f, "service_unavailable"),
            Self::ModelNotFound => write!(f, "model_not_found"),
            Self::Timeout => write!(f, "timeout"),
            Self::UpstreamError => write!(f, "upstream_error"),
        }
    }
}

/// Errors raised by a model endpoint client for one call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Cannot reach the inference service.
    #[error("inference service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The requested model is not available on the service.
    #[error("model '{model}' not found")]
    ModelNotFound {
        /// The model identifier.
        model: String,
    },

    /// The call did not finish within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The service returned a malformed or error response.
    #[error("upstream error: {0}")]
    UpstreamError(String),
}

impl TransportError {
    /// Creates a service unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Creates a model not found error.
    #[must_use]
    pub fn model_not_found(model: impl Into<String>) -> Self {
        Self::ModelNotFound {
            model: model.into(),
        }
    }

    /// Creates an upstream error.
    #[must_use]
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::UpstreamError(message.into())
    }

    /// Returns the error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            Self::ModelNotFound { .. } => ErrorKind::ModelNotFound,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::UpstreamError(_) => ErrorKind::UpstreamError,
        }
    }
}

/// Raised by the fallback resolver when no candidate produced text.
#[derive(Debug, Clone, Error)]
pub enum ResolutionError {
    /// Every candidate exhausted its retry budget.
    #[error("all candidates failed for '{requested}' ({} attempts)", attempts.len())]
    AllCandidatesFailed {
        /// The model originally requested.
        requested: String,
        /// Every attempt made, in order.
        attempts: Vec<AttemptRecord>,
    },
}

impl ResolutionError {
    /// Returns the attempt log carried by the error.
    #[must_use]
    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            Self::AllCandidatesFailed { attempts, .. } => attempts,
        }
    }

    /// Consumes the error and returns the attempt log.
    #[must_use]
    pub fn into_attempts(self) -> Vec<AttemptRecord> {
        match self {
            Self::AllCandidatesFailed { attempts, .. } => attempts,
        }
    }
}

/// Request validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The prompt is empty or whitespace only.
    #[error("prompt cannot be empty")]
    EmptyPrompt,

    /// The prompt exceeds the configured maximum length.
    #[error("prompt exceeds maximum length of {max} characters (got {len})")]
    PromptTooLong {
        /// Prompt length in characters.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A per-phase model override is blank.
    #[error("model override for phase '{phase}' is empty")]
    EmptyModelOverride {
        /// The phase name.
        phase: String,
    },
}

/// Operator mistakes in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A phase has no model assigned.
    #[error("no model configured for '{purpose}'")]
    MissingModel {
        /// The configuration key (e.g. "analysis").
        purpose: String,
    },

    /// A model used by a phase has no fallback table entry.
    #[error("fallback table has no entry for model '{model}'")]
    MissingFallbackEntry {
        /// The model identifier.
        model: String,
    },

    /// The fallback table lists a blank alternate.
    #[error("fallback table entry for '{model}' contains an empty alternate")]
    MalformedFallbackEntry {
        /// The model whose alternates are malformed.
        model: String,
    },

    /// A numeric setting is out of range.
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue {
        /// The setting key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The settings document could not be parsed.
    #[error("failed to parse settings: {0}")]
    Parse(String),

    /// The settings file could not be read.
    #[error("failed to read settings: {0}")]
    Io(String),
}

impl ConfigError {
    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
