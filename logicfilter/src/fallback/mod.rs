//! Model fallback resolution.
//!
//! Given a requested model, the resolver builds an ordered candidate list
//! (`[requested] + alternates`, deduplicated) and tries each candidate in turn
//! against the [`ModelClient`], retrying within a per-candidate budget.
//! Transport errors never escape: they are recorded as [`AttemptRecord`]s and
//! surface only through [`ResolutionError::AllCandidatesFailed`].

mod retry;

pub use retry::{BackoffStrategy, JitterStrategy, RetryConfig, Sleeper, TokioSleeper};

use crate::client::{ChatMessage, ChatOptions, ModelClient};
use crate::config::FallbackTable;
use crate::errors::{ErrorKind, ResolutionError, TransportError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One model call made while resolving a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Model tried.
    pub model: String,
    /// Attempt number for this model, starting at 1.
    pub attempt: u32,
    /// Error kind, or `None` for a successful call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    /// Error message for failed calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Wall-clock latency of the call.
    pub latency_ms: u64,
}

impl AttemptRecord {
    /// Records a successful call.
    #[must_use]
    pub fn success(model: impl Into<String>, attempt: u32, latency_ms: u64) -> Self {
        Self {
            model: model.into(),
            attempt,
            error: None,
            message: None,
            latency_ms,
        }
    }

    /// Records a failed call.
    #[must_use]
    pub fn failure(
        model: impl Into<String>,
        attempt: u32,
        kind: ErrorKind,
        message: impl Into<String>,
        latency_ms: u64,
    ) -> Self {
        Self {
            model: model.into(),
            attempt,
            error: Some(kind),
            message: Some(message.into()),
            latency_ms,
        }
    }

    /// Returns true if the call succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A model to try plus its attempt budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Model identifier.
    pub model: String,
    /// Maximum attempts for this model.
    pub max_attempts: u32,
}

/// Successful resolution of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Model that produced the text.
    pub model: String,
    /// Generated text.
    pub text: String,
    /// Every attempt made, the last one being the success.
    pub attempts: Vec<AttemptRecord>,
}

/// Builds the deduplicated candidate order for a model.
#[must_use]
pub fn candidate_order(table: &FallbackTable, requested: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    std::iter::once(requested)
        .chain(table.alternates(requested).iter().map(String::as_str))
        .filter(|model| seen.insert(*model))
        .map(str::to_string)
        .collect()
}

/// Tries candidate models in order until one produces text.
#[derive(Clone)]
pub struct FallbackResolver {
    client: Arc<dyn ModelClient>,
    table: Arc<FallbackTable>,
    retry: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl FallbackResolver {
    /// Creates a resolver that sleeps on the tokio timer.
    #[must_use]
    pub fn new(client: Arc<dyn ModelClient>, table: Arc<FallbackTable>, retry: RetryConfig) -> Self {
        Self {
            client,
            table,
            retry,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replaces the backoff sleeper.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Returns the retry configuration.
    #[must_use]
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Resolves the ordered candidates for a model, each with the given budget.
    #[must_use]
    pub fn resolve(&self, requested: &str, max_attempts_per_candidate: u32) -> Vec<Candidate> {
        candidate_order(&self.table, requested)
            .into_iter()
            .map(|model| Candidate {
                model,
                max_attempts: max_attempts_per_candidate,
            })
            .collect()
    }

    /// Executes a chat request with fallback using the configured budget.
    pub async fn execute(
        &self,
        requested: &str,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<Resolution, ResolutionError> {
        let candidates = self.resolve(requested, self.retry.max_attempts);
        self.execute_candidates(requested, &candidates, messages, options)
            .await
    }

    /// Executes a chat request against an explicit candidate list.
    ///
    /// Candidates are tried strictly in order. `ModelNotFound` moves to the
    /// next candidate immediately; `Timeout` and `ServiceUnavailable` back off
    /// before the next attempt; `UpstreamError` retries without delay. A blank
    /// reply counts as `UpstreamError`.
    pub async fn execute_candidates(
        &self,
        requested: &str,
        candidates: &[Candidate],
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<Resolution, ResolutionError> {
        let mut attempts = Vec::new();

        for (index, candidate) in candidates.iter().enumerate() {
            if index > 0 {
                info!(requested = %requested, fallback = %candidate.model, "Trying fallback model");
            }

            for attempt in 1..=candidate.max_attempts.max(1) {
                let start = Instant::now();
                let outcome = self
                    .client
                    .invoke(&candidate.model, messages, options)
                    .await
                    .and_then(|text| {
                        if text.trim().is_empty() {
                            Err(TransportError::upstream("empty response from model"))
                        } else {
                            Ok(text)
                        }
                    });
                let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

                match outcome {
                    Ok(text) => {
                        debug!(model = %candidate.model, attempt, latency_ms, "Model call succeeded");
                        attempts.push(AttemptRecord::success(&candidate.model, attempt, latency_ms));
                        return Ok(Resolution {
                            model: candidate.model.clone(),
                            text,
                            attempts,
                        });
                    }
                    Err(e) => {
                        let kind = e.kind();
                        warn!(
                            model = %candidate.model,
                            attempt,
                            error_kind = %kind,
                            error = %e,
                            "Model call failed"
                        );
                        attempts.push(AttemptRecord::failure(
                            &candidate.model,
                            attempt,
                            kind,
                            e.to_string(),
                            latency_ms,
                        ));

                        if kind.is_fail_fast() {
                            break;
                        }
                        if kind.should_back_off() && attempt < candidate.max_attempts {
                            let delay = self.retry.delay_for(attempt - 1);
                            debug!(
                                model = %candidate.model,
                                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                                "Backing off before retry"
                            );
                            self.sleeper.sleep(delay).await;
                        }
                    }
                }
            }
        }

        Err(ResolutionError::AllCandidatesFailed {
            requested: requested.to_string(),
            attempts,
        })
    }
}

impl std::fmt::Debug for FallbackResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackResolver")
            .field("table_entries", &self.table.len())
            .field("retry", &self.retry)
            .finish()
    }
}
