//! Runs one phase through the fallback resolver.

use super::{prompts, Phase, PhaseResult, PhaseSpec};
use crate::client::{ChatMessage, ChatOptions};
use crate::fallback::{AttemptRecord, Candidate, FallbackResolver};
use std::time::Instant;
use tracing::{debug, warn};

/// Executes phases. Never returns an error: exhausted fallback yields a
/// failed [`PhaseResult`] carrying the full attempt log.
#[derive(Debug, Clone)]
pub struct PhaseExecutor {
    resolver: FallbackResolver,
    presenter_model: String,
    reflect: bool,
}

impl PhaseExecutor {
    /// Creates an executor that cleans up review output with `presenter_model`.
    #[must_use]
    pub fn new(resolver: FallbackResolver, presenter_model: impl Into<String>) -> Self {
        Self {
            resolver,
            presenter_model: presenter_model.into(),
            reflect: false,
        }
    }

    /// Enables generate, critique, improve reflection for every phase.
    #[must_use]
    pub fn reflecting(mut self, reflect: bool) -> Self {
        self.reflect = reflect;
        self
    }

    /// Returns true if reflection is enabled.
    #[must_use]
    pub fn is_reflecting(&self) -> bool {
        self.reflect
    }

    /// Runs one phase.
    ///
    /// `prior` holds the results of the earlier phases of this run. The
    /// override model, when given, replaces the spec's default model as the
    /// first candidate.
    pub async fn run_phase(
        &self,
        spec: &PhaseSpec,
        prior: &[PhaseResult],
        original_prompt: &str,
        model_override: Option<&str>,
    ) -> PhaseResult {
        let start = Instant::now();
        let model = model_override.unwrap_or(&spec.default_model);
        let messages = prompts::phase_messages(spec.phase, &spec.role, original_prompt, prior);
        let options = spec
            .temperature
            .map(ChatOptions::with_temperature)
            .unwrap_or_default();

        debug!(phase = %spec.phase, model = %model, "Running phase");

        let resolution = match self.resolver.execute(model, &messages, &options).await {
            Ok(resolution) => resolution,
            Err(e) => {
                warn!(phase = %spec.phase, error = %e, "Phase exhausted all candidates");
                return PhaseResult::failed(spec.phase, e.into_attempts())
                    .with_duration_ms(elapsed_ms(start));
            }
        };

        let mut attempts = resolution.attempts;
        let mut output = resolution.text;

        if self.reflect {
            output = self
                .refine(&resolution.model, &messages, output, &options, &mut attempts)
                .await;
        }

        let mut presenter_model = None;
        if spec.phase == Phase::ComprehensiveReview {
            match self.present(&output).await {
                Ok((model, presented, presenter_attempts)) => {
                    attempts.extend(presenter_attempts);
                    presenter_model = Some(model);
                    output = presented;
                }
                Err(presenter_attempts) => {
                    warn!(
                        presenter = %self.presenter_model,
                        "Presenter unavailable, keeping unpresented review"
                    );
                    attempts.extend(presenter_attempts);
                }
            }
        }

        let mut result = PhaseResult::succeeded(spec.phase, resolution.model, output, attempts)
            .with_duration_ms(elapsed_ms(start));
        result.presenter_model = presenter_model;
        result
    }

    async fn present(
        &self,
        review: &str,
    ) -> Result<(String, String, Vec<AttemptRecord>), Vec<AttemptRecord>> {
        let messages = prompts::presenter_messages(review);
        match self
            .resolver
            .execute(&self.presenter_model, &messages, &ChatOptions::default())
            .await
        {
            Ok(resolution) => {
                let presented = prompts::strip_presenter_marker(&resolution.text);
                // A bare marker leaves nothing to show.
                let text = if presented.is_empty() {
                    review.to_string()
                } else {
                    presented.to_string()
                };
                Ok((resolution.model, text, resolution.attempts))
            }
            Err(e) => Err(e.into_attempts()),
        }
    }

    async fn refine(
        &self,
        model: &str,
        request: &[ChatMessage],
        draft: String,
        options: &ChatOptions,
        attempts: &mut Vec<AttemptRecord>,
    ) -> String {
        let pinned = [Candidate {
            model: model.to_string(),
            max_attempts: self.resolver.retry_config().max_attempts,
        }];

        let critique = match self
            .resolver
            .execute_candidates(model, &pinned, &prompts::critique_messages(request, &draft), options)
            .await
        {
            Ok(resolution) => {
                attempts.extend(resolution.attempts);
                resolution.text
            }
            Err(e) => {
                warn!(model = %model, "Critique failed, keeping draft");
                attempts.extend(e.into_attempts());
                return draft;
            }
        };

        match self
            .resolver
            .execute_candidates(
                model,
                &pinned,
                &prompts::improve_messages(request, &draft, &critique),
                options,
            )
            .await
        {
            Ok(resolution) => {
                attempts.extend(resolution.attempts);
                resolution.text
            }
            Err(e) => {
                warn!(model = %model, "Improvement failed, keeping draft");
                attempts.extend(e.into_attempts());
                draft
            }
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
