//! Runs the phases of a request in order.

use super::progress::{notify, ProgressEvent, ProgressSink};
use super::{
    CancellationToken, FailureCollector, NoOpProgress, PipelineMode, PipelineRequest, PipelineRun,
    RunStatus,
};
use crate::client::ModelClient;
use crate::config::EnhancerConfig;
use crate::errors::{ConfigError, EnhancerError};
use crate::fallback::{FallbackResolver, Sleeper};
use crate::phases::{PhaseExecutor, PhaseSpec};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Drives requests through the phases of their mode.
///
/// Phase failures never escape: a failed phase is passed through and the run
/// is marked degraded, and once more phases fail than the configuration
/// tolerates the run stops and is marked failed. Only validation and
/// configuration errors are returned as `Err`.
#[derive(Debug)]
pub struct PipelineOrchestrator {
    config: Arc<EnhancerConfig>,
    resolver: FallbackResolver,
    sequence: AtomicU64,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator after validating the configuration.
    pub fn new(config: Arc<EnhancerConfig>, client: Arc<dyn ModelClient>) -> Result<Self, ConfigError> {
        config.validate()?;
        let resolver = FallbackResolver::new(
            client,
            Arc::new(config.fallback.clone()),
            config.retry.clone(),
        );
        Ok(Self {
            config,
            resolver,
            sequence: AtomicU64::new(0),
        })
    }

    /// Replaces the backoff sleeper.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.resolver = self.resolver.with_sleeper(sleeper);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EnhancerConfig {
        &self.config
    }

    /// Returns the phases a resolved mode executes.
    #[must_use]
    pub fn phase_specs(&self, mode: PipelineMode) -> Vec<PhaseSpec> {
        match mode {
            PipelineMode::Standard | PipelineMode::Auto => PhaseSpec::standard(&self.config.models),
            PipelineMode::Boost => PhaseSpec::boost(&self.config.models),
            PipelineMode::Solve => PhaseSpec::solve(&self.config.models),
        }
    }

    /// Runs a request without progress reporting or cancellation.
    pub async fn run_simple(&self, request: PipelineRequest) -> Result<PipelineRun, EnhancerError> {
        self.run(request, &NoOpProgress, &CancellationToken::new())
            .await
    }

    /// Runs a request to a terminal state.
    ///
    /// The request is validated before any phase runs. `cancel` is checked
    /// before each phase.
    pub async fn run(
        &self,
        request: PipelineRequest,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PipelineRun, EnhancerError> {
        request.validate(self.config.max_prompt_chars)?;

        let mode = request
            .mode()
            .unwrap_or(self.config.default_mode)
            .resolve(request.prompt());
        let specs = self.phase_specs(mode);
        let executor = PhaseExecutor::new(self.resolver.clone(), &self.config.models.presenter)
            .reflecting(mode == PipelineMode::Boost);

        let id = Uuid::new_v4();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let created_at = Utc::now();
        let start = Instant::now();

        info!(run_id = %id, sequence, mode = %mode, phases = specs.len(), "Pipeline run started");
        notify(
            progress,
            &ProgressEvent::Started {
                run_id: id,
                mode,
                total_phases: specs.len(),
            },
        );

        let mut phases = Vec::with_capacity(specs.len());
        let mut failures = FailureCollector::new(self.config.max_failed_phases);
        let mut cancel_reason = None;
        let mut aborted = false;

        for (offset, spec) in specs.iter().enumerate() {
            let index = offset + 1;

            if cancel.is_cancelled() {
                let reason = cancel.reason().unwrap_or_else(|| "cancelled".to_string());
                info!(run_id = %id, before_phase = %spec.phase, reason = %reason, "Pipeline run cancelled");
                cancel_reason = Some(reason);
                break;
            }

            notify(
                progress,
                &ProgressEvent::PhaseStarted {
                    index,
                    total_phases: specs.len(),
                    phase: spec.phase,
                    name: spec.name.clone(),
                },
            );

            let result = executor
                .run_phase(
                    spec,
                    &phases,
                    request.prompt(),
                    request.model_override(spec.phase),
                )
                .await;

            let result = if result.is_success() {
                failures.record_completion();
                result
            } else {
                failures.record_failure(&result);
                if failures.should_abort() {
                    warn!(run_id = %id, phase = %spec.phase, "Too many failed phases, aborting run");
                    aborted = true;
                    result
                } else {
                    warn!(run_id = %id, phase = %spec.phase, "Phase failed, passing previous output through");
                    let substitute = phases
                        .last()
                        .map_or(request.prompt(), |p| p.output.as_str())
                        .to_string();
                    result.into_pass_through(substitute)
                }
            };

            notify(
                progress,
                &ProgressEvent::PhaseFinished {
                    index,
                    phase: result.phase,
                    status: result.status,
                    output: result.output.clone(),
                },
            );
            phases.push(result);

            if aborted {
                break;
            }
        }

        let status = if cancel_reason.is_some() {
            RunStatus::Cancelled
        } else if aborted {
            RunStatus::Failed
        } else if failures.has_failures() {
            RunStatus::Degraded
        } else {
            RunStatus::Completed
        };

        info!(
            run_id = %id,
            status = %status,
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Pipeline run finished"
        );
        notify(progress, &ProgressEvent::Finished { run_id: id, status });

        Ok(PipelineRun {
            id,
            sequence,
            created_at,
            request,
            mode,
            status,
            phases,
            failure_summary: failures.summary(specs.len()),
            cancel_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorKind, ValidationError};
    use crate::phases::{Phase, PhaseStatus};
    use crate::pipeline::{CollectingProgress, FnProgress};
    use crate::testing::{isolated_config, phase_model, NoSleep, ScriptedClient, PRESENTER_MODEL};
    use pretty_assertions::assert_eq;

    fn orchestrator(config: EnhancerConfig, client: Arc<ScriptedClient>) -> PipelineOrchestrator {
        PipelineOrchestrator::new(Arc::new(config), client)
            .unwrap()
            .with_sleeper(Arc::new(NoSleep))
    }

    #[tokio::test]
    async fn test_healthy_run_completes_six_phases() {
        let client = Arc::new(ScriptedClient::new());
        let orch = orchestrator(EnhancerConfig::default(), client);
        let progress = CollectingProgress::new();

        let run = orch
            .run(
                PipelineRequest::new("optimize my database query"),
                &progress,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        let order: Vec<Phase> = run.phases.iter().map(|p| p.phase).collect();
        assert_eq!(order, Phase::STANDARD.to_vec());
        assert!(run.phases.iter().all(|p| !p.output.is_empty() && p.is_success()));
        assert!(run.final_output().is_some_and(|s| !s.is_empty()));
        assert!(run.failure_summary.is_none());
        assert_eq!(
            progress.phase_starts(),
            Phase::STANDARD
                .iter()
                .enumerate()
                .map(|(i, p)| (i + 1, p.name().to_string()))
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_output_threads_into_next_phase() {
        let client = Arc::new(ScriptedClient::new());
        let orch = orchestrator(isolated_config(), client.clone());

        let run = orch.run_simple(PipelineRequest::new("write a haiku")).await.unwrap();

        let calls = client.calls();
        assert_eq!(calls[1].model, phase_model(Phase::Generation));
        assert!(calls[1].last_content().contains("write a haiku"));
        assert!(calls[1].last_content().contains(&run.phases[0].output));
        assert_eq!(run.phases[5].presenter_model.as_deref(), Some(PRESENTER_MODEL));
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected_before_any_phase() {
        let client = Arc::new(ScriptedClient::new());
        let orch = orchestrator(EnhancerConfig::default(), client.clone());
        let progress = CollectingProgress::new();

        let err = orch
            .run(PipelineRequest::new(""), &progress, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, EnhancerError::Validation(ValidationError::EmptyPrompt)));
        assert_eq!(err.http_status(), 400);
        assert_eq!(client.call_count(), 0);
        assert!(progress.is_empty());
    }

    #[tokio::test]
    async fn test_prompt_too_long_rejected() {
        let client = Arc::new(ScriptedClient::new());
        let orch = orchestrator(EnhancerConfig::default().with_max_prompt_chars(10), client.clone());

        let err = orch
            .run_simple(PipelineRequest::new("this prompt is too long"))
            .await
            .unwrap_err();

        assert!(matches!(err, EnhancerError::Validation(ValidationError::PromptTooLong { .. })));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_phase_passes_previous_output_through() {
        let client = Arc::new(
            ScriptedClient::new().always_fail(phase_model(Phase::Vetting), ErrorKind::ModelNotFound),
        );
        let orch = orchestrator(isolated_config(), client);

        let run = orch.run_simple(PipelineRequest::new("plan a trip")).await.unwrap();

        assert_eq!(run.status, RunStatus::Degraded);
        assert_eq!(run.phases.len(), 6);
        assert_eq!(run.phases[2].status, PhaseStatus::PassedThrough);
        assert_eq!(run.phases[2].output, run.phases[1].output);
        assert!(run.phases[3..].iter().all(|p| p.is_success()));
        assert!(run.final_output().is_some());

        let summary = run.failure_summary.unwrap();
        assert_eq!(summary.failed_phases(), 1);
        assert!(!summary.aborted);
        assert_eq!(run.status.http_status(), 200);
    }

    #[tokio::test]
    async fn test_blank_phase_reply_degrades_run() {
        let client = Arc::new(
            ScriptedClient::new().script(phase_model(Phase::Vetting), vec![Ok(String::new())]),
        );
        let orch = orchestrator(isolated_config(), client);

        let run = orch.run_simple(PipelineRequest::new("plan a trip")).await.unwrap();

        assert_eq!(run.status, RunStatus::Degraded);
        assert_eq!(run.phases[2].status, PhaseStatus::PassedThrough);
        assert_eq!(run.phases[2].output, run.phases[1].output);
        assert_eq!(
            run.phases[2].attempts[0].error,
            Some(ErrorKind::UpstreamError)
        );
        assert!(run.phases.iter().all(|p| !p.output.is_empty()));
    }

    #[tokio::test]
    async fn test_first_phase_failure_passes_prompt_through() {
        let client = Arc::new(
            ScriptedClient::new().always_fail(phase_model(Phase::Analysis), ErrorKind::Timeout),
        );
        let orch = orchestrator(isolated_config(), client);

        let run = orch.run_simple(PipelineRequest::new("plan a trip")).await.unwrap();

        assert_eq!(run.status, RunStatus::Degraded);
        assert_eq!(run.phases[0].output, "plan a trip");
    }

    #[tokio::test]
    async fn test_two_failed_phases_fail_the_run() {
        let client = Arc::new(
            ScriptedClient::new()
                .always_fail(phase_model(Phase::Analysis), ErrorKind::ServiceUnavailable)
                .always_fail(phase_model(Phase::Vetting), ErrorKind::ModelNotFound),
        );
        let orch = orchestrator(isolated_config(), client.clone());

        let run = orch.run_simple(PipelineRequest::new("plan a trip")).await.unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.status.http_status(), 500);
        assert_eq!(run.phases.len(), 3);
        assert_eq!(run.phases[2].status, PhaseStatus::Failed);
        assert!(run.final_output().is_none());
        assert!(run.failure_summary.unwrap().aborted);
        assert_eq!(client.calls_for(phase_model(Phase::Finalization)), 0);
    }

    #[tokio::test]
    async fn test_failure_threshold_is_configurable() {
        let client = Arc::new(
            ScriptedClient::new()
                .always_fail(phase_model(Phase::Analysis), ErrorKind::ServiceUnavailable)
                .always_fail(phase_model(Phase::Vetting), ErrorKind::ModelNotFound),
        );
        let orch = orchestrator(isolated_config().with_max_failed_phases(2), client);

        let run = orch.run_simple(PipelineRequest::new("plan a trip")).await.unwrap();

        assert_eq!(run.status, RunStatus::Degraded);
        assert_eq!(run.phases.len(), 6);
    }

    #[tokio::test]
    async fn test_panicking_callback_does_not_abort() {
        let client = Arc::new(ScriptedClient::new());
        let orch = orchestrator(isolated_config(), client);
        let sink = FnProgress::new(|event: &ProgressEvent| {
            if matches!(event, ProgressEvent::PhaseStarted { index: 2, .. }) {
                panic!("listener crashed");
            }
        });

        let run = orch
            .run(PipelineRequest::new("plan a trip"), &sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.phases.len(), 6);
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let client = Arc::new(ScriptedClient::new());
        let orch = orchestrator(isolated_config(), client.clone());
        let token = CancellationToken::new();
        token.cancel("user closed window");

        let run = orch
            .run(PipelineRequest::new("plan a trip"), &NoOpProgress, &token)
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Cancelled);
        assert!(run.phases.is_empty());
        assert_eq!(run.cancel_reason.as_deref(), Some("user closed window"));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_between_phases_lets_current_phase_finish() {
        let client = Arc::new(ScriptedClient::new());
        let orch = orchestrator(isolated_config(), client);
        let token = CancellationToken::new();
        let sink = FnProgress::new(|event: &ProgressEvent| {
            if matches!(event, ProgressEvent::PhaseStarted { index: 3, .. }) {
                token.cancel("stop");
            }
        });

        let run = orch
            .run(PipelineRequest::new("plan a trip"), &sink, &token)
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Cancelled);
        assert_eq!(run.phases.len(), 3);
        assert!(run.phases.iter().all(|p| p.is_success()));
    }

    #[tokio::test]
    async fn test_model_override_applies_to_one_phase() {
        let client = Arc::new(ScriptedClient::new());
        let orch = orchestrator(isolated_config(), client.clone());

        let run = orch
            .run_simple(
                PipelineRequest::new("plan a trip").with_model_override(Phase::Enhancement, "custom:7b"),
            )
            .await
            .unwrap();

        assert_eq!(run.phases[4].model.as_deref(), Some("custom:7b"));
        assert_eq!(client.calls_for(phase_model(Phase::Enhancement)), 0);
    }

    #[tokio::test]
    async fn test_solve_mode_runs_solve_then_verify() {
        let client = Arc::new(
            ScriptedClient::new()
                .script(phase_model(Phase::Solve), vec![Ok("41".to_string())])
                .script(PRESENTER_MODEL, vec![Ok("42".to_string())]),
        );
        let orch = orchestrator(isolated_config(), client.clone());

        let run = orch
            .run_simple(PipelineRequest::new("What is 6*7?").with_mode(PipelineMode::Solve))
            .await
            .unwrap();

        assert_eq!(run.mode, PipelineMode::Solve);
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.phases.len(), 2);
        assert_eq!(run.final_output(), Some("42"));

        let calls = client.calls();
        assert!(calls.iter().all(|c| c.options.temperature == Some(0.0)));
        assert!(calls[1].last_content().contains("Proposed answer:\n41"));
    }

    #[tokio::test]
    async fn test_verify_failure_keeps_solved_answer() {
        let client = Arc::new(
            ScriptedClient::new()
                .script(phase_model(Phase::Solve), vec![Ok("41".to_string())])
                .always_fail(PRESENTER_MODEL, ErrorKind::Timeout),
        );
        let orch = orchestrator(isolated_config(), client);

        let run = orch
            .run_simple(PipelineRequest::new("What is 6*7?").with_mode(PipelineMode::Solve))
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Degraded);
        assert_eq!(run.final_output(), Some("41"));
    }

    #[tokio::test]
    async fn test_auto_mode_picks_solve_on_cue() {
        let client = Arc::new(ScriptedClient::new());
        let orch = orchestrator(isolated_config().with_default_mode(PipelineMode::Auto), client);

        let solve = orch
            .run_simple(PipelineRequest::new("List the primes below 10. Return only the numbers."))
            .await
            .unwrap();
        let standard = orch.run_simple(PipelineRequest::new("plan a trip")).await.unwrap();

        assert_eq!(solve.mode, PipelineMode::Solve);
        assert_eq!(solve.phases.len(), 2);
        assert_eq!(standard.mode, PipelineMode::Standard);
        assert_eq!(standard.phases.len(), 6);
    }

    #[tokio::test]
    async fn test_boost_mode_reflects_every_phase() {
        let client = Arc::new(ScriptedClient::new());
        let orch = orchestrator(isolated_config(), client.clone());

        let run = orch
            .run_simple(PipelineRequest::new("plan a trip").with_mode(PipelineMode::Boost))
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        // Draft, critique and improvement per phase, plus the presenter.
        assert_eq!(client.call_count(), 6 * 3 + 1);
    }

    #[tokio::test]
    async fn test_sequence_increases_across_concurrent_runs() {
        let client = Arc::new(ScriptedClient::new());
        let orch = orchestrator(isolated_config(), client);

        let (a, b) = tokio::join!(
            orch.run_simple(PipelineRequest::new("first")),
            orch.run_simple(PipelineRequest::new("second")),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        let mut sequences = vec![a.sequence, b.sequence];
        sequences.sort_unstable();
        assert_eq!(sequences, vec![1, 2]);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EnhancerConfig::default().with_history_capacity(0);
        let result = PipelineOrchestrator::new(Arc::new(config), Arc::new(ScriptedClient::new()));
        assert!(result.is_err());
    }
}
