//! Configuration fixtures for pipeline tests.

use crate::config::{EnhancerConfig, FallbackTable, ModelAssignments};
use crate::fallback::{JitterStrategy, RetryConfig};
use crate::phases::Phase;

/// Presenter model used by [`isolated_config`].
pub const PRESENTER_MODEL: &str = "presenter-model";

/// Returns the model [`isolated_config`] assigns to a phase.
#[must_use]
pub fn phase_model(phase: Phase) -> &'static str {
    match phase {
        Phase::Analysis => "analysis-model",
        Phase::Generation => "generation-model",
        Phase::Vetting => "vetting-model",
        Phase::Finalization => "finalization-model",
        Phase::Enhancement => "enhancement-model",
        Phase::ComprehensiveReview | Phase::Solve => "review-model",
        Phase::Verify => PRESENTER_MODEL,
    }
}

/// A configuration where every phase has its own model and no alternates.
///
/// Each model gets a single attempt and backoff has no jitter, so a failing
/// model fails its phase after exactly one call.
#[must_use]
pub fn isolated_config() -> EnhancerConfig {
    let models = ModelAssignments {
        analysis: phase_model(Phase::Analysis).to_string(),
        generation: phase_model(Phase::Generation).to_string(),
        vetting: phase_model(Phase::Vetting).to_string(),
        finalization: phase_model(Phase::Finalization).to_string(),
        enhancement: phase_model(Phase::Enhancement).to_string(),
        comprehensive: phase_model(Phase::ComprehensiveReview).to_string(),
        presenter: PRESENTER_MODEL.to_string(),
        boost: None,
    };

    let fallback = models
        .purposes()
        .into_iter()
        .fold(FallbackTable::empty(), |table, (_, model)| {
            table.with_entry(model, Vec::<String>::new())
        });

    EnhancerConfig::default()
        .with_models(models)
        .with_fallback(fallback)
        .with_retry(
            RetryConfig::new()
                .with_max_attempts(1)
                .with_base_delay_ms(1)
                .with_jitter(JitterStrategy::None),
        )
}
