//! Prompt templates and message builders.

use super::{Phase, PhaseResult};
use crate::client::ChatMessage;

/// Prefix the presenter is asked to start its answer with.
pub const PRESENTER_MARKER: &str = "PRESENT TO USER:";

const ANALYSIS_ROLE: &str = "You analyze prompts so they can be improved.\n\n\
Focus on:\n\
1. Core requirements and goals\n\
2. Key components needed\n\
3. Specific constraints or parameters\n\
4. Expected output format\n\
5. Quality criteria\n\n\
Provide a clear, focused analysis that will help in improving this exact prompt.";

const GENERATION_ROLE: &str = "Based on the analysis, generate specific improvements that:\n\
1. Address identified issues\n\
2. Enhance clarity and specificity\n\
3. Add necessary structure\n\
4. Maintain focus on core goals\n\
5. Consider all quality criteria\n\n\
Important: Generate practical, focused improvements that directly enhance the prompt.";

const VETTING_ROLE: &str = "Review the suggested improvements and evaluate how well they enhance the original prompt:\n\
1. Do they address core requirements?\n\
2. Are they clear and specific?\n\
3. Do they maintain focus on the task?\n\
4. Are they practical and implementable?\n\n\
Important: Focus on validating improvements that directly enhance the original prompt.";

const FINALIZATION_ROLE: &str = "Create an improved version of the original prompt that:\n\
1. Maintains the original goal\n\
2. Incorporates validated improvements\n\
3. Uses clear, specific language\n\
4. Adds necessary structure\n\
5. Includes any required constraints\n\n\
Important: Stay focused on the original task.";

const ENHANCEMENT_ROLE: &str = "Polish and refine the improved prompt.\n\n\
Focus on:\n\
1. Making instructions crystal clear\n\
2. Adding any missing details\n\
3. Improving structure\n\
4. Ensuring completeness\n\
5. Maintaining focus\n\n\
Important: Stay focused on improving THIS prompt.";

const REVIEW_ROLE: &str = "Review all versions of this prompt and create an improved version \
that combines the best elements. Create a refined version that maintains the core intent \
while maximizing clarity and effectiveness.";

const SOLVE_ROLE: &str = "You are a precise solver. Follow the problem instructions and return \
ONLY the final answer in the required format. Do not restate the problem and do not add explanations.";

const VERIFY_ROLE: &str = "Verify the proposed answer against the problem. If incorrect, produce \
the corrected answer. Return ONLY the final answer in the required format with no explanation.";

const CRITIQUE_ROLE: &str = "Critique the previous response for completeness, accuracy, clarity, \
structure, relevance. Identify weaknesses and suggest improvements.";

/// Built-in role description for a phase.
#[must_use]
pub fn role_for(phase: Phase) -> &'static str {
    match phase {
        Phase::Analysis => ANALYSIS_ROLE,
        Phase::Generation => GENERATION_ROLE,
        Phase::Vetting => VETTING_ROLE,
        Phase::Finalization => FINALIZATION_ROLE,
        Phase::Enhancement => ENHANCEMENT_ROLE,
        Phase::ComprehensiveReview => REVIEW_ROLE,
        Phase::Solve => SOLVE_ROLE,
        Phase::Verify => VERIFY_ROLE,
    }
}

/// Builds the message list for a phase.
///
/// The system message carries the role description. The user message carries
/// the original prompt followed by the output of every earlier phase that
/// succeeded, oldest first.
#[must_use]
pub fn phase_messages(
    phase: Phase,
    role: &str,
    original_prompt: &str,
    prior: &[PhaseResult],
) -> Vec<ChatMessage> {
    let user = match phase {
        Phase::Solve => original_prompt.to_string(),
        Phase::Verify => {
            let answer = prior
                .iter()
                .rev()
                .find(|r| !r.output.is_empty())
                .map_or("", |r| r.output.as_str());
            format!("Problem:\n{original_prompt}\n\nProposed answer:\n{answer}")
        }
        _ => {
            let mut user = format!("Original Prompt: {original_prompt}");
            for result in prior.iter().filter(|r| r.is_success()) {
                user.push_str("\n\n");
                user.push_str(result.phase.name());
                user.push_str(": ");
                user.push_str(&result.output);
            }
            user
        }
    };

    vec![ChatMessage::system(role), ChatMessage::user(user)]
}

/// Builds the presenter clean-up request for a review output.
#[must_use]
pub fn presenter_messages(review: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::user(format!(
        "You are the final presenter. Clean up this prompt for presentation:\n\n\
         {review}\n\n\
         Requirements:\n\
         1. Remove any markdown formatting\n\
         2. Remove any meta-commentary\n\
         3. Remove any section headers\n\
         4. Present as clean paragraphs\n\
         5. Maintain all important content\n\n\
         Start your response with '{PRESENTER_MARKER}' followed by the final, clean prompt."
    ))]
}

/// Strips the presenter marker (case-insensitive) and surrounding whitespace.
#[must_use]
pub fn strip_presenter_marker(text: &str) -> &str {
    let trimmed = text.trim_start();
    let marker_len = PRESENTER_MARKER.len();
    match trimmed.get(..marker_len) {
        Some(head) if head.eq_ignore_ascii_case(PRESENTER_MARKER) => trimmed[marker_len..].trim(),
        _ => trimmed.trim_end(),
    }
}

/// Builds the critique request for a draft.
#[must_use]
pub fn critique_messages(request: &[ChatMessage], draft: &str) -> Vec<ChatMessage> {
    let mut messages = request.to_vec();
    messages.push(ChatMessage::assistant(draft));
    messages.push(ChatMessage::system(CRITIQUE_ROLE));
    messages.push(ChatMessage::user("Provide critique."));
    messages
}

/// Builds the improvement request for a draft and its critique.
#[must_use]
pub fn improve_messages(request: &[ChatMessage], draft: &str, critique: &str) -> Vec<ChatMessage> {
    let mut messages = request.to_vec();
    messages.push(ChatMessage::assistant(draft));
    messages.push(ChatMessage::user(format!(
        "Improve using this critique: {critique}"
    )));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Role;

    #[test]
    fn test_first_phase_sees_only_prompt() {
        let messages = phase_messages(Phase::Analysis, ANALYSIS_ROLE, "fix my query", &[]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "Original Prompt: fix my query");
    }

    #[test]
    fn test_later_phase_sees_successful_outputs() {
        let prior = vec![
            PhaseResult::succeeded(Phase::Analysis, "a", "the analysis", vec![]),
            PhaseResult::failed(Phase::Generation, vec![]).into_pass_through("the analysis"),
        ];
        let messages = phase_messages(Phase::Vetting, VETTING_ROLE, "fix my query", &prior);
        let user = &messages[1].content;

        assert!(user.starts_with("Original Prompt: fix my query"));
        assert!(user.contains("Analysis: the analysis"));
        assert!(!user.contains("Generation:"));
    }

    #[test]
    fn test_verify_message_carries_answer() {
        let prior = vec![PhaseResult::succeeded(Phase::Solve, "s", "42", vec![])];
        let messages = phase_messages(Phase::Verify, VERIFY_ROLE, "6*7?", &prior);
        assert_eq!(messages[1].content, "Problem:\n6*7?\n\nProposed answer:\n42");
    }

    #[test]
    fn test_solve_message_is_raw_prompt() {
        let messages = phase_messages(Phase::Solve, SOLVE_ROLE, "6*7?", &[]);
        assert_eq!(messages[1].content, "6*7?");
    }

    #[test]
    fn test_strip_presenter_marker() {
        assert_eq!(strip_presenter_marker("PRESENT TO USER: Clean prompt."), "Clean prompt.");
        assert_eq!(strip_presenter_marker("  present to user:\nText\n"), "Text");
        assert_eq!(strip_presenter_marker("No marker here "), "No marker here");
        assert_eq!(strip_presenter_marker("PRESENT"), "PRESENT");
    }

    #[test]
    fn test_reflection_messages() {
        let request = vec![ChatMessage::user("q")];
        let critique = critique_messages(&request, "draft");
        assert_eq!(critique.len(), 4);
        assert_eq!(critique[1].role, Role::Assistant);

        let improve = improve_messages(&request, "draft", "too short");
        assert_eq!(improve[2].content, "Improve using this critique: too short");
    }
}
