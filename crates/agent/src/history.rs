//! Decision-context assembly from committed actions.

use patchwright_core::agent::SolveConfig;
use patchwright_core::instance::Instance;
use patchwright_core::oracle::{DecisionContext, HistoryEntry};
use patchwright_core::store::NewAction;
use patchwright_core::tool::{ToolCall, ToolOutcome};
use patchwright_core::trajectory::Action;

/// Clip `text` to at most `max_chars` characters, noting how much was cut.
pub fn truncate_observation(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{kept}\n[... truncated {} of {total} characters]", total - max_chars)
}

fn entry(
    step: u32,
    tool_name: &str,
    input: &serde_json::Value,
    outcome: &ToolOutcome,
    max_chars: usize,
) -> HistoryEntry {
    HistoryEntry {
        step,
        tool_name: tool_name.to_string(),
        input: input.clone(),
        observation: truncate_observation(&outcome.observation(), max_chars),
        success: outcome.success,
    }
}

/// The oracle's view of an action just committed.
pub fn history_entry(action: &NewAction, max_chars: usize) -> HistoryEntry {
    entry(action.step, &action.tool_name, &action.input, &action.outcome, max_chars)
}

/// The oracle's view of a stored history. Actions must already be in step
/// order, as [`TrajectoryStore::get_run_actions`] returns them.
///
/// [`TrajectoryStore::get_run_actions`]: patchwright_core::store::TrajectoryStore::get_run_actions
pub fn history_from_actions(actions: &[Action], max_chars: usize) -> Vec<HistoryEntry> {
    actions
        .iter()
        .map(|a| entry(a.step, &a.tool_name, &a.input, &a.outcome, max_chars))
        .collect()
}

pub fn build_context(
    instance: &Instance,
    config: &SolveConfig,
    history: &[HistoryEntry],
    step: u32,
) -> DecisionContext {
    DecisionContext {
        oracle_id: config.oracle_id.clone(),
        problem_statement: instance.problem_statement.clone(),
        hints: instance.hints.clone(),
        catalog: ToolCall::catalog(),
        history: history.to_vec(),
        step,
        max_steps: config.max_steps,
        temperature: config.temperature,
        max_output_tokens: config.max_output_tokens,
    }
}
