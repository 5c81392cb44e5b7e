//! Rendering a [`DecisionContext`] as a chat transcript.
//!
//! The transcript is rebuilt from scratch on every decision: a system
//! prompt with the tool catalog, the issue, then one assistant/user pair per
//! committed action. Nothing is carried between calls, so a resumed run
//! sees exactly the history the store holds.

use patchwright_core::oracle::{DecisionContext, HistoryEntry};
use patchwright_core::tool::{SUBMIT_TOOL, ToolDefinition};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

pub fn build_messages(context: &DecisionContext) -> Vec<PromptMessage> {
    let mut messages = Vec::with_capacity(2 + context.history.len() * 2);
    messages.push(PromptMessage::new(Role::System, system_prompt(&context.catalog)));
    messages.push(PromptMessage::new(Role::User, problem_prompt(context)));

    for entry in &context.history {
        messages.push(PromptMessage::new(Role::Assistant, render_call(entry)));
        messages.push(PromptMessage::new(Role::User, render_result(entry)));
    }

    if !context.history.is_empty() {
        messages.push(PromptMessage::new(
            Role::User,
            format!(
                "Step {} of {}. Choose the next tool, or call {SUBMIT_TOOL} when the fix is in place.",
                context.step, context.max_steps
            ),
        ));
    }

    messages
}

pub fn system_prompt(catalog: &[ToolDefinition]) -> String {
    let mut prompt = String::from(
        "You are an expert software engineer fixing a bug in a code repository.\n\
         \n\
         Work in small steps: search for the relevant code, read it, identify the root \
         cause, make a minimal targeted edit that follows the existing style, and review \
         your change with get_diff.\n\
         \n\
         Available tools:\n",
    );

    for tool in catalog {
        prompt.push_str(&format!(
            "- {}: {}\n  parameters: {}\n",
            tool.name, tool.description, tool.parameters
        ));
    }

    prompt.push_str(&format!(
        "\nCall exactly one tool per reply. If you cannot use function calling, answer with\n\
         TOOL: <tool name>\n\
         ARGS: <JSON object of arguments>\n\
         \n\
         When you are confident the bug is fixed, call {SUBMIT_TOOL} (or reply with just: COMPLETE).\n"
    ));
    prompt
}

fn problem_prompt(context: &DecisionContext) -> String {
    let mut prompt = format!("Issue to fix:\n\n{}\n", context.problem_statement);
    if let Some(hints) = context.hints.as_deref().filter(|h| !h.trim().is_empty()) {
        prompt.push_str(&format!("\nAdditional hints:\n{hints}\n"));
    }
    prompt.push_str(&format!(
        "\nYou have {} steps. Please analyze this issue and implement a fix.",
        context.max_steps
    ));
    prompt
}

fn render_call(entry: &HistoryEntry) -> String {
    format!("TOOL: {}\nARGS: {}", entry.tool_name, entry.input)
}

fn render_result(entry: &HistoryEntry) -> String {
    let status = if entry.success { "ok" } else { "failed" };
    format!(
        "Tool result (step {}, {status}):\n{}",
        entry.step, entry.observation
    )
}
