//! Decision oracle trait: the abstraction over whatever picks the next step.
//!
//! An oracle sees the problem, the tool catalog and the ordered history of
//! committed actions, and answers with exactly one [`Decision`].
//! Implementations: an OpenAI-compatible LLM client, a scripted replay.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::OracleError;
use crate::tool::{SUBMIT_TOOL, ToolCall, ToolDefinition};

/// What the oracle wants to happen next.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Execute one tool.
    Invoke(ToolCall),

    /// Stop and take the current diff as the final patch.
    Submit,

    /// The oracle answered, but not with anything executable. Fed back as a
    /// failed step so the oracle can correct itself.
    Malformed {
        /// Tool name, if one could be extracted
        tool: Option<String>,
        /// The raw response text
        raw: String,
        /// Why it was rejected
        reason: String,
    },
}

impl Decision {
    /// Interpret a `(name, arguments)` pair proposed by an oracle.
    pub fn from_parts(name: &str, arguments: &serde_json::Value) -> Self {
        if name == SUBMIT_TOOL {
            return Self::Submit;
        }
        match ToolCall::parse(name, arguments) {
            Ok(call) => Self::Invoke(call),
            Err(reason) => Self::Malformed {
                tool: Some(name.to_string()),
                raw: arguments.to_string(),
                reason,
            },
        }
    }

    pub fn is_submit(&self) -> bool {
        matches!(self, Self::Submit)
    }
}

/// One prior step as the oracle sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub step: u32,
    pub tool_name: String,
    pub input: serde_json::Value,

    /// Possibly truncated observation text
    pub observation: String,
    pub success: bool,
}

/// Everything an oracle needs to make one decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionContext {
    /// Oracle identifier the run was started with
    pub oracle_id: String,

    pub problem_statement: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hints: Option<String>,

    /// Ordered tool catalog
    pub catalog: Vec<ToolDefinition>,

    /// Committed actions, in step order
    pub history: Vec<HistoryEntry>,

    /// The step number being decided (1-based)
    pub step: u32,

    pub max_steps: u32,

    /// Sampling temperature, passed through opaquely
    pub temperature: f32,

    /// Response length bound, passed through opaquely
    pub max_output_tokens: u32,
}

/// The core DecisionOracle trait.
///
/// The controller calls `decide()` once per step (plus retries on transport
/// failure) without knowing which oracle is behind it.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Identifier recorded on every run this oracle drives
    /// (e.g. "gpt-4o", "scripted").
    fn id(&self) -> &str;

    /// Propose the next step.
    async fn decide(&self, context: &DecisionContext) -> std::result::Result<Decision, OracleError>;
}
