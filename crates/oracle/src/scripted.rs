//! Scripted oracle: a fixed sequence of decisions.
//!
//! Used by tests and by `solve --replay`, which re-drives the decisions of
//! a stored run against a fresh checkout.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use patchwright_core::error::OracleError;
use patchwright_core::oracle::{Decision, DecisionContext, DecisionOracle};
use patchwright_core::tool::{MALFORMED_TOOL, ToolErrorCode};
use patchwright_core::trajectory::Action;

pub struct ScriptedOracle {
    id: String,
    script: Mutex<VecDeque<Result<Decision, OracleError>>>,

    /// Returned once the script runs out; `None` means fail with
    /// [`OracleError::Exhausted`].
    fallback: Option<Decision>,

    seen: Mutex<Vec<DecisionContext>>,
}

impl ScriptedOracle {
    pub fn new(id: impl Into<String>, decisions: Vec<Decision>) -> Self {
        Self::from_results(id, decisions.into_iter().map(Ok).collect())
    }

    /// Script that may also contain transport failures.
    pub fn from_results(id: impl Into<String>, results: Vec<Result<Decision, OracleError>>) -> Self {
        Self {
            id: id.into(),
            script: Mutex::new(results.into()),
            fallback: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Rebuild the decisions behind a stored action history.
    pub fn from_actions(id: impl Into<String>, actions: &[Action]) -> Self {
        let decisions = actions
            .iter()
            .map(|action| {
                if action.outcome.code == Some(ToolErrorCode::MalformedDecision) {
                    Decision::Malformed {
                        tool: (action.tool_name != MALFORMED_TOOL).then(|| action.tool_name.clone()),
                        raw: action.input["raw"]
                            .as_str()
                            .map(String::from)
                            .unwrap_or_else(|| action.input.to_string()),
                        reason: action.outcome.error.clone().unwrap_or_default(),
                    }
                } else {
                    Decision::from_parts(&action.tool_name, &action.input)
                }
            })
            .collect();
        Self::new(id, decisions)
    }

    /// Keep answering `decision` after the script is used up.
    pub fn then_repeat(mut self, decision: Decision) -> Self {
        self.fallback = Some(decision);
        self
    }

    /// Decisions not yet handed out.
    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Every context this oracle was asked to decide on, in call order.
    pub fn contexts(&self) -> Vec<DecisionContext> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    fn id(&self) -> &str {
        &self.id
    }

    async fn decide(&self, context: &DecisionContext) -> std::result::Result<Decision, OracleError> {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(context.clone());

        let next = self.script.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        match next {
            Some(result) => result,
            None => self.fallback.clone().ok_or_else(|| {
                OracleError::Exhausted(format!("script ended before step {}", context.step))
            }),
        }
    }
}
