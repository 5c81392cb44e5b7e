//! Runs, actions, evaluations and cache entries.
//!
//! These are the records the trajectory store persists. A [`Run`] is one
//! attempt at an [`Instance`](crate::instance::Instance); its [`Action`]s are
//! the committed steps, numbered contiguously from 1.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tool::ToolOutcome;

/// Unique identifier for a run (trajectory).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RunId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a run. Only `Running → {Completed, Failed, Exhausted}` is
/// legal; every other status is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Exhausted,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Exhausted => "exhausted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Status only moves forward.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(self, Self::Running) && next.is_terminal()
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "exhausted" => Ok(Self::Exhausted),
            other => Err(format!("unknown run status '{other}'")),
        }
    }
}

/// One attempt by the agent to solve an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: RunId,
    pub instance_id: String,

    /// Which decision oracle (model + parameters) drove this run
    pub oracle_id: String,

    pub status: RunStatus,

    /// Number of committed actions
    pub steps: u32,

    /// Unified diff captured at termination
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_patch: Option<String>,

    pub resolved: bool,

    /// Fatal error text for `Failed` runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// One committed step of a run. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub run_id: RunId,

    /// 1-based, contiguous within the run
    pub step: u32,

    pub tool_name: String,

    /// Tool arguments as sent by the oracle
    pub input: serde_json::Value,

    /// The observation returned to the oracle
    pub outcome: ToolOutcome,

    pub timestamp: DateTime<Utc>,
}

/// Outcome of scoring a run's patch. Written by the external evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub instance_id: String,
    pub run_id: RunId,
    pub resolved: bool,
    pub oracle_id: String,

    /// Free-form evaluator notes (test summary, log path, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    pub timestamp: DateTime<Utc>,
}

/// Memoized file content at a (repository, revision, path) triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub repo: String,
    pub revision: String,
    pub path: String,
    pub content: String,

    /// Hex SHA-256 of `content`
    pub digest: String,

    pub cached_at: DateTime<Utc>,
}
