//! TrajectoryStore trait: the durable log of runs and their actions.
//!
//! The store is the single source of truth for resumption and replay:
//! a run's `steps` always equals the number of its committed actions, and
//! action step numbers are contiguous from 1.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::instance::Instance;
use crate::tool::ToolOutcome;
use crate::trajectory::{Action, CacheEntry, Run, RunId, RunStatus};

/// An action about to be committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAction {
    pub run_id: RunId,
    pub step: u32,
    pub tool_name: String,
    pub input: serde_json::Value,
    pub outcome: ToolOutcome,
    pub timestamp: DateTime<Utc>,
}

impl NewAction {
    pub fn new(
        run_id: RunId,
        step: u32,
        tool_name: impl Into<String>,
        input: serde_json::Value,
        outcome: ToolOutcome,
    ) -> Self {
        Self {
            run_id,
            step,
            tool_name: tool_name.into(),
            input,
            outcome,
            timestamp: Utc::now(),
        }
    }
}

/// The terminal state a run is moved to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finalization {
    pub status: RunStatus,
    pub final_patch: Option<String>,
    pub resolved: bool,
    pub error: Option<String>,
}

impl Finalization {
    pub fn completed(patch: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Completed,
            final_patch: Some(patch.into()),
            resolved: false,
            error: None,
        }
    }

    pub fn exhausted(patch: Option<String>) -> Self {
        Self {
            status: RunStatus::Exhausted,
            final_patch: patch,
            resolved: false,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Failed,
            final_patch: None,
            resolved: false,
            error: Some(error.into()),
        }
    }

    /// Whether `run` already carries exactly this finalization.
    pub fn matches(&self, run: &Run) -> bool {
        run.status == self.status
            && run.final_patch == self.final_patch
            && run.resolved == self.resolved
            && run.error == self.error
    }
}

/// The core TrajectoryStore trait.
#[async_trait]
pub trait TrajectoryStore: Send + Sync {
    /// Store the instance a run is about to reference. Instances are
    /// immutable: registering an identical instance again is a no-op, and a
    /// differing one fails with [`StoreError::InstanceConflict`].
    async fn register_instance(&self, instance: &Instance) -> Result<(), StoreError>;

    async fn get_instance(&self, instance_id: &str) -> Result<Option<Instance>, StoreError>;

    /// Insert a `running` run with zero steps. Fails with
    /// [`StoreError::RunConflict`] if the pair already has a running run.
    async fn create_run(&self, instance_id: &str, oracle_id: &str) -> Result<RunId, StoreError>;

    /// Commit one action and bump the run's step count atomically.
    /// `action.step` must be exactly `steps + 1`.
    async fn append_action(&self, action: &NewAction) -> Result<(), StoreError>;

    /// Commit a run's last action and its finalization in one transaction.
    async fn append_final_action(
        &self,
        action: &NewAction,
        finalization: &Finalization,
    ) -> Result<(), StoreError>;

    /// Move a running run to a terminal status. Retrying with identical
    /// arguments after success is a no-op.
    async fn finalize_run(&self, run_id: &RunId, finalization: &Finalization) -> Result<(), StoreError>;

    async fn get_run(&self, run_id: &RunId) -> Result<Option<Run>, StoreError>;

    /// Committed actions in step order.
    async fn get_run_actions(&self, run_id: &RunId) -> Result<Vec<Action>, StoreError>;

    /// The most recent `running` run for the pair, if any.
    async fn latest_running_run(
        &self,
        instance_id: &str,
        oracle_id: &str,
    ) -> Result<Option<Run>, StoreError>;
}

/// Content cache keyed by (repository, revision, path).
#[async_trait]
pub trait FileCache: Send + Sync {
    async fn cached_file(
        &self,
        repo: &str,
        revision: &str,
        path: &str,
    ) -> Result<Option<CacheEntry>, StoreError>;

    async fn cache_file(
        &self,
        repo: &str,
        revision: &str,
        path: &str,
        content: &str,
    ) -> Result<(), StoreError>;
}
