//! The agent controller: drives one instance to a terminal run status.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use patchwright_core::agent::SolveConfig;
use patchwright_core::error::{Error, OracleError, StoreError};
use patchwright_core::event::{EventBus, RunEvent};
use patchwright_core::instance::Instance;
use patchwright_core::oracle::{Decision, DecisionContext, DecisionOracle, HistoryEntry};
use patchwright_core::store::{Finalization, NewAction, TrajectoryStore};
use patchwright_core::tool::{MALFORMED_TOOL, SUBMIT_TOOL, ToolErrorCode, ToolOutcome, modifies_files};
use patchwright_core::trajectory::{Run, RunId, RunStatus};
use patchwright_tools::ToolDispatcher;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::history::{build_context, history_entry, history_from_actions};

/// Longest pause honoured for a rate-limited oracle before retrying.
const MAX_RATE_LIMIT_PAUSE: Duration = Duration::from_secs(30);

/// What a finished (or refused-to-continue) run looks like to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub status: RunStatus,
    pub steps: u32,
    pub final_patch: Option<String>,
    pub error: Option<String>,
}

impl RunOutcome {
    pub fn from_run(run: &Run) -> Self {
        Self {
            run_id: run.run_id.clone(),
            status: run.status,
            steps: run.steps,
            final_patch: run.final_patch.clone(),
            error: run.error.clone(),
        }
    }

    fn finished(run_id: &RunId, steps: u32, finalization: Finalization) -> Self {
        Self {
            run_id: run_id.clone(),
            status: finalization.status,
            steps,
            final_patch: finalization.final_patch,
            error: finalization.error,
        }
    }
}

/// Owns the step loop for runs against one workspace.
///
/// Errors returned from [`solve`](Self::solve) and [`resume`](Self::resume)
/// are persistence or infrastructure faults: the run is left `running` at
/// its last committed step and can be resumed. Everything the agent itself
/// got wrong ends in an `Ok(RunOutcome)` with a terminal status.
pub struct AgentController {
    oracle: Arc<dyn DecisionOracle>,
    dispatcher: ToolDispatcher,
    store: Arc<dyn TrajectoryStore>,
    event_bus: Arc<EventBus>,
}

impl AgentController {
    pub fn new(
        oracle: Arc<dyn DecisionOracle>,
        dispatcher: ToolDispatcher,
        store: Arc<dyn TrajectoryStore>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            oracle,
            dispatcher,
            store,
            event_bus,
        }
    }

    /// Start a fresh run of `instance`.
    ///
    /// Refuses with [`StoreError::RunConflict`] if the (instance, oracle)
    /// pair already has a `running` run; resume that one instead.
    pub async fn solve(&self, instance: &Instance, config: &SolveConfig) -> Result<RunOutcome, Error> {
        self.check_config(config)?;

        self.store.register_instance(instance).await?;
        if let Some(existing) = self
            .store
            .latest_running_run(&instance.instance_id, &config.oracle_id)
            .await?
        {
            return Err(StoreError::RunConflict {
                instance_id: instance.instance_id.clone(),
                oracle_id: config.oracle_id.clone(),
                run_id: existing.run_id,
            }
            .into());
        }

        let run_id = self
            .store
            .create_run(&instance.instance_id, &config.oracle_id)
            .await?;

        info!(
            run_id = %run_id,
            instance_id = %instance.instance_id,
            oracle = %config.oracle_id,
            max_steps = config.max_steps,
            "Run started"
        );

        self.drive(&run_id, instance, config, Vec::new()).await
    }

    /// Continue an interrupted run from its last committed step.
    ///
    /// A run that is already terminal is reported as-is. A run that changed
    /// files cannot be continued over a workspace whose baseline was lost
    /// when it was reopened, since its final patch would miss those edits.
    pub async fn resume(
        &self,
        run_id: &RunId,
        instance: &Instance,
        config: &SolveConfig,
    ) -> Result<RunOutcome, Error> {
        self.check_config(config)?;

        let run = self
            .store
            .get_run(run_id)
            .await?
            .ok_or_else(|| StoreError::RunNotFound(run_id.clone()))?;

        if run.instance_id != instance.instance_id || run.oracle_id != config.oracle_id {
            return Err(Error::Config {
                message: format!(
                    "run {run_id} belongs to instance {} with oracle {}, not {} with {}",
                    run.instance_id, run.oracle_id, instance.instance_id, config.oracle_id
                ),
            });
        }

        if run.status.is_terminal() {
            debug!(run_id = %run_id, status = %run.status, "Run already finished");
            return Ok(RunOutcome::from_run(&run));
        }

        self.store.register_instance(instance).await?;

        let actions = self.store.get_run_actions(run_id).await?;
        if actions.len() != run.steps as usize {
            return Err(StoreError::Storage(format!(
                "run {run_id} records {} steps but has {} actions",
                run.steps,
                actions.len()
            ))
            .into());
        }

        if !self.dispatcher.workspace().baseline_survives_reopen()
            && let Some(edit) = actions
                .iter()
                .find(|a| a.outcome.success && modifies_files(&a.tool_name))
        {
            return Err(Error::Config {
                message: format!(
                    "run {run_id} changed files at step {} before it was interrupted; \
                     a snapshot workspace cannot see those edits, resume it over a git checkout",
                    edit.step
                ),
            });
        }

        info!(
            run_id = %run_id,
            instance_id = %instance.instance_id,
            resumed_at_step = run.steps,
            "Resuming run"
        );

        let history = history_from_actions(&actions, config.max_observation_chars);
        self.drive(run_id, instance, config, history).await
    }

    /// Resume the pair's `running` run if there is one, otherwise start a
    /// new run.
    pub async fn solve_or_resume(
        &self,
        instance: &Instance,
        config: &SolveConfig,
    ) -> Result<RunOutcome, Error> {
        self.check_config(config)?;
        match self
            .store
            .latest_running_run(&instance.instance_id, &config.oracle_id)
            .await?
        {
            Some(run) => self.resume(&run.run_id, instance, config).await,
            None => self.solve(instance, config).await,
        }
    }

    fn check_config(&self, config: &SolveConfig) -> Result<(), Error> {
        if config.max_steps == 0 {
            return Err(Error::Config {
                message: "max_steps must be at least 1".into(),
            });
        }
        if config.oracle_id != self.oracle.id() {
            return Err(Error::Config {
                message: format!(
                    "configured oracle '{}' does not match the attached oracle '{}'",
                    config.oracle_id,
                    self.oracle.id()
                ),
            });
        }
        Ok(())
    }

    /// The step loop. `history` holds every committed action of the run.
    async fn drive(
        &self,
        run_id: &RunId,
        instance: &Instance,
        config: &SolveConfig,
        mut history: Vec<HistoryEntry>,
    ) -> Result<RunOutcome, Error> {
        let mut steps = history.len() as u32;

        self.event_bus.publish(RunEvent::RunStarted {
            run_id: run_id.clone(),
            instance_id: instance.instance_id.clone(),
            resumed_at_step: steps,
            timestamp: Utc::now(),
        });

        // Only reachable when a resumed run meets a smaller budget.
        if steps >= config.max_steps {
            let finalization = Finalization::exhausted(self.best_effort_diff(run_id).await);
            self.store.finalize_run(run_id, &finalization).await?;
            return Ok(self.finish(run_id, steps, finalization));
        }

        loop {
            let step = steps + 1;
            let context = build_context(instance, config, &history, step);

            let decision = match self.decide(run_id, &context, config).await {
                Ok(decision) => decision,
                Err(e) => {
                    warn!(run_id = %run_id, step, error = %e, "Oracle failed; failing run");
                    let finalization = Finalization::failed(e.to_string());
                    self.store.finalize_run(run_id, &finalization).await?;
                    return Ok(self.finish(run_id, steps, finalization));
                }
            };

            let started = Instant::now();
            let (action, mut finalization) = match decision {
                Decision::Submit => {
                    let patch = self.dispatcher.workspace().diff().await?;
                    let action = NewAction::new(
                        run_id.clone(),
                        step,
                        SUBMIT_TOOL,
                        serde_json::json!({}),
                        ToolOutcome::ok(patch.clone()),
                    );
                    (action, Some(Finalization::completed(patch)))
                }
                Decision::Invoke(call) => {
                    debug!(run_id = %run_id, step, tool = call.name(), "Dispatching tool");
                    let outcome = self.dispatcher.dispatch(&call).await?;
                    let action =
                        NewAction::new(run_id.clone(), step, call.name(), call.arguments(), outcome);
                    (action, None)
                }
                Decision::Malformed { tool, raw, reason } => {
                    debug!(run_id = %run_id, step, reason = %reason, "Malformed decision");
                    let action = NewAction::new(
                        run_id.clone(),
                        step,
                        tool.unwrap_or_else(|| MALFORMED_TOOL.to_string()),
                        serde_json::json!({ "raw": raw }),
                        ToolOutcome::fail(ToolErrorCode::MalformedDecision, reason),
                    );
                    (action, None)
                }
            };

            if finalization.is_none() && step >= config.max_steps {
                info!(run_id = %run_id, step, "Step budget reached");
                finalization = Some(Finalization::exhausted(self.best_effort_diff(run_id).await));
            }

            match &finalization {
                Some(fin) => self.store.append_final_action(&action, fin).await?,
                None => self.store.append_action(&action).await?,
            }
            steps = step;

            self.event_bus.publish(RunEvent::StepCommitted {
                run_id: run_id.clone(),
                step,
                tool_name: action.tool_name.clone(),
                success: action.outcome.success,
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            });

            if let Some(finalization) = finalization {
                return Ok(self.finish(run_id, steps, finalization));
            }

            history.push(history_entry(&action, config.max_observation_chars));
        }
    }

    /// Ask the oracle, retrying transport failures `oracle_retries` times.
    async fn decide(
        &self,
        run_id: &RunId,
        context: &DecisionContext,
        config: &SolveConfig,
    ) -> Result<Decision, OracleError> {
        let attempts = config.oracle_retries.saturating_add(1);
        let mut attempt = 1;
        loop {
            match self.oracle.decide(context).await {
                Ok(decision) => return Ok(decision),
                Err(e) if attempt < attempts => {
                    warn!(
                        run_id = %run_id,
                        step = context.step,
                        attempt,
                        error = %e,
                        "Oracle call failed, retrying"
                    );
                    self.event_bus.publish(RunEvent::OracleRetried {
                        run_id: run_id.clone(),
                        step: context.step,
                        attempt,
                        error_message: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    if let OracleError::RateLimited { retry_after_secs } = e {
                        let pause = Duration::from_secs(retry_after_secs).min(MAX_RATE_LIMIT_PAUSE);
                        tokio::time::sleep(pause).await;
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn best_effort_diff(&self, run_id: &RunId) -> Option<String> {
        match self.dispatcher.workspace().diff().await {
            Ok(diff) => Some(diff),
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Could not capture diff for exhausted run");
                None
            }
        }
    }

    fn finish(&self, run_id: &RunId, steps: u32, finalization: Finalization) -> RunOutcome {
        info!(
            run_id = %run_id,
            status = %finalization.status,
            steps,
            "Run finished"
        );
        self.event_bus.publish(RunEvent::RunFinished {
            run_id: run_id.clone(),
            status: finalization.status,
            steps,
            timestamp: Utc::now(),
        });
        RunOutcome::finished(run_id, steps, finalization)
    }
}
