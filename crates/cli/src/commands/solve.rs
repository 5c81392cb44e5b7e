//! `patchwright solve` — Run the agent on one instance.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use patchwright_agent::{AgentController, RunOutcome};
use patchwright_config::AppConfig;
use patchwright_core::error::{Error, StoreError};
use patchwright_core::event::{EventBus, RunEvent};
use patchwright_core::oracle::DecisionOracle;
use patchwright_core::store::{FileCache, TrajectoryStore};
use patchwright_core::trajectory::RunId;
use patchwright_oracle::{OpenAiCompatOracle, ScriptedOracle};
use patchwright_store::SqliteStore;
use patchwright_tools::ToolDispatcher;
use patchwright_workspace::FsWorkspace;
use tokio::sync::broadcast::error::RecvError;

use super::{CmdResult, open_store};

pub struct SolveOptions {
    pub instance_id: String,
    pub repo_dir: Option<PathBuf>,
    pub resume: bool,
    pub timeout_secs: Option<u64>,
    pub replay: Option<String>,
    pub json: bool,
}

pub async fn run(config: &AppConfig, options: SolveOptions) -> CmdResult {
    let store = Arc::new(open_store(config).await?);
    let instance = store
        .get_instance(&options.instance_id)
        .await?
        .ok_or_else(|| {
            format!(
                "Unknown instance {}; load it with `patchwright import` first",
                options.instance_id
            )
        })?;

    let checkout = options
        .repo_dir
        .clone()
        .unwrap_or_else(|| config.repos_dir().join(instance.slug()));
    if !checkout.is_dir() {
        return Err(format!(
            "No checkout at {}; clone {} at {} there or pass --repo-dir",
            checkout.display(),
            instance.repo,
            instance.base_commit
        )
        .into());
    }

    let mut workspace = FsWorkspace::open(&checkout, config.workspace.diff_mode).await?;
    if config.workspace.cache {
        let cache: Arc<dyn FileCache> = store.clone();
        workspace = workspace.with_cache(cache, &instance.repo, &instance.base_commit);
    }
    let dispatcher = ToolDispatcher::new(Arc::new(workspace), config.tools.clone());

    let mut solve_config = config.solve_config();
    let oracle: Arc<dyn DecisionOracle> = match &options.replay {
        Some(source) => {
            let oracle = replay_oracle(&store, source, &instance.instance_id).await?;
            solve_config.oracle_id = oracle.id().to_string();
            solve_config.max_steps = solve_config.max_steps.max(oracle.remaining() as u32);
            Arc::new(oracle)
        }
        None => Arc::new(model_oracle(config)?),
    };

    let event_bus = Arc::new(EventBus::default());
    let printer = spawn_progress_printer(&event_bus);

    let trajectory_store: Arc<dyn TrajectoryStore> = store.clone();
    let controller = AgentController::new(oracle, dispatcher, trajectory_store, event_bus);

    let attempt = async {
        if options.resume {
            controller.solve_or_resume(&instance, &solve_config).await
        } else {
            controller.solve(&instance, &solve_config).await
        }
    };
    let result = match options.timeout_secs {
        Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), attempt).await {
            Ok(result) => result,
            Err(_) => {
                return Err(format!(
                    "Timed out after {secs}s; the run stays resumable with \
                     `patchwright solve {} --resume`",
                    instance.instance_id
                )
                .into());
            }
        },
        None => attempt.await,
    };

    // Closing the bus lets the printer drain and exit.
    drop(controller);
    let _ = printer.await;
    store.close().await;

    let outcome = result.map_err(|e| describe_failure(e, &instance.instance_id))?;
    print_outcome(&outcome, options.json)?;
    Ok(())
}

fn model_oracle(config: &AppConfig) -> CmdResult<OpenAiCompatOracle> {
    if !config.has_api_key() {
        tracing::warn!(
            api_url = %config.oracle.api_url,
            "No API key configured; set PATCHWRIGHT_API_KEY or OPENAI_API_KEY"
        );
    }
    let oracle = OpenAiCompatOracle::new(
        &config.oracle.model,
        &config.oracle.api_url,
        config.oracle.api_key.clone().unwrap_or_default(),
        Duration::from_secs(config.oracle.request_timeout_secs),
    )?;
    Ok(oracle)
}

/// An oracle that repeats the decisions of stored run `source`.
async fn replay_oracle(
    store: &SqliteStore,
    source: &str,
    instance_id: &str,
) -> CmdResult<ScriptedOracle> {
    let run_id = RunId::from(source);
    let run = store
        .get_run(&run_id)
        .await?
        .ok_or_else(|| format!("Unknown run {run_id}"))?;
    if run.instance_id != instance_id {
        return Err(format!("Run {run_id} belongs to instance {}", run.instance_id).into());
    }
    let actions = store.get_run_actions(&run_id).await?;
    Ok(ScriptedOracle::from_actions(format!("replay:{run_id}"), &actions))
}

fn spawn_progress_printer(event_bus: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut events = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => eprintln!("{}", render_event(&event)),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// One progress line per run event.
pub fn render_event(event: &RunEvent) -> String {
    match event {
        RunEvent::RunStarted {
            run_id,
            instance_id,
            resumed_at_step,
            ..
        } => {
            if *resumed_at_step == 0 {
                format!("▶ run {run_id} started on {instance_id}")
            } else {
                format!("▶ run {run_id} resumed on {instance_id} after step {resumed_at_step}")
            }
        }
        RunEvent::StepCommitted {
            step,
            tool_name,
            success,
            duration_ms,
            ..
        } => {
            let mark = if *success { "✓" } else { "✗" };
            format!("  {mark} step {step:>3}  {tool_name:<16} {duration_ms}ms")
        }
        RunEvent::OracleRetried {
            step,
            attempt,
            error_message,
            ..
        } => format!("  ↻ step {step:>3}  oracle retry {attempt}: {error_message}"),
        RunEvent::RunFinished {
            run_id,
            status,
            steps,
            ..
        } => format!("■ run {run_id} {status} after {steps} step(s)"),
    }
}

fn describe_failure(error: Error, instance_id: &str) -> Box<dyn std::error::Error> {
    match error {
        Error::Store(StoreError::RunConflict { run_id, .. }) => format!(
            "Run {run_id} is still running for {instance_id}; pass --resume to continue it"
        )
        .into(),
        other => Box::new(other),
    }
}

fn print_outcome(outcome: &RunOutcome, json: bool) -> CmdResult {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    println!("Run:     {}", outcome.run_id);
    println!("Status:  {}", outcome.status);
    println!("Steps:   {}", outcome.steps);
    if let Some(error) = &outcome.error {
        println!("Error:   {error}");
    }
    match outcome.final_patch.as_deref() {
        Some("") => println!("Patch:   (empty)"),
        Some(patch) => println!("\n{patch}"),
        None => println!("Patch:   none"),
    }
    Ok(())
}
