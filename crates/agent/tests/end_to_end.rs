//! Whole-loop scenarios: scripted oracle, real checkout, on-disk store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use patchwright_agent::AgentController;
use patchwright_core::error::{Error, OracleError, StoreError, WorkspaceError};
use patchwright_core::event::EventBus;
use patchwright_core::instance::Instance;
use patchwright_core::oracle::{Decision, DecisionContext, DecisionOracle};
use patchwright_core::store::TrajectoryStore;
use patchwright_core::tool::{EditFileArgs, EditOperation, ReadFileArgs, ReadFileLinesArgs, ToolCall};
use patchwright_core::trajectory::{RunId, RunStatus};
use patchwright_core::workspace::Workspace;
use patchwright_core::SolveConfig;
use patchwright_oracle::ScriptedOracle;
use patchwright_store::SqliteStore;
use patchwright_tools::{ToolDispatcher, ToolLimits};
use patchwright_workspace::{DiffMode, FsWorkspace};
use tokio::sync::Notify;

const CALC: &str = "\"\"\"Tiny calculator.\"\"\"

import math


def mul(a, b):
    return a * b


def div(a, b):
    return a / b


def add(a, b):
    return a - b


def sqrt(x):
    return math.sqrt(x)


def neg(a):
    return -a
";

fn instance() -> Instance {
    Instance::new(
        "demo__calc-1",
        "demo/calc",
        "0123abc",
        "add() returns the difference instead of the sum",
    )
}

struct Harness {
    dir: tempfile::TempDir,
    store: Arc<SqliteStore>,
    mode: DiffMode,
}

impl Harness {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        std::fs::create_dir_all(repo.join("calc")).unwrap();
        std::fs::write(repo.join("calc/ops.py"), CALC).unwrap();
        std::fs::write(repo.join("README.md"), "calc\n").unwrap();
        let store = Arc::new(SqliteStore::open_file(&dir.path().join("runs.db")).await.unwrap());
        Self {
            dir,
            store,
            mode: DiffMode::Snapshot,
        }
    }

    /// The same checkout committed to git, or `None` without a git binary.
    async fn with_git() -> Option<Self> {
        let mut harness = Self::new().await;
        let repo = harness.repo();
        if !git(&repo, &["init", "-q"]) {
            return None;
        }
        assert!(git(&repo, &["add", "."]));
        assert!(git(&repo, &["commit", "-q", "-m", "base"]));
        harness.mode = DiffMode::Git;
        Some(harness)
    }

    fn repo(&self) -> PathBuf {
        self.dir.path().join("repo")
    }

    async fn workspace(&self) -> Arc<FsWorkspace> {
        Arc::new(FsWorkspace::open(self.repo(), self.mode).await.unwrap())
    }

    async fn controller(&self, oracle: Arc<dyn DecisionOracle>) -> AgentController {
        let workspace = self.workspace().await;
        self.controller_over(oracle, workspace)
    }

    fn controller_over(
        &self,
        oracle: Arc<dyn DecisionOracle>,
        workspace: Arc<dyn Workspace>,
    ) -> AgentController {
        AgentController::new(
            oracle,
            ToolDispatcher::new(workspace, ToolLimits::default()),
            self.store.clone(),
            Arc::new(EventBus::default()),
        )
    }

    /// Simulate a restarted process: a fresh store handle and a freshly
    /// opened workspace over whatever is on disk now.
    async fn reopen(&self, oracle: Arc<dyn DecisionOracle>) -> (AgentController, Arc<SqliteStore>) {
        self.store.close().await;
        let store = Arc::new(SqliteStore::open_file(&self.dir.path().join("runs.db")).await.unwrap());
        let controller = AgentController::new(
            oracle,
            ToolDispatcher::new(self.workspace().await, ToolLimits::default()),
            store.clone(),
            Arc::new(EventBus::default()),
        );
        (controller, store)
    }
}

fn git(dir: &Path, args: &[&str]) -> bool {
    std::process::Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["-c", "user.email=dev@example.com", "-c", "user.name=dev"])
        .args(args)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn read_lines(start: usize, end: usize) -> Decision {
    Decision::Invoke(ToolCall::ReadFileLines(ReadFileLinesArgs {
        path: "calc/ops.py".into(),
        start_line: start,
        end_line: end,
    }))
}

fn fix_add() -> Decision {
    Decision::Invoke(ToolCall::EditFile(EditFileArgs {
        path: "calc/ops.py".into(),
        operation: EditOperation::Replace {
            old_content: "def add(a, b):\n    return a - b".into(),
            new_content: "def add(a, b):\n    return a + b".into(),
        },
    }))
}

#[tokio::test]
async fn one_line_fix_completes_in_three_steps() {
    let harness = Harness::new().await;
    let oracle = Arc::new(ScriptedOracle::new(
        "scripted",
        vec![read_lines(10, 20), fix_add(), Decision::Submit],
    ));
    let controller = harness.controller(oracle.clone()).await;

    let outcome = controller
        .solve(&instance(), &SolveConfig::new("scripted"))
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.steps, 3);

    let patch = outcome.final_patch.clone().unwrap();
    assert_eq!(patch.lines().filter(|l| l.starts_with("@@")).count(), 1);
    assert!(patch.contains("calc/ops.py"));
    assert!(patch.contains("-    return a - b"));
    assert!(patch.contains("+    return a + b"));

    let run = harness.store.get_run(&outcome.run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.steps, 3);
    assert!(!run.resolved);
    assert_eq!(run.final_patch, outcome.final_patch);

    let actions = harness.store.get_run_actions(&outcome.run_id).await.unwrap();
    let steps: Vec<u32> = actions.iter().map(|a| a.step).collect();
    assert_eq!(steps, vec![1, 2, 3]);
    assert_eq!(actions[0].tool_name, "read_file_lines");
    assert!(actions[0].outcome.output.contains("def add(a, b):"));
    assert_eq!(actions[1].tool_name, "edit_file");
    assert!(actions[1].outcome.success);
    assert_eq!(actions[2].tool_name, "submit");

    // The oracle saw the slice it asked for before editing.
    let contexts = oracle.contexts();
    assert_eq!(contexts.len(), 3);
    assert_eq!(contexts[1].history.len(), 1);
    assert!(contexts[1].history[0].observation.contains("return a - b"));
}

#[tokio::test]
async fn oracle_that_never_submits_exhausts_the_budget() {
    let harness = Harness::new().await;
    let oracle = Arc::new(ScriptedOracle::new("looping", vec![fix_add()]).then_repeat(read_lines(1, 3)));
    let controller = harness.controller(oracle.clone()).await;

    let outcome = controller
        .solve(&instance(), &SolveConfig::new("looping").with_max_steps(5))
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Exhausted);
    assert_eq!(outcome.steps, 5);
    assert_eq!(oracle.call_count(), 5);

    // Best-effort diff still captures the edit from step 1.
    assert!(outcome.final_patch.as_deref().unwrap().contains("+    return a + b"));

    let run = harness.store.get_run(&outcome.run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Exhausted);
    assert!(!run.resolved);
    assert!(run.error.is_none());
    assert_eq!(harness.store.get_run_actions(&outcome.run_id).await.unwrap().len(), 5);
}

#[tokio::test]
async fn missing_file_is_an_observation_not_a_failure() {
    let harness = Harness::new().await;
    let oracle = Arc::new(ScriptedOracle::new(
        "scripted",
        vec![
            Decision::Invoke(ToolCall::ReadFile(ReadFileArgs {
                path: "calc/missing.py".into(),
            })),
            Decision::Submit,
        ],
    ));
    let controller = harness.controller(oracle.clone()).await;

    let outcome = controller
        .solve(&instance(), &SolveConfig::new("scripted"))
        .await
        .unwrap();

    let actions = harness.store.get_run_actions(&outcome.run_id).await.unwrap();
    assert!(!actions[0].outcome.success);
    assert!(actions[0].outcome.error.as_deref().unwrap().contains("file not found"));

    // The run kept going: the failure reached the oracle as history.
    let contexts = oracle.contexts();
    let second = &contexts[1];
    assert!(!second.history[0].success);
    assert!(second.history[0].observation.contains("file not found"));
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.steps, 2);
    assert_eq!(outcome.final_patch.as_deref(), Some(""));
}

#[tokio::test]
async fn repeated_oracle_failure_fails_the_run() {
    let harness = Harness::new().await;
    let oracle = Arc::new(ScriptedOracle::from_results(
        "flaky",
        vec![
            Ok(read_lines(1, 2)),
            Err(OracleError::Timeout("no reply in 120s".into())),
            Err(OracleError::Network("connection reset".into())),
        ],
    ));
    let controller = harness.controller(oracle).await;

    let outcome = controller
        .solve(&instance(), &SolveConfig::new("flaky").with_oracle_retries(1))
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.steps, 1);
    assert!(outcome.final_patch.is_none());
    assert!(outcome.error.as_deref().unwrap().contains("connection reset"));

    let run = harness.store.get_run(&outcome.run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.final_patch.is_none());
    assert_eq!(run.steps, 1);
}

/// Hands out its script, then blocks forever and signals that it did.
struct StallingOracle {
    inner: ScriptedOracle,
    stalled: Arc<Notify>,
}

#[async_trait]
impl DecisionOracle for StallingOracle {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn decide(&self, context: &DecisionContext) -> Result<Decision, OracleError> {
        if self.inner.remaining() == 0 {
            self.stalled.notify_one();
            std::future::pending::<()>().await;
        }
        self.inner.decide(context).await
    }
}

/// Run `script` until the oracle runs dry, then drop the solve future
/// mid-step as a killed process would.
async fn interrupt_after(harness: &Harness, script: Vec<Decision>) -> RunId {
    let expected_steps = script.len() as u32;
    let stalled = Arc::new(Notify::new());
    let oracle = Arc::new(StallingOracle {
        inner: ScriptedOracle::new("scripted", script),
        stalled: stalled.clone(),
    });
    let controller = harness.controller(oracle).await;
    let task = instance();
    let config = SolveConfig::new("scripted");
    tokio::select! {
        result = controller.solve(&task, &config) => panic!("solve finished early: {result:?}"),
        _ = stalled.notified() => {}
    }

    let running = harness
        .store
        .latest_running_run("demo__calc-1", "scripted")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(running.steps, expected_steps);
    running.run_id
}

#[tokio::test]
async fn interrupted_run_resumes_without_replaying_steps() {
    let Some(harness) = Harness::with_git().await else {
        // git not installed
        return;
    };
    let config = SolveConfig::new("scripted");

    // First process: a read and the fix commit, then the process dies.
    let run_id = interrupt_after(&harness, vec![read_lines(10, 20), fix_add()]).await;
    let before = harness.store.get_run_actions(&run_id).await.unwrap();

    // A second fresh solve for the same pair is refused.
    let controller = harness
        .controller(Arc::new(ScriptedOracle::new("scripted", vec![Decision::Submit])))
        .await;
    match controller.solve(&instance(), &config).await {
        Err(Error::Store(StoreError::RunConflict { run_id: existing, .. })) => assert_eq!(existing, run_id),
        other => panic!("Expected RunConflict, got: {other:?}"),
    }

    // Second process: the edit from the first is only on disk, and the
    // final patch must still carry it.
    let resumed_oracle = Arc::new(ScriptedOracle::new("scripted", vec![Decision::Submit]));
    let (controller, store) = harness.reopen(resumed_oracle.clone()).await;

    let outcome = controller.resume(&run_id, &instance(), &config).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.steps, 3);
    let patch = outcome.final_patch.unwrap();
    assert!(patch.contains("-    return a - b"), "{patch}");
    assert!(patch.contains("+    return a + b"), "{patch}");

    let contexts = resumed_oracle.contexts();
    let first_context = &contexts[0];
    assert_eq!(first_context.step, 3);
    assert_eq!(first_context.history.len(), 2);
    assert_eq!(first_context.history[1].tool_name, "edit_file");

    let after = store.get_run_actions(&run_id).await.unwrap();
    assert_eq!(after.len(), 3);
    assert_eq!(&after[..2], &before[..]);
    assert_eq!(after.iter().map(|a| a.step).collect::<Vec<_>>(), vec![1, 2, 3]);
}

#[tokio::test]
async fn snapshot_run_that_edited_files_is_not_resumed() {
    let harness = Harness::new().await;
    let run_id = interrupt_after(&harness, vec![fix_add()]).await;

    let resumed_oracle = Arc::new(ScriptedOracle::new("scripted", vec![Decision::Submit]));
    let (controller, store) = harness.reopen(resumed_oracle.clone()).await;

    let err = controller
        .resume(&run_id, &instance(), &SolveConfig::new("scripted"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config { .. }), "{err}");
    assert_eq!(resumed_oracle.call_count(), 0);

    // Nothing was committed over the lost edit.
    let run = store.get_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Running);
    assert_eq!(run.steps, 1);
}

#[tokio::test]
async fn snapshot_run_that_only_read_resumes() {
    let harness = Harness::new().await;
    let run_id = interrupt_after(&harness, vec![read_lines(1, 5)]).await;

    let resumed_oracle = Arc::new(ScriptedOracle::new("scripted", vec![fix_add(), Decision::Submit]));
    let (controller, _store) = harness.reopen(resumed_oracle).await;

    let outcome = controller
        .resume(&run_id, &instance(), &SolveConfig::new("scripted"))
        .await
        .unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.steps, 3);
    assert!(outcome.final_patch.unwrap().contains("+    return a + b"));
}

#[tokio::test]
async fn solve_refuses_to_rewrite_a_stored_instance() {
    let harness = Harness::new().await;
    harness.store.register_instance(&instance()).await.unwrap();

    let mut rewritten = instance();
    rewritten.base_commit = "fffffff".into();
    let controller = harness
        .controller(Arc::new(ScriptedOracle::new("scripted", vec![Decision::Submit])))
        .await;
    let err = controller
        .solve(&rewritten, &SolveConfig::new("scripted"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::InstanceConflict(_))), "{err}");

    let stored = harness.store.get_instance("demo__calc-1").await.unwrap().unwrap();
    assert_eq!(stored.base_commit, "0123abc");
    assert!(harness.store.list_runs(None, 10).await.unwrap().is_empty());
}

/// A checkout whose disk has started failing.
struct FailingDisk {
    root: PathBuf,
}

#[async_trait]
impl Workspace for FailingDisk {
    fn root(&self) -> &Path {
        &self.root
    }
    async fn read(&self, path: &Path) -> Result<Vec<u8>, WorkspaceError> {
        Err(WorkspaceError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::other("input/output error"),
        })
    }
    async fn write(&self, path: &Path, _content: &str) -> Result<(), WorkspaceError> {
        Err(WorkspaceError::Unavailable(path.display().to_string()))
    }
    async fn create(&self, path: &Path, _content: &str) -> Result<(), WorkspaceError> {
        Err(WorkspaceError::Unavailable(path.display().to_string()))
    }
    async fn list(&self) -> Result<Vec<PathBuf>, WorkspaceError> {
        Err(WorkspaceError::Unavailable("unmounted".into()))
    }
    async fn diff(&self) -> Result<String, WorkspaceError> {
        Err(WorkspaceError::Unavailable("unmounted".into()))
    }
}

#[tokio::test]
async fn infrastructure_fault_leaves_run_resumable() {
    let harness = Harness::new().await;
    let oracle = Arc::new(ScriptedOracle::new(
        "scripted",
        vec![Decision::Invoke(ToolCall::ReadFile(ReadFileArgs {
            path: "calc/ops.py".into(),
        }))],
    ));
    let workspace = Arc::new(FailingDisk { root: harness.repo() });
    let controller = harness.controller_over(oracle, workspace);

    let err = controller
        .solve(&instance(), &SolveConfig::new("scripted"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Dispatch(_)));

    let run = harness
        .store
        .latest_running_run("demo__calc-1", "scripted")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(run.status, RunStatus::Running);
    assert_eq!(run.steps, 0);
}
