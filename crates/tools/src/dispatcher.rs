//! The dispatcher: validates a tool call and runs it against the workspace.

use patchwright_core::error::{DispatchError, WorkspaceError};
use patchwright_core::tool::{ToolCall, ToolErrorCode, ToolOutcome};
use patchwright_core::workspace::Workspace;
use patchwright_workspace::{PathValidationError, resolve_in_root};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::{create_file, edit_file, get_diff, list_files, read_file, search_code};

/// Output bounds applied by the tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolLimits {
    /// Total matches `search_code` reports
    #[serde(default = "default_max_search_results")]
    pub max_search_results: usize,

    /// Matches `search_code` reports per file
    #[serde(default = "default_max_matches_per_file")]
    pub max_matches_per_file: usize,

    /// Paths `list_files` reports
    #[serde(default = "default_max_list_entries")]
    pub max_list_entries: usize,

    /// Largest file `read_file` returns whole, and `search_code` scans
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,
}

fn default_max_search_results() -> usize {
    50
}
fn default_max_matches_per_file() -> usize {
    5
}
fn default_max_list_entries() -> usize {
    200
}
fn default_max_file_bytes() -> usize {
    1024 * 1024
}

impl Default for ToolLimits {
    fn default() -> Self {
        Self {
            max_search_results: default_max_search_results(),
            max_matches_per_file: default_max_matches_per_file(),
            max_list_entries: default_max_list_entries(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

/// Runs [`ToolCall`]s against one workspace.
///
/// Expected failures come back as `Ok` with `success == false`. Only
/// infrastructure faults (disk I/O, an unreachable checkout) are `Err`.
pub struct ToolDispatcher {
    workspace: Arc<dyn Workspace>,
    limits: ToolLimits,
}

impl ToolDispatcher {
    pub fn new(workspace: Arc<dyn Workspace>, limits: ToolLimits) -> Self {
        Self { workspace, limits }
    }

    pub fn workspace(&self) -> &Arc<dyn Workspace> {
        &self.workspace
    }

    pub fn limits(&self) -> &ToolLimits {
        &self.limits
    }

    pub async fn dispatch(&self, call: &ToolCall) -> Result<ToolOutcome, DispatchError> {
        let ws = self.workspace.as_ref();
        let limits = &self.limits;
        let started = Instant::now();

        let result = match call {
            ToolCall::SearchCode(args) => search_code::run(ws, limits, args).await,
            ToolCall::ListFiles(args) => list_files::run(ws, limits, args).await,
            ToolCall::ReadFile(args) => read_file::run(ws, limits, args).await,
            ToolCall::ReadFileLines(args) => read_file::run_lines(ws, args).await,
            ToolCall::EditFile(args) => edit_file::run(ws, args).await,
            ToolCall::CreateFile(args) => create_file::run(ws, args).await,
            ToolCall::GetDiff => get_diff::run(ws).await,
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(outcome) | Err(Failure::Rejected(outcome)) => {
                debug!(
                    tool = call.name(),
                    success = outcome.success,
                    code = outcome.code.map(|c| c.as_str()),
                    duration_ms,
                    "Tool executed"
                );
                Ok(outcome)
            }
            Err(Failure::Fault(source)) => {
                warn!(tool = call.name(), error = %source, "Workspace fault during tool call");
                Err(DispatchError::Infrastructure {
                    tool: call.name().to_string(),
                    source,
                })
            }
        }
    }
}

/// Why a tool stopped early: an expected failure the oracle gets to see,
/// or an infrastructure fault that aborts the step.
#[derive(Debug)]
pub(crate) enum Failure {
    Rejected(ToolOutcome),
    Fault(WorkspaceError),
}

impl Failure {
    pub(crate) fn new(code: ToolErrorCode, error: impl Into<String>) -> Self {
        Self::Rejected(ToolOutcome::fail(code, error))
    }
}

impl From<WorkspaceError> for Failure {
    fn from(err: WorkspaceError) -> Self {
        let code = match &err {
            WorkspaceError::NotFound { .. } => ToolErrorCode::NotFound,
            WorkspaceError::AlreadyExists { .. } => ToolErrorCode::AlreadyExists,
            WorkspaceError::PermissionDenied { .. } => ToolErrorCode::PermissionDenied,
            WorkspaceError::Vcs(_) => ToolErrorCode::Vcs,
            WorkspaceError::Io { .. } | WorkspaceError::Unavailable(_) => return Self::Fault(err),
        };
        Self::new(code, err.to_string())
    }
}

impl From<PathValidationError> for Failure {
    fn from(err: PathValidationError) -> Self {
        match err {
            PathValidationError::Empty => {
                Self::new(ToolErrorCode::InvalidArguments, "path must not be empty")
            }
            PathValidationError::Escape { .. } => Self::new(ToolErrorCode::PathEscape, err.to_string()),
            PathValidationError::CanonicalizeFailed { .. } => {
                Self::Fault(WorkspaceError::Unavailable(err.to_string()))
            }
        }
    }
}

/// Confine `requested` to the workspace root.
pub(crate) fn confine(ws: &dyn Workspace, requested: &str) -> Result<PathBuf, Failure> {
    Ok(resolve_in_root(ws.root(), requested)?)
}

/// Decode file bytes as text. NUL bytes or invalid UTF-8 mean binary.
pub(crate) fn decode_text(path: &str, bytes: Vec<u8>) -> Result<String, Failure> {
    if bytes.contains(&0) {
        return Err(Failure::new(
            ToolErrorCode::NotText,
            format!("binary or non-text file: {path}"),
        ));
    }
    String::from_utf8(bytes).map_err(|_| {
        Failure::new(
            ToolErrorCode::NotText,
            format!("binary or non-text file: {path}"),
        )
    })
}
