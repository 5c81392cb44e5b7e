//! Error types for the patchwright domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum. Expected tool failures are
//! not errors at all: they travel as [`ToolOutcome`](crate::tool::ToolOutcome)
//! values so the oracle can see them.

use std::path::PathBuf;
use thiserror::Error;

use crate::trajectory::{RunId, RunStatus};

/// The top-level error type for all patchwright operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Decision layer ---
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    // --- Repository checkout ---
    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    // --- Persistence ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Tool mediation ---
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the decision oracle transport. A response that arrived but
/// could not be understood is not an error: it becomes
/// [`Decision::Malformed`](crate::oracle::Decision::Malformed).
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Oracle has no more decisions: {0}")]
    Exhausted(String),
}

/// Failures reported by a [`Workspace`](crate::workspace::Workspace).
///
/// `NotFound`, `AlreadyExists`, `PermissionDenied` and `Vcs` are expected
/// conditions that the dispatcher turns into failed tool results. `Io` and
/// `Unavailable` are infrastructure faults.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("path already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("version control failure: {0}")]
    Vcs(String),

    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("workspace unavailable: {0}")]
    Unavailable(String),
}

impl WorkspaceError {
    /// Classify an `std::io::Error` raised while touching `path`.
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }

    /// True for disk faults and unreachable checkouts.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Unavailable(_))
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Run not found: {0}")]
    RunNotFound(RunId),

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Instance {0} is already stored with different content")]
    InstanceConflict(String),

    #[error("A running run already exists for instance {instance_id} with oracle {oracle_id}: {run_id}")]
    RunConflict {
        instance_id: String,
        oracle_id: String,
        run_id: RunId,
    },

    #[error("Non-contiguous step for run {run_id}: expected {expected}, got {got}")]
    NonContiguousStep { run_id: RunId, expected: u32, got: u32 },

    #[error("Run {run_id} is {status}, not running")]
    NotRunning { run_id: RunId, status: RunStatus },

    #[error("Invalid finalization status for run {run_id}: {status}")]
    InvalidTransition { run_id: RunId, status: RunStatus },

    #[error("Run {0} is still running and cannot be evaluated")]
    RunNotFinished(RunId),
}

/// An infrastructure fault raised while executing a tool. Distinct from a
/// failed tool result: the step is aborted and the run stays resumable.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("workspace fault during {tool}: {source}")]
    Infrastructure {
        tool: String,
        #[source]
        source: WorkspaceError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oracle_error_displays_correctly() {
        let err = Error::Oracle(OracleError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn io_errors_are_classified() {
        let nf = WorkspaceError::from_io(
            "src/lib.rs",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(nf, WorkspaceError::NotFound { .. }));
        assert!(!nf.is_infrastructure());

        let other = WorkspaceError::from_io("src/lib.rs", std::io::Error::other("disk on fire"));
        assert!(other.is_infrastructure());
    }

    #[test]
    fn non_contiguous_step_mentions_both_numbers() {
        let err = StoreError::NonContiguousStep {
            run_id: RunId::from("r-1"),
            expected: 4,
            got: 6,
        };
        let text = err.to_string();
        assert!(text.contains("expected 4"));
        assert!(text.contains("got 6"));
    }
}
