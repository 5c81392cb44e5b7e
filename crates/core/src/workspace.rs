//! Workspace trait: a checked-out repository at a fixed base revision.
//!
//! Paths passed to a workspace are relative to [`Workspace::root`] and have
//! already been confined to it by the caller.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::WorkspaceError;

#[async_trait]
pub trait Workspace: Send + Sync {
    /// Absolute filesystem root of the checkout.
    fn root(&self) -> &Path;

    /// Read a file's raw bytes.
    async fn read(&self, path: &Path) -> Result<Vec<u8>, WorkspaceError>;

    /// Replace the content of an existing file.
    async fn write(&self, path: &Path, content: &str) -> Result<(), WorkspaceError>;

    /// Materialize a new file (and its parent directories).
    /// Fails with [`WorkspaceError::AlreadyExists`] without touching an
    /// existing file.
    async fn create(&self, path: &Path, content: &str) -> Result<(), WorkspaceError>;

    /// All regular files under the root, relative and sorted.
    async fn list(&self) -> Result<Vec<PathBuf>, WorkspaceError>;

    /// Unified diff of every change since the base revision.
    async fn diff(&self) -> Result<String, WorkspaceError>;

    /// Whether [`diff`](Self::diff) still measures from the base revision
    /// when the workspace is reopened over a tree that earlier steps edited.
    fn baseline_survives_reopen(&self) -> bool {
        true
    }
}
