//! Repository workspaces for patchwright.
//!
//! Provides:
//! - **Path confinement**: every tool path is resolved inside the checkout
//! - **FsWorkspace**: file read/write/list over a checked-out directory
//! - **Diff backends**: `git diff`, or an in-process snapshot of the tree
//!   taken when the workspace is opened

pub mod diff;
pub mod fs;
pub mod path;

pub use diff::{DiffMode, unified_diff};
pub use fs::FsWorkspace;
pub use path::{PathValidationError, resolve_in_root};
