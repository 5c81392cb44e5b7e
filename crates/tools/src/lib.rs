//! Tool dispatcher for patchwright.
//!
//! The dispatcher is the only component that touches a workspace on the
//! oracle's behalf. Each tool lives in its own module:
//!
//! - `search_code`: regex search over file contents
//! - `list_files`: glob listing of the tree
//! - `read_file`: whole files and inclusive line slices
//! - `edit_file`: in-place edits of existing files
//! - `create_file`: new files, never overwriting
//! - `get_diff`: the unified diff since the base revision
//!
//! Nothing here executes repository code.

pub mod create_file;
pub mod dispatcher;
pub mod edit_file;
pub mod get_diff;
pub mod list_files;
pub mod read_file;
pub mod search_code;

pub use dispatcher::{ToolDispatcher, ToolLimits};
