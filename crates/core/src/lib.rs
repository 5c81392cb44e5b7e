//! # patchwright core
//!
//! Domain types, collaborator traits, and error definitions for the
//! patchwright repair agent. This crate performs no I/O: it defines the
//! model that the workspace, store, oracle, and agent crates implement
//! against.
//!
//! ## Layout
//!
//! - [`instance`]: the immutable bug-fix task
//! - [`trajectory`]: runs, actions, evaluations, cache entries
//! - [`tool`]: the closed tool-call type and the uniform result envelope
//! - [`oracle`]: the decision-oracle seam
//! - [`workspace`]: the repository checkout seam
//! - [`store`]: the trajectory persistence seam
//! - [`agent`]: the immutable solve configuration
//! - [`event`]: run progress events

pub mod agent;
pub mod error;
pub mod event;
pub mod instance;
pub mod oracle;
pub mod store;
pub mod tool;
pub mod trajectory;
pub mod workspace;

// Re-export key types at crate root for ergonomics
pub use agent::SolveConfig;
pub use error::{Error, Result};
pub use event::{EventBus, RunEvent};
pub use instance::Instance;
pub use oracle::{Decision, DecisionContext, DecisionOracle, HistoryEntry};
pub use store::{FileCache, Finalization, NewAction, TrajectoryStore};
pub use tool::{ToolCall, ToolDefinition, ToolErrorCode, ToolOutcome};
pub use trajectory::{Action, CacheEntry, Evaluation, Run, RunId, RunStatus};
pub use workspace::Workspace;
