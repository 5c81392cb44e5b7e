//! The patchwright agent loop.
//!
//! One run is a strictly sequential cycle:
//!
//! 1. **Assemble** the decision context from the issue, the tool catalog and
//!    the committed action history
//! 2. **Decide**: ask the oracle for exactly one tool call or `submit`
//! 3. **Dispatch** the call through the tool dispatcher
//! 4. **Commit** the action (and, on the last step, the finalization) in one
//!    store transaction
//!
//! No step starts before the previous one is durably committed, so a run
//! interrupted anywhere can be resumed from its last committed step.

pub mod controller;
pub mod history;

pub use controller::{AgentController, RunOutcome};
pub use history::{build_context, history_entry, history_from_actions, truncate_observation};
