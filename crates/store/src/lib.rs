//! Durable storage for patchwright.
//!
//! A single SQLite database holds five tables:
//! - `instances`: the bug-fix tasks
//! - `runs`: one row per attempt, with status and step count
//! - `actions`: committed steps, keyed by (run, step)
//! - `evaluations`: external scoring results, one per run
//! - `file_cache`: file content keyed by (repository, revision, path)
//!
//! Action appends and finalization are transactional; a process killed
//! mid-step leaves the run `running` at its last committed step.

pub mod catalog;
pub mod sqlite;

pub use catalog::{RunSummary, StoreStatistics};
pub use sqlite::SqliteStore;
