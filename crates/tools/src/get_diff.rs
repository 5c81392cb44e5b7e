//! `get_diff`: unified diff of every change since the base revision.

use patchwright_core::tool::ToolOutcome;
use patchwright_core::workspace::Workspace;

use crate::dispatcher::Failure;

pub(crate) async fn run(ws: &dyn Workspace) -> Result<ToolOutcome, Failure> {
    let diff = ws.diff().await?;
    if diff.trim().is_empty() {
        return Ok(ToolOutcome::ok("No changes"));
    }
    Ok(ToolOutcome::ok(diff))
}
