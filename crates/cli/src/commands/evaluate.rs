//! `patchwright evaluate` — Record an external evaluation result.

use patchwright_config::AppConfig;
use patchwright_core::trajectory::RunId;

use super::{CmdResult, open_store};

pub async fn run(
    config: &AppConfig,
    run_id: &str,
    resolved: bool,
    details: Option<String>,
) -> CmdResult {
    let store = open_store(config).await?;
    let run_id = RunId::from(run_id);
    let evaluation = store
        .record_evaluation(&run_id, resolved, details.as_deref())
        .await?;
    store.close().await;

    println!(
        "Run {} on {} marked {}",
        evaluation.run_id,
        evaluation.instance_id,
        if evaluation.resolved { "resolved" } else { "unresolved" }
    );
    Ok(())
}
