//! `patchwright replay` — Print the committed actions of a run.

use patchwright_config::AppConfig;
use patchwright_core::store::TrajectoryStore;
use patchwright_core::trajectory::{Action, RunId};

use super::{CmdResult, open_store};

pub async fn run(config: &AppConfig, run_id: &str, json: bool) -> CmdResult {
    let store = open_store(config).await?;
    let run_id = RunId::from(run_id);
    let run = store
        .get_run(&run_id)
        .await?
        .ok_or_else(|| format!("Unknown run {run_id}"))?;
    let actions = store.get_run_actions(&run_id).await?;
    store.close().await;

    if json {
        for action in &actions {
            println!("{}", serde_json::to_string(action)?);
        }
        return Ok(());
    }

    println!(
        "Run {} — {} with {} — {} after {} step(s)",
        run.run_id, run.instance_id, run.oracle_id, run.status, run.steps
    );
    for action in &actions {
        println!();
        print!("{}", render_action(action));
    }
    Ok(())
}

/// Header line, arguments and observation of one action.
pub fn render_action(action: &Action) -> String {
    let mark = if action.outcome.success { "ok" } else { "failed" };
    let mut text = format!(
        "── step {} · {} · {} · {}\n",
        action.step,
        action.tool_name,
        mark,
        action.timestamp.format("%H:%M:%S")
    );
    if action.input.as_object().is_some_and(|args| !args.is_empty()) {
        text.push_str(&format!("args: {}\n", action.input));
    }
    let observation = action.outcome.observation();
    text.push_str(&observation);
    if !observation.ends_with('\n') {
        text.push('\n');
    }
    text
}
