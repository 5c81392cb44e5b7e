//! `patchwright runs` and `patchwright instances` — Listings.

use patchwright_config::AppConfig;
use patchwright_store::RunSummary;

use super::{CmdResult, open_store};

pub async fn runs(config: &AppConfig, instance_id: Option<&str>, limit: usize) -> CmdResult {
    let store = open_store(config).await?;
    let runs = store.list_runs(instance_id, limit).await?;
    store.close().await;

    if runs.is_empty() {
        println!("No runs yet — start one with `patchwright solve <instance-id>`");
        return Ok(());
    }
    for summary in &runs {
        println!("{}", run_line(summary));
    }
    Ok(())
}

pub async fn instances(config: &AppConfig, limit: usize) -> CmdResult {
    let store = open_store(config).await?;
    let instances = store.list_instances(limit).await?;
    store.close().await;

    if instances.is_empty() {
        println!("No instances — load some with `patchwright import <file.jsonl>`");
        return Ok(());
    }
    for instance in &instances {
        println!(
            "{:<40} {:<30} {}",
            instance.instance_id,
            instance.repo,
            short(&instance.base_commit)
        );
    }
    Ok(())
}

/// One table row: id, instance, oracle, status, steps, start time and the
/// evaluation verdict when there is one.
pub fn run_line(summary: &RunSummary) -> String {
    let run = &summary.run;
    let verdict = match summary.verdict {
        Some(true) => " ✓resolved",
        Some(false) => " ✗unresolved",
        None => "",
    };
    format!(
        "{}  {:<32} {:<16} {:<9} {:>3} steps  {}{}",
        run.run_id,
        run.instance_id,
        run.oracle_id,
        run.status.as_str(),
        run.steps,
        run.started_at.format("%Y-%m-%d %H:%M"),
        verdict
    )
}

fn short(commit: &str) -> &str {
    commit.get(..12).unwrap_or(commit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use patchwright_core::trajectory::{Run, RunId, RunStatus};

    #[test]
    fn run_line_shows_the_verdict() {
        let mut summary = RunSummary {
            run: Run {
                run_id: RunId::from("r1"),
                instance_id: "demo-1".into(),
                oracle_id: "gpt-4o".into(),
                status: RunStatus::Completed,
                steps: 7,
                final_patch: Some(String::new()),
                resolved: false,
                error: None,
                started_at: Utc::now(),
                finished_at: Some(Utc::now()),
            },
            verdict: None,
        };
        let line = run_line(&summary);
        assert!(line.starts_with("r1  demo-1"));
        assert!(line.contains("completed   7 steps"), "{line}");
        assert!(!line.contains("resolved"));

        summary.verdict = Some(true);
        assert!(run_line(&summary).ends_with("✓resolved"));
        summary.verdict = Some(false);
        assert!(run_line(&summary).ends_with("✗unresolved"));
    }

    #[test]
    fn commits_are_shortened() {
        assert_eq!(short("0123456789abcdef"), "0123456789ab");
        assert_eq!(short("abc"), "abc");
    }
}
