//! `patchwright stats` — Show database statistics.

use patchwright_config::AppConfig;
use patchwright_store::StoreStatistics;

use super::{CmdResult, open_store};

pub async fn run(config: &AppConfig) -> CmdResult {
    let store = open_store(config).await?;
    let stats = store.statistics().await?;
    store.close().await;

    println!("patchwright statistics");
    println!("======================");
    println!("  Database:      {}", config.database_path().display());
    print!("{}", render(&stats));
    Ok(())
}

pub fn render(stats: &StoreStatistics) -> String {
    let mut text = String::new();
    text.push_str(&format!("  Instances:     {}\n", stats.instances));
    text.push_str(&format!(
        "  Runs:          {} ({} running, {} completed, {} failed, {} exhausted)\n",
        stats.runs, stats.running, stats.completed, stats.failed, stats.exhausted
    ));
    text.push_str(&format!("  Actions:       {}\n", stats.actions));
    text.push_str(&format!("  Avg steps:     {:.1}\n", stats.average_steps));
    text.push_str(&format!(
        "  Evaluated:     {} ({} resolved, {:.1}%)\n",
        stats.evaluations,
        stats.resolved,
        stats.resolve_rate() * 100.0
    ));
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_resolve_rate_as_percentage() {
        let stats = StoreStatistics {
            instances: 3,
            runs: 4,
            completed: 3,
            exhausted: 1,
            evaluations: 4,
            resolved: 1,
            average_steps: 12.5,
            ..StoreStatistics::default()
        };
        let text = render(&stats);
        assert!(text.contains("4 (0 running, 3 completed, 0 failed, 1 exhausted)"));
        assert!(text.contains("Avg steps:     12.5"));
        assert!(text.contains("4 (1 resolved, 25.0%)"));
    }
}
