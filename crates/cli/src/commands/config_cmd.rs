//! `patchwright config` — Show the effective configuration.

use std::path::Path;

use patchwright_config::AppConfig;

pub fn show(config: &AppConfig, path: Option<&Path>, default: bool) {
    if default {
        print!("{}", AppConfig::default_toml());
        return;
    }

    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
    let source = if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not found, using defaults)", path.display())
    };
    println!("# Source:   {source}");
    println!("# Database: {}", config.database_path().display());
    println!("# Repos:    {}", config.repos_dir().display());
    for warning in warnings(config) {
        println!("# Warning:  {warning}");
    }
    println!();
    print!("{}", config.redacted_toml());
}

/// Settings that load fine but will likely fail at solve time.
pub fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    if !config.has_api_key() {
        warnings.push("No API key set (PATCHWRIGHT_API_KEY or OPENAI_API_KEY)");
    }
    if config.agent.max_observation_chars < 200 {
        warnings.push("agent.max_observation_chars below 200 hides most tool output");
    }
    if config.tools.max_search_results == 0 || config.tools.max_list_entries == 0 {
        warnings.push("A zero tools limit makes search or listing return nothing");
    }
    warnings
}
