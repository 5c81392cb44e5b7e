pub mod config_cmd;
pub mod evaluate;
pub mod import;
pub mod replay;
pub mod runs;
pub mod solve;
pub mod stats;

use std::path::Path;

use patchwright_config::AppConfig;
use patchwright_store::SqliteStore;

pub type CmdResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Load `path` if given, otherwise the default config file. Environment
/// overrides apply either way.
pub fn load_config(path: Option<&Path>) -> CmdResult<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_at(path),
        None => AppConfig::load(),
    };
    config.map_err(|e| format!("Failed to load config: {e}").into())
}

/// Open the trajectory database, creating it on first use.
pub async fn open_store(config: &AppConfig) -> CmdResult<SqliteStore> {
    Ok(SqliteStore::open_file(&config.database_path()).await?)
}
