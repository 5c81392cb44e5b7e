//! `patchwright import` — Load instances from a JSONL dataset file.

use std::path::Path;

use patchwright_config::AppConfig;
use patchwright_core::error::StoreError;
use patchwright_core::instance::Instance;
use patchwright_core::store::TrajectoryStore;

use super::{CmdResult, open_store};

/// Stored instances are never rewritten unless `replace` is set.
pub async fn run(config: &AppConfig, file: &Path, replace: bool) -> CmdResult {
    let text = std::fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {e}", file.display()))?;
    let instances = parse_instances(&text)?;

    let store = open_store(config).await?;
    for instance in &instances {
        let stored = if replace {
            store.replace_instance(instance).await
        } else {
            store.register_instance(instance).await
        };
        match stored {
            Ok(()) => {}
            Err(StoreError::InstanceConflict(id)) => {
                store.close().await;
                return Err(format!(
                    "Instance {id} is already stored with different content; \
                     pass --replace to overwrite it"
                )
                .into());
            }
            Err(e) => {
                store.close().await;
                return Err(e.into());
            }
        }
    }
    store.close().await;

    tracing::info!(count = instances.len(), file = %file.display(), "Instances imported");
    println!("Imported {} instance(s) from {}", instances.len(), file.display());
    Ok(())
}

/// One instance per non-blank line. Fails on the first bad line, naming it.
pub fn parse_instances(text: &str) -> Result<Vec<Instance>, String> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str::<Instance>(line)
                .map_err(|e| format!("line {}: invalid instance: {e}", index + 1))
        })
        .collect()
}
