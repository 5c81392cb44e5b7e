//! `search_code`: regex search across the tree.

use globset::Glob;
use patchwright_core::error::WorkspaceError;
use patchwright_core::tool::{SearchCodeArgs, ToolErrorCode, ToolOutcome};
use patchwright_core::workspace::Workspace;
use regex::Regex;
use std::path::PathBuf;

use crate::ToolLimits;
use crate::dispatcher::{Failure, confine};

/// Matched lines longer than this are clipped in the output.
const MAX_LINE_CHARS: usize = 200;

pub(crate) async fn run(
    ws: &dyn Workspace,
    limits: &ToolLimits,
    args: &SearchCodeArgs,
) -> Result<ToolOutcome, Failure> {
    let regex = Regex::new(&args.pattern).map_err(|e| {
        Failure::new(ToolErrorCode::InvalidPattern, format!("invalid pattern: {e}"))
    })?;
    let glob = match &args.glob {
        Some(g) => Some(
            Glob::new(g)
                .map_err(|e| Failure::new(ToolErrorCode::InvalidPattern, format!("invalid glob: {e}")))?
                .compile_matcher(),
        ),
        None => None,
    };
    let scope = match &args.path {
        Some(p) => confine(ws, p)?,
        None => PathBuf::new(),
    };

    let candidates: Vec<PathBuf> = ws
        .list()
        .await?
        .into_iter()
        .filter(|p| p.starts_with(&scope))
        .collect();
    if candidates.is_empty()
        && let Some(p) = &args.path
    {
        return Err(Failure::new(
            ToolErrorCode::NotFound,
            format!("path not found: {p}"),
        ));
    }

    let mut lines = Vec::new();
    let mut truncated = false;

    'files: for path in candidates {
        if let Some(matcher) = &glob
            && !matcher.is_match(&path)
        {
            continue;
        }

        let bytes = match ws.read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_infrastructure() => return Err(e.into()),
            // Vanished or unreadable files are skipped
            Err(WorkspaceError::NotFound { .. } | WorkspaceError::PermissionDenied { .. }) => continue,
            Err(e) => return Err(e.into()),
        };
        if bytes.len() > limits.max_file_bytes || bytes.contains(&0) {
            continue;
        }
        let Ok(text) = String::from_utf8(bytes) else {
            continue;
        };

        let display = path.to_string_lossy().replace('\\', "/");
        let mut in_file = 0;
        for (idx, line) in text.lines().enumerate() {
            if !regex.is_match(line) {
                continue;
            }
            if lines.len() >= limits.max_search_results {
                truncated = true;
                break 'files;
            }
            if in_file >= limits.max_matches_per_file {
                truncated = true;
                break;
            }
            lines.push(format!("{display}:{}: {}", idx + 1, clip(line.trim_end())));
            in_file += 1;
        }
    }

    if lines.is_empty() {
        return Ok(ToolOutcome::ok("No matches found"));
    }
    let mut output = lines.join("\n");
    if truncated {
        output.push_str(&format!(
            "\n[results truncated: at most {} matches, {} per file; narrow the pattern, path or glob]",
            limits.max_search_results, limits.max_matches_per_file
        ));
    }
    Ok(ToolOutcome::ok(output))
}

fn clip(line: &str) -> String {
    if line.chars().count() <= MAX_LINE_CHARS {
        return line.to_string();
    }
    let mut clipped: String = line.chars().take(MAX_LINE_CHARS).collect();
    clipped.push_str("...");
    clipped
}
