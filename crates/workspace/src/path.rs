//! Path confinement: every tool path must resolve inside the workspace root.
//!
//! Resolution is lexical first (`.` and `..` are folded without touching
//! the filesystem), then the deepest existing ancestor is canonicalized so
//! a symlink cannot lead outside the root.

use std::path::{Component, Path, PathBuf};

/// Error returned when path validation fails.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path is empty")]
    Empty,

    #[error("Path '{path}' escapes the workspace root")]
    Escape { path: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// Resolve `requested` against `root` and return it relative to the root.
///
/// Absolute paths are accepted only when they already point inside the
/// root. The returned path is empty when `requested` names the root itself.
pub fn resolve_in_root(root: &Path, requested: &str) -> Result<PathBuf, PathValidationError> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Err(PathValidationError::Empty);
    }
    let escape = || PathValidationError::Escape {
        path: requested.to_string(),
    };

    let input = PathBuf::from(trimmed.replace('\\', "/"));
    let relative = if input.is_absolute() {
        strip_root(root, &input).ok_or_else(escape)?
    } else {
        input
    };

    let mut clean = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => clean.push(part),
            Component::ParentDir => {
                if !clean.pop() {
                    return Err(escape());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(escape()),
        }
    }

    let canonical_root = root
        .canonicalize()
        .map_err(|e| PathValidationError::CanonicalizeFailed {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;

    // Symlinks: the deepest existing ancestor must still live under the root
    let mut existing = clean.clone();
    while !root.join(&existing).exists() && existing.pop() {}
    let canonical = root
        .join(&existing)
        .canonicalize()
        .map_err(|e| PathValidationError::CanonicalizeFailed {
            path: requested.to_string(),
            reason: e.to_string(),
        })?;
    if !canonical.starts_with(&canonical_root) {
        return Err(escape());
    }

    Ok(clean)
}

fn strip_root(root: &Path, absolute: &Path) -> Option<PathBuf> {
    if let Ok(rest) = absolute.strip_prefix(root) {
        return Some(rest.to_path_buf());
    }
    let canonical_root = root.canonicalize().ok()?;
    absolute
        .strip_prefix(&canonical_root)
        .ok()
        .map(Path::to_path_buf)
}
