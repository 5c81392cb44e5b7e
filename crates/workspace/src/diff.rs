//! Unified diff rendering for the snapshot backend.

use serde::{Deserialize, Serialize};
use similar::TextDiff;

/// How a workspace computes `diff()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffMode {
    /// `git diff` against `HEAD` of the checkout
    #[default]
    Git,
    /// Compare against an in-memory copy taken when the workspace opened
    Snapshot,
}

impl std::str::FromStr for DiffMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "git" => Ok(Self::Git),
            "snapshot" => Ok(Self::Snapshot),
            other => Err(format!("unknown diff mode '{other}' (expected git or snapshot)")),
        }
    }
}

/// Render one file's change in `git diff` format.
///
/// `before == None` is a new file. Returns an empty string when the two
/// sides are identical.
pub fn unified_diff(path: &str, before: Option<&str>, after: Option<&str>) -> String {
    if before == after {
        return String::new();
    }

    let old_label = before.map_or_else(|| "/dev/null".to_string(), |_| format!("a/{path}"));
    let new_label = after.map_or_else(|| "/dev/null".to_string(), |_| format!("b/{path}"));

    let old_text = before.unwrap_or("");
    let new_text = after.unwrap_or("");
    let body = TextDiff::from_lines(old_text, new_text)
        .unified_diff()
        .context_radius(3)
        .header(&old_label, &new_label)
        .to_string();

    let mut out = format!("diff --git a/{path} b/{path}\n");
    match (before, after) {
        (None, Some(_)) => out.push_str("new file mode 100644\n"),
        (Some(_), None) => out.push_str("deleted file mode 100644\n"),
        _ => {}
    }
    out.push_str(&body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_content_has_no_diff() {
        assert_eq!(unified_diff("a.py", Some("x\n"), Some("x\n")), "");
    }

    #[test]
    fn modified_file_has_git_headers_and_one_hunk() {
        let diff = unified_diff("pkg/a.py", Some("one\ntwo\nthree\n"), Some("one\n2\nthree\n"));
        assert!(diff.starts_with("diff --git a/pkg/a.py b/pkg/a.py\n"));
        assert!(diff.contains("--- a/pkg/a.py\n"));
        assert!(diff.contains("+++ b/pkg/a.py\n"));
        assert!(diff.contains("-two\n"));
        assert!(diff.contains("+2\n"));
        assert_eq!(diff.matches("@@ ").count(), 1);
    }

    #[test]
    fn new_file_diffs_against_dev_null() {
        let diff = unified_diff("new.py", None, Some("print('hi')\n"));
        assert!(diff.contains("new file mode 100644"));
        assert!(diff.contains("--- /dev/null\n"));
        assert!(diff.contains("+++ b/new.py\n"));
        assert!(diff.contains("+print('hi')"));
    }

    #[test]
    fn diff_mode_parses_case_insensitively() {
        assert_eq!("Snapshot".parse::<DiffMode>().unwrap(), DiffMode::Snapshot);
        assert_eq!("git".parse::<DiffMode>().unwrap(), DiffMode::Git);
        assert!("svn".parse::<DiffMode>().is_err());
    }
}
