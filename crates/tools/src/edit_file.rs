//! `edit_file`: modify an existing text file in place.

use patchwright_core::tool::{EditFileArgs, EditOperation, ToolErrorCode, ToolOutcome};
use patchwright_core::workspace::Workspace;

use crate::dispatcher::{Failure, confine, decode_text};
use crate::read_file::check_range;

pub(crate) async fn run(ws: &dyn Workspace, args: &EditFileArgs) -> Result<ToolOutcome, Failure> {
    let path = confine(ws, &args.path)?;
    let current = decode_text(&args.path, ws.read(&path).await?)?;

    let updated = match &args.operation {
        EditOperation::Replace {
            old_content,
            new_content,
        } => replace_first(&args.path, &current, old_content, new_content)?,
        EditOperation::Lines {
            start_line,
            end_line,
            new_content,
        } => replace_lines(&args.path, &current, *start_line, *end_line, new_content)?,
        EditOperation::Overwrite { content } => content.clone(),
    };

    ws.write(&path, &updated).await?;
    Ok(ToolOutcome::ok(format!("Successfully edited {}", args.path)))
}

fn replace_first(path: &str, current: &str, old: &str, new: &str) -> Result<String, Failure> {
    if old.is_empty() {
        return Err(Failure::new(
            ToolErrorCode::InvalidArguments,
            "old_content must not be empty",
        ));
    }
    if !current.contains(old) {
        return Err(Failure::new(
            ToolErrorCode::NoMatch,
            format!("old_content not found in {path}"),
        ));
    }
    Ok(current.replacen(old, new, 1))
}

/// Replace lines `start..=end`. If the last replaced line was terminated,
/// the replacement is too, so the file keeps its trailing-newline state.
fn replace_lines(
    path: &str,
    current: &str,
    start_line: usize,
    end_line: usize,
    new_content: &str,
) -> Result<String, Failure> {
    let lines: Vec<&str> = current.split_inclusive('\n').collect();
    let (start, end) = check_range(path, start_line, end_line, lines.len())?;

    let mut replacement = new_content.to_string();
    let terminated = lines[end - 1].ends_with('\n');
    if terminated && !replacement.is_empty() && !replacement.ends_with('\n') {
        replacement.push('\n');
    }

    let mut out = String::with_capacity(current.len() + replacement.len());
    out.push_str(&lines[..start].concat());
    out.push_str(&replacement);
    out.push_str(&lines[end..].concat());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixture;
    use patchwright_core::tool::ToolCall;

    fn edit(path: &str, operation: EditOperation) -> ToolCall {
        ToolCall::EditFile(EditFileArgs {
            path: path.into(),
            operation,
        })
    }

    #[test]
    fn line_replacement_keeps_terminators() {
        let text = "a\nb\nc\n";
        assert_eq!(replace_lines("f", text, 2, 2, "B").unwrap(), "a\nB\nc\n");
        assert_eq!(replace_lines("f", text, 3, 3, "C").unwrap(), "a\nb\nC\n");
        assert_eq!(replace_lines("f", text, 1, 2, "").unwrap(), "c\n");
        assert_eq!(replace_lines("f", "a\nb", 2, 2, "z").unwrap(), "a\nz");
    }

    #[test]
    fn replace_only_first_occurrence() {
        let out = replace_first("f", "x = 1\nx = 1\n", "x = 1", "x = 2").unwrap();
        assert_eq!(out, "x = 2\nx = 1\n");
    }

    #[tokio::test]
    async fn replace_edits_file_on_disk() {
        let (dir, dispatcher) = fixture().await;
        let outcome = dispatcher
            .dispatch(&edit(
                "pkg/core.py",
                EditOperation::Replace {
                    old_content: "def add(a, b):\n    return a - b".into(),
                    new_content: "def add(a, b):\n    return a + b".into(),
                },
            ))
            .await
            .unwrap();
        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(outcome.output, "Successfully edited pkg/core.py");

        let on_disk = std::fs::read_to_string(dir.path().join("pkg/core.py")).unwrap();
        assert!(on_disk.contains("return a + b"));
        assert!(on_disk.ends_with("def sub(a, b):\n    return a - b\n"));
    }

    #[tokio::test]
    async fn range_edit_uses_slice_bounds() {
        let (dir, dispatcher) = fixture().await;
        let outcome = dispatcher
            .dispatch(&edit(
                "pkg/core.py",
                EditOperation::Lines {
                    start_line: 4,
                    end_line: 4,
                    new_content: "    return a + b".into(),
                },
            ))
            .await
            .unwrap();
        assert!(outcome.success);
        let on_disk = std::fs::read_to_string(dir.path().join("pkg/core.py")).unwrap();
        assert_eq!(on_disk.lines().nth(3), Some("    return a + b"));
        assert!(on_disk.ends_with('\n'));

        let bad = dispatcher
            .dispatch(&edit(
                "pkg/core.py",
                EditOperation::Lines {
                    start_line: 9,
                    end_line: 12,
                    new_content: "x".into(),
                },
            ))
            .await
            .unwrap();
        assert_eq!(bad.code, Some(ToolErrorCode::InvalidRange));
    }

    #[tokio::test]
    async fn missing_target_and_missing_text() {
        let (_dir, dispatcher) = fixture().await;
        let missing = dispatcher
            .dispatch(&edit(
                "pkg/nope.py",
                EditOperation::Overwrite {
                    content: "x".into(),
                },
            ))
            .await
            .unwrap();
        assert_eq!(missing.code, Some(ToolErrorCode::NotFound));

        let no_match = dispatcher
            .dispatch(&edit(
                "README.md",
                EditOperation::Replace {
                    old_content: "not there".into(),
                    new_content: "x".into(),
                },
            ))
            .await
            .unwrap();
        assert_eq!(no_match.code, Some(ToolErrorCode::NoMatch));
    }

    #[tokio::test]
    async fn binary_target_rejected() {
        let (dir, dispatcher) = fixture().await;
        let outcome = dispatcher
            .dispatch(&edit(
                "logo.png",
                EditOperation::Overwrite {
                    content: "text".into(),
                },
            ))
            .await
            .unwrap();
        assert_eq!(outcome.code, Some(ToolErrorCode::NotText));
        assert_eq!(
            std::fs::read(dir.path().join("logo.png")).unwrap(),
            vec![0x89, b'P', b'N', b'G', 0, 0, 1]
        );
    }
}
