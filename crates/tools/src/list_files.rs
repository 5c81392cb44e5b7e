//! `list_files`: glob listing of the workspace tree.

use globset::Glob;
use patchwright_core::tool::{ListFilesArgs, ToolErrorCode, ToolOutcome};
use patchwright_core::workspace::Workspace;

use crate::ToolLimits;
use crate::dispatcher::Failure;

pub(crate) async fn run(
    ws: &dyn Workspace,
    limits: &ToolLimits,
    args: &ListFilesArgs,
) -> Result<ToolOutcome, Failure> {
    let pattern = if args.pattern.trim().is_empty() {
        "**/*"
    } else {
        args.pattern.trim()
    };
    let matcher = Glob::new(pattern)
        .map_err(|e| Failure::new(ToolErrorCode::InvalidPattern, format!("invalid pattern: {e}")))?
        .compile_matcher();

    let matched: Vec<String> = ws
        .list()
        .await?
        .into_iter()
        .filter(|p| matcher.is_match(p))
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .collect();

    if matched.is_empty() {
        return Ok(ToolOutcome::ok(format!("No files match {pattern}")));
    }

    let total = matched.len();
    let mut output = matched
        .into_iter()
        .take(limits.max_list_entries)
        .collect::<Vec<_>>()
        .join("\n");
    if total > limits.max_list_entries {
        output.push_str(&format!(
            "\n[showing {} of {total} files; use a narrower pattern]",
            limits.max_list_entries
        ));
    }
    Ok(ToolOutcome::ok(output))
}

#[cfg(test)]
mod tests {
    use crate::ToolLimits;
    use crate::test_support::{fixture, fixture_with};
    use patchwright_core::tool::{ListFilesArgs, ToolCall, ToolErrorCode};

    fn list(pattern: &str) -> ToolCall {
        ToolCall::ListFiles(ListFilesArgs {
            pattern: pattern.into(),
        })
    }

    #[tokio::test]
    async fn default_pattern_lists_whole_tree_sorted() {
        let (_dir, dispatcher) = fixture().await;
        let outcome = dispatcher
            .dispatch(&ToolCall::ListFiles(ListFilesArgs::default()))
            .await
            .unwrap();
        assert_eq!(
            outcome.output,
            "README.md\nlogo.png\npkg/__init__.py\npkg/core.py"
        );
    }

    #[tokio::test]
    async fn pattern_filters_paths() {
        let (_dir, dispatcher) = fixture().await;
        let outcome = dispatcher.dispatch(&list("pkg/*.py")).await.unwrap();
        assert_eq!(outcome.output, "pkg/__init__.py\npkg/core.py");

        let none = dispatcher.dispatch(&list("**/*.rs")).await.unwrap();
        assert!(none.success);
        assert!(none.output.starts_with("No files match"));
    }

    #[tokio::test]
    async fn invalid_pattern_is_reported() {
        let (_dir, dispatcher) = fixture().await;
        let outcome = dispatcher.dispatch(&list("pkg/[")).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.code, Some(ToolErrorCode::InvalidPattern));
    }

    #[tokio::test]
    async fn listing_is_capped() {
        let limits = ToolLimits {
            max_list_entries: 2,
            ..ToolLimits::default()
        };
        let (_dir, dispatcher) = fixture_with(limits).await;
        let outcome = dispatcher.dispatch(&list("**/*")).await.unwrap();
        let mut lines = outcome.output.lines();
        assert_eq!(lines.next(), Some("README.md"));
        assert_eq!(lines.next(), Some("logo.png"));
        assert_eq!(lines.next(), Some("[showing 2 of 4 files; use a narrower pattern]"));
    }
}
