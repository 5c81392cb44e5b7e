//! `create_file`: materialize a new file; never overwrites.

use patchwright_core::tool::{CreateFileArgs, ToolErrorCode, ToolOutcome};
use patchwright_core::workspace::Workspace;

use crate::dispatcher::{Failure, confine};

pub(crate) async fn run(ws: &dyn Workspace, args: &CreateFileArgs) -> Result<ToolOutcome, Failure> {
    let path = confine(ws, &args.path)?;
    if path.as_os_str().is_empty() {
        return Err(Failure::new(
            ToolErrorCode::InvalidArguments,
            format!("path names the workspace root: {}", args.path),
        ));
    }
    ws.create(&path, &args.content).await?;
    Ok(ToolOutcome::ok(format!("Successfully created {}", args.path)))
}

#[cfg(test)]
mod tests {
    use crate::test_support::fixture;
    use patchwright_core::tool::{CreateFileArgs, ToolCall, ToolErrorCode};

    fn create(path: &str, content: &str) -> ToolCall {
        ToolCall::CreateFile(CreateFileArgs {
            path: path.into(),
            content: content.into(),
        })
    }

    #[tokio::test]
    async fn creates_file_and_parents() {
        let (dir, dispatcher) = fixture().await;
        let outcome = dispatcher
            .dispatch(&create("tests/unit/test_add.py", "def test_add():\n    pass\n"))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("tests/unit/test_add.py")).unwrap(),
            "def test_add():\n    pass\n"
        );
    }

    #[tokio::test]
    async fn existing_file_left_byte_for_byte() {
        let (dir, dispatcher) = fixture().await;
        let before = std::fs::read(dir.path().join("pkg/core.py")).unwrap();
        let outcome = dispatcher.dispatch(&create("pkg/core.py", "")).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.code, Some(ToolErrorCode::AlreadyExists));
        assert_eq!(std::fs::read(dir.path().join("pkg/core.py")).unwrap(), before);
    }

    #[tokio::test]
    async fn workspace_root_is_not_a_file_path() {
        let (_dir, dispatcher) = fixture().await;
        for path in [".", "pkg/.."] {
            let outcome = dispatcher.dispatch(&create(path, "x")).await.unwrap();
            assert_eq!(outcome.code, Some(ToolErrorCode::InvalidArguments), "{path}");
            assert!(outcome.error.as_deref().unwrap().contains("workspace root"));
        }
    }

    #[tokio::test]
    async fn escape_rejected_before_touching_disk() {
        let (dir, dispatcher) = fixture().await;
        let outcome = dispatcher.dispatch(&create("../evil.py", "x")).await.unwrap();
        assert_eq!(outcome.code, Some(ToolErrorCode::PathEscape));
        assert!(!dir.path().parent().unwrap().join("evil.py").exists());
    }
}
