//! Tool calls: the closed set of operations an oracle may request.
//!
//! Every tool is a variant of [`ToolCall`] with its own typed argument
//! payload. Adding a tool means adding a variant here and a handler in the
//! dispatcher; the compiler finds every match that needs updating.

use serde::{Deserialize, Serialize};

/// Name of the pseudo-tool an oracle calls to finish the run.
pub const SUBMIT_TOOL: &str = "submit";

/// Tool name recorded for a malformed decision that named no tool.
pub const MALFORMED_TOOL: &str = "malformed";

/// Whether a committed action named `tool_name` can have changed files.
pub fn modifies_files(tool_name: &str) -> bool {
    matches!(tool_name, "edit_file" | "create_file")
}

/// A validated request to execute one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "args", rename_all = "snake_case")]
pub enum ToolCall {
    SearchCode(SearchCodeArgs),
    ListFiles(ListFilesArgs),
    ReadFile(ReadFileArgs),
    ReadFileLines(ReadFileLinesArgs),
    EditFile(EditFileArgs),
    CreateFile(CreateFileArgs),
    GetDiff,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCodeArgs {
    /// Regular expression matched against each line
    pub pattern: String,

    /// File or directory (relative to the root) to restrict the search to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Glob filter on relative file paths, e.g. `**/*.py`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glob: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListFilesArgs {
    #[serde(default = "default_list_pattern")]
    pub pattern: String,
}

fn default_list_pattern() -> String {
    "**/*".into()
}

impl Default for ListFilesArgs {
    fn default() -> Self {
        Self {
            pattern: default_list_pattern(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadFileArgs {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadFileLinesArgs {
    pub path: String,

    /// 1-based, inclusive
    pub start_line: usize,

    /// 1-based, inclusive
    pub end_line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditFileArgs {
    pub path: String,

    #[serde(flatten)]
    pub operation: EditOperation,
}

/// How an existing file is modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EditOperation {
    /// Replace the inclusive line range `start_line..=end_line`.
    Lines {
        start_line: usize,
        end_line: usize,
        new_content: String,
    },

    /// Replace the first occurrence of `old_content`.
    Replace {
        old_content: String,
        new_content: String,
    },

    /// Replace the whole file.
    Overwrite { content: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateFileArgs {
    pub path: String,
    pub content: String,
}

impl ToolCall {
    /// Parse an oracle-proposed `(name, arguments)` pair.
    ///
    /// Returns a human-readable reason on failure; callers feed it back to
    /// the oracle rather than aborting.
    pub fn parse(name: &str, arguments: &serde_json::Value) -> Result<Self, String> {
        let args = if arguments.is_null() {
            serde_json::json!({})
        } else {
            arguments.clone()
        };

        fn typed<T: serde::de::DeserializeOwned>(
            name: &str,
            args: serde_json::Value,
        ) -> Result<T, String> {
            serde_json::from_value(args).map_err(|e| format!("invalid arguments for {name}: {e}"))
        }

        match name {
            "search_code" => {
                let args: SearchCodeArgs = typed(name, args)?;
                if args.pattern.is_empty() {
                    return Err("search_code requires a non-empty pattern".into());
                }
                Ok(Self::SearchCode(args))
            }
            "list_files" => Ok(Self::ListFiles(typed(name, args)?)),
            "read_file" => Ok(Self::ReadFile(typed(name, args)?)),
            "read_file_lines" => Ok(Self::ReadFileLines(typed(name, args)?)),
            "edit_file" => Ok(Self::EditFile(typed(name, args)?)),
            "create_file" => Ok(Self::CreateFile(typed(name, args)?)),
            "get_diff" => Ok(Self::GetDiff),
            other => Err(format!("unknown tool: {other}")),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SearchCode(_) => "search_code",
            Self::ListFiles(_) => "list_files",
            Self::ReadFile(_) => "read_file",
            Self::ReadFileLines(_) => "read_file_lines",
            Self::EditFile(_) => "edit_file",
            Self::CreateFile(_) => "create_file",
            Self::GetDiff => "get_diff",
        }
    }

    /// The argument payload as JSON, as persisted in the action log.
    pub fn arguments(&self) -> serde_json::Value {
        let value = match self {
            Self::SearchCode(a) => serde_json::to_value(a),
            Self::ListFiles(a) => serde_json::to_value(a),
            Self::ReadFile(a) => serde_json::to_value(a),
            Self::ReadFileLines(a) => serde_json::to_value(a),
            Self::EditFile(a) => serde_json::to_value(a),
            Self::CreateFile(a) => serde_json::to_value(a),
            Self::GetDiff => Ok(serde_json::json!({})),
        };
        value.unwrap_or_else(|_| serde_json::json!({}))
    }

    /// The fixed catalog presented to the oracle, in dispatch order,
    /// followed by the `submit` pseudo-tool.
    pub fn catalog() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                "search_code",
                "Search file contents with a regular expression. Returns path:line: text matches ordered by path and line.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "pattern": { "type": "string", "description": "Regular expression to search for" },
                        "path": { "type": "string", "description": "Optional file or directory to restrict the search to" },
                        "glob": { "type": "string", "description": "Optional glob filter on file paths, e.g. **/*.py" }
                    },
                    "required": ["pattern"]
                }),
            ),
            ToolDefinition::new(
                "list_files",
                "List repository files matching a glob pattern (defaults to the whole tree).",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "pattern": { "type": "string", "description": "Glob pattern, e.g. src/**/*.py" }
                    }
                }),
            ),
            ToolDefinition::new(
                "read_file",
                "Read the full contents of a text file.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Path relative to the repository root" }
                    },
                    "required": ["path"]
                }),
            ),
            ToolDefinition::new(
                "read_file_lines",
                "Read an inclusive, 1-based range of lines from a file.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "start_line": { "type": "integer", "minimum": 1 },
                        "end_line": { "type": "integer", "minimum": 1 }
                    },
                    "required": ["path", "start_line", "end_line"]
                }),
            ),
            ToolDefinition::new(
                "edit_file",
                "Edit an existing file. Either replace the first occurrence of old_content with new_content, replace lines start_line..=end_line with new_content, or overwrite the file with content.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "old_content": { "type": "string", "description": "Exact text to replace" },
                        "new_content": { "type": "string", "description": "Replacement text" },
                        "start_line": { "type": "integer", "minimum": 1 },
                        "end_line": { "type": "integer", "minimum": 1 },
                        "content": { "type": "string", "description": "Full new file content" }
                    },
                    "required": ["path"]
                }),
            ),
            ToolDefinition::new(
                "create_file",
                "Create a new file. Fails if the path already exists.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "content": { "type": "string" }
                    },
                    "required": ["path", "content"]
                }),
            ),
            ToolDefinition::new(
                "get_diff",
                "Show the unified diff of all changes made so far.",
                serde_json::json!({ "type": "object", "properties": {} }),
            ),
            ToolDefinition::new(
                SUBMIT_TOOL,
                "Finish the task. The current diff becomes the final patch.",
                serde_json::json!({ "type": "object", "properties": {} }),
            ),
        ]
    }
}

/// A tool definition sent to the oracle so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Structured reason for a failed tool result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorCode {
    NotFound,
    PathEscape,
    NotText,
    TooLarge,
    InvalidRange,
    InvalidPattern,
    AlreadyExists,
    NoMatch,
    PermissionDenied,
    Vcs,
    InvalidArguments,
    MalformedDecision,
}

impl ToolErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::PathEscape => "path_escape",
            Self::NotText => "not_text",
            Self::TooLarge => "too_large",
            Self::InvalidRange => "invalid_range",
            Self::InvalidPattern => "invalid_pattern",
            Self::AlreadyExists => "already_exists",
            Self::NoMatch => "no_match",
            Self::PermissionDenied => "permission_denied",
            Self::Vcs => "vcs",
            Self::InvalidArguments => "invalid_arguments",
            Self::MalformedDecision => "malformed_decision",
        }
    }
}

impl std::str::FromStr for ToolErrorCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("unknown tool error code '{s}'"))
    }
}

/// The uniform result envelope every tool call produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    pub output: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ToolErrorCode>,
}

impl ToolOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            code: None,
        }
    }

    pub fn fail(code: ToolErrorCode, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            code: Some(code),
        }
    }

    /// The text shown to the oracle for this result.
    pub fn observation(&self) -> String {
        if self.success {
            self.output.clone()
        } else {
            format!("Error: {}", self.error.as_deref().unwrap_or("tool failed"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_read_file_lines() {
        let call = ToolCall::parse(
            "read_file_lines",
            &serde_json::json!({"path": "src/app.py", "start_line": 10, "end_line": 20}),
        )
        .unwrap();
        assert_eq!(
            call,
            ToolCall::ReadFileLines(ReadFileLinesArgs {
                path: "src/app.py".into(),
                start_line: 10,
                end_line: 20,
            })
        );
        assert_eq!(call.name(), "read_file_lines");
    }

    #[test]
    fn parse_edit_variants() {
        let replace = ToolCall::parse(
            "edit_file",
            &serde_json::json!({"path": "a.py", "old_content": "x = 1", "new_content": "x = 2"}),
        )
        .unwrap();
        assert!(matches!(
            replace,
            ToolCall::EditFile(EditFileArgs { operation: EditOperation::Replace { .. }, .. })
        ));

        let lines = ToolCall::parse(
            "edit_file",
            &serde_json::json!({"path": "a.py", "start_line": 3, "end_line": 3, "new_content": "y\n"}),
        )
        .unwrap();
        assert!(matches!(
            lines,
            ToolCall::EditFile(EditFileArgs { operation: EditOperation::Lines { .. }, .. })
        ));

        let overwrite =
            ToolCall::parse("edit_file", &serde_json::json!({"path": "a.py", "content": ""}))
                .unwrap();
        assert!(matches!(
            overwrite,
            ToolCall::EditFile(EditFileArgs { operation: EditOperation::Overwrite { .. }, .. })
        ));
    }

    #[test]
    fn parse_rejects_unknown_tool_and_bad_args() {
        assert!(ToolCall::parse("run_shell", &serde_json::json!({})).is_err());
        assert!(ToolCall::parse("read_file", &serde_json::json!({})).is_err());
        assert!(
            ToolCall::parse("read_file_lines", &serde_json::json!({"path": "a", "start_line": -1, "end_line": 2}))
                .is_err()
        );
        assert!(ToolCall::parse("search_code", &serde_json::json!({"pattern": ""})).is_err());
    }

    #[test]
    fn get_diff_accepts_missing_arguments() {
        assert_eq!(
            ToolCall::parse("get_diff", &serde_json::Value::Null).unwrap(),
            ToolCall::GetDiff
        );
        assert_eq!(
            ToolCall::parse("list_files", &serde_json::Value::Null).unwrap(),
            ToolCall::ListFiles(ListFilesArgs::default())
        );
    }

    #[test]
    fn arguments_round_trip_through_parse() {
        let call = ToolCall::EditFile(EditFileArgs {
            path: "pkg/mod.py".into(),
            operation: EditOperation::Replace {
                old_content: "a".into(),
                new_content: "b".into(),
            },
        });
        let reparsed = ToolCall::parse(call.name(), &call.arguments()).unwrap();
        assert_eq!(reparsed, call);
    }

    #[test]
    fn catalog_order_is_fixed() {
        let names: Vec<_> = ToolCall::catalog().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                "search_code",
                "list_files",
                "read_file",
                "read_file_lines",
                "edit_file",
                "create_file",
                "get_diff",
                "submit"
            ]
        );
    }

    #[test]
    fn only_edit_and_create_modify_files() {
        let modifying: Vec<_> = ToolCall::catalog()
            .into_iter()
            .map(|d| d.name)
            .filter(|name| modifies_files(name))
            .collect();
        assert_eq!(modifying, vec!["edit_file", "create_file"]);
    }

    #[test]
    fn failed_outcome_observation() {
        let outcome = ToolOutcome::fail(ToolErrorCode::NotFound, "file not found: a.py");
        assert!(!outcome.success);
        assert_eq!(outcome.observation(), "Error: file not found: a.py");
        assert_eq!("not_found".parse::<ToolErrorCode>().unwrap(), ToolErrorCode::NotFound);
    }
}
