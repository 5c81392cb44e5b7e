//! Plain-text decision format.
//!
//! Oracles without native function calling answer in prose containing
//!
//! ```text
//! TOOL: read_file_lines
//! ARGS: {"path": "src/app.py", "start_line": 10, "end_line": 20}
//! ```
//!
//! or a bare `COMPLETE` once they are done. A tool call wins over a
//! completion phrase appearing in the same reply.
//!
//! `COMPLETE` counts anywhere as a whole word. `done` only counts when it is
//! the entire reply, so prose like "not done yet" stays malformed.

use patchwright_core::oracle::Decision;

const TOOL_MARKER: &str = "TOOL:";
const ARGS_MARKER: &str = "ARGS:";

/// Whole-word signals, compared case-insensitively.
const COMPLETION_WORDS: &[&str] = &["complete"];

/// Signals only when they make up the whole reply, ignoring punctuation.
const BARE_COMPLETION_WORDS: &[&str] = &["done"];

/// Phrases, compared case-insensitively.
const COMPLETION_PHRASES: &[&str] = &[
    "i have completed",
    "fix is complete",
    "implementation is complete",
];

/// Interpret a free-text oracle reply.
pub fn parse_text_decision(text: &str) -> Decision {
    if let Some(name) = tool_name(text) {
        return match tool_arguments(text) {
            Ok(args) => Decision::from_parts(&name, &args),
            Err(reason) => Decision::Malformed {
                tool: Some(name),
                raw: text.to_string(),
                reason,
            },
        };
    }

    if signals_completion(text) {
        return Decision::Submit;
    }

    Decision::Malformed {
        tool: None,
        raw: text.to_string(),
        reason: "no tool call found; reply with TOOL: <name> and ARGS: <json object>, \
                 or COMPLETE when the fix is done"
            .into(),
    }
}

/// The identifier following the first `TOOL:` marker.
fn tool_name(text: &str) -> Option<String> {
    let start = text.find(TOOL_MARKER)? + TOOL_MARKER.len();
    let name: String = text[start..]
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    (!name.is_empty()).then_some(name)
}

/// The JSON object following `ARGS:`. A missing marker means no arguments.
fn tool_arguments(text: &str) -> Result<serde_json::Value, String> {
    let Some(pos) = text.find(ARGS_MARKER) else {
        return Ok(serde_json::json!({}));
    };
    let rest = text[pos + ARGS_MARKER.len()..].trim_start();
    if !rest.starts_with('{') {
        return Err("ARGS must be followed by a JSON object".into());
    }

    // Stream a single value so trailing prose after the object is ignored.
    let mut values = serde_json::Deserializer::from_str(rest).into_iter::<serde_json::Value>();
    match values.next() {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(format!("invalid JSON arguments: {e}")),
        None => Err("ARGS is empty".into()),
    }
}

fn signals_completion(text: &str) -> bool {
    let bare = text.trim_matches(|c: char| !c.is_alphanumeric());
    if BARE_COMPLETION_WORDS.iter().any(|w| bare.eq_ignore_ascii_case(w)) {
        return true;
    }

    let words = text
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty());
    for word in words {
        if COMPLETION_WORDS.iter().any(|w| word.eq_ignore_ascii_case(w)) {
            return true;
        }
    }

    let lower = text.to_lowercase();
    COMPLETION_PHRASES.iter().any(|p| lower.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchwright_core::tool::{EditOperation, ToolCall};

    #[test]
    fn tool_with_nested_json_arguments() {
        let reply = r#"The subtraction is wrong.
TOOL: edit_file
ARGS: {"path": "pkg/core.py", "old_content": "return a - b", "new_content": "return {'sum': a + b}"}
That should fix it."#;
        match parse_text_decision(reply) {
            Decision::Invoke(ToolCall::EditFile(args)) => {
                assert_eq!(args.path, "pkg/core.py");
                assert!(matches!(args.operation, EditOperation::Replace { .. }));
            }
            other => panic!("Expected edit_file, got: {other:?}"),
        }
    }

    #[test]
    fn tool_without_args_marker() {
        assert_eq!(
            parse_text_decision("Let me look.\nTOOL: get_diff"),
            Decision::Invoke(ToolCall::GetDiff)
        );
    }

    #[test]
    fn completion_word_submits() {
        assert!(parse_text_decision("COMPLETE").is_submit());
        assert!(parse_text_decision("Done.").is_submit());
        assert!(parse_text_decision("I believe the fix is complete now").is_submit());
    }

    #[test]
    fn done_inside_prose_is_not_a_submit() {
        for reply in ["not done yet", "All done.", "Once this is done I will edit add()"] {
            let decision = parse_text_decision(reply);
            assert!(matches!(decision, Decision::Malformed { tool: None, .. }), "{reply}");
        }
    }

    #[test]
    fn completion_needs_whole_word() {
        let decision = parse_text_decision("Let me think about incomplete handling.");
        assert!(matches!(decision, Decision::Malformed { tool: None, .. }));
    }

    #[test]
    fn tool_call_wins_over_completion_phrase() {
        let decision = parse_text_decision("The fix is complete.\nTOOL: get_diff");
        assert_eq!(decision, Decision::Invoke(ToolCall::GetDiff));
    }

    #[test]
    fn broken_json_is_malformed() {
        match parse_text_decision("TOOL: read_file\nARGS: {\"path\": ") {
            Decision::Malformed { tool, reason, .. } => {
                assert_eq!(tool.as_deref(), Some("read_file"));
                assert!(reason.contains("invalid JSON"));
            }
            other => panic!("Expected Malformed, got: {other:?}"),
        }
    }

    #[test]
    fn unknown_tool_is_malformed() {
        match parse_text_decision("TOOL: run_tests\nARGS: {}") {
            Decision::Malformed { reason, .. } => assert!(reason.contains("unknown tool")),
            other => panic!("Expected Malformed, got: {other:?}"),
        }
    }

    #[test]
    fn text_submit_tool_is_submit() {
        assert!(parse_text_decision("TOOL: submit").is_submit());
    }
}
