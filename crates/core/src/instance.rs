//! The bug-fix task an agent run works on.

use serde::{Deserialize, Serialize};

/// One bug-fix task. Created once at load time and never mutated.
///
/// Field aliases accept the upper-case SWE-bench column names so dataset
/// rows can be deserialized directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Unique task identifier (e.g. `astropy__astropy-12907`)
    pub instance_id: String,

    /// Source repository reference (`owner/name`)
    pub repo: String,

    /// Revision the workspace is checked out at
    pub base_commit: String,

    /// The issue text handed to the oracle
    pub problem_statement: String,

    /// Optional maintainer hints
    #[serde(default, alias = "hints_text", skip_serializing_if = "Option::is_none")]
    pub hints: Option<String>,

    /// Held-out test patch, never shown to the oracle
    #[serde(default)]
    pub test_patch: String,

    /// Dataset version the task was loaded from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Tests that must flip from failing to passing
    #[serde(default, alias = "FAIL_TO_PASS", deserialize_with = "string_list")]
    pub fail_to_pass: Vec<String>,

    /// Tests that must keep passing
    #[serde(default, alias = "PASS_TO_PASS", deserialize_with = "string_list")]
    pub pass_to_pass: Vec<String>,
}

impl Instance {
    /// Build an instance with only the fields the agent loop needs.
    pub fn new(
        instance_id: impl Into<String>,
        repo: impl Into<String>,
        base_commit: impl Into<String>,
        problem_statement: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            repo: repo.into(),
            base_commit: base_commit.into(),
            problem_statement: problem_statement.into(),
            hints: None,
            test_patch: String::new(),
            version: None,
            fail_to_pass: Vec::new(),
            pass_to_pass: Vec::new(),
        }
    }

    /// Directory-safe form of the identifier, used for checkout paths.
    pub fn slug(&self) -> String {
        self.instance_id.replace(['/', '\\'], "_")
    }
}

/// SWE-bench ships the test lists either as JSON arrays or as strings
/// containing a JSON array.
fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Encoded(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::List(list) => Ok(list),
        Raw::Encoded(s) if s.trim().is_empty() => Ok(Vec::new()),
        Raw::Encoded(s) => serde_json::from_str(&s).map_err(serde::de::Error::custom),
    }
}
