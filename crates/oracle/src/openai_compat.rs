//! OpenAI-compatible decision oracle.
//!
//! Works with OpenAI, OpenRouter, vLLM, Ollama, and any endpoint exposing
//! `/chat/completions`. The tool catalog is sent as native function
//! definitions; replies without a function call fall back to the
//! plain-text format in [`crate::text`].

use std::time::Duration;

use async_trait::async_trait;
use patchwright_core::error::OracleError;
use patchwright_core::oracle::{Decision, DecisionContext, DecisionOracle};
use patchwright_core::tool::ToolDefinition;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::prompt::{PromptMessage, build_messages};
use crate::text::parse_text_decision;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// A decision oracle backed by an OpenAI-compatible chat model.
pub struct OpenAiCompatOracle {
    /// Recorded on every run this oracle drives
    id: String,
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompatOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatOracle")
            .field("id", &self.id)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl OpenAiCompatOracle {
    /// Create an oracle for `model` at `base_url`. The oracle id defaults
    /// to the model name.
    pub fn new(
        model: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Network(format!("failed to create HTTP client: {e}")))?;

        let model = model.into();
        Ok(Self {
            id: model.clone(),
            model,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// OpenAI's hosted API (convenience constructor).
    pub fn openai(model: impl Into<String>, api_key: impl Into<String>) -> Result<Self, OracleError> {
        Self::new(model, "https://api.openai.com/v1", api_key, DEFAULT_TIMEOUT)
    }

    /// Override the identifier recorded on runs, e.g. to distinguish two
    /// temperature settings of the same model.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn to_api_messages(messages: &[PromptMessage]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().into(),
                content: Some(m.content.clone()),
                tool_calls: None,
            })
            .collect()
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn request_body(&self, context: &DecisionContext) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(&build_messages(context)),
            "temperature": context.temperature,
            "max_tokens": context.max_output_tokens,
            "stream": false,
        });

        if !context.catalog.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&context.catalog));
        }

        body
    }
}

/// Turn a parsed completion into a decision. Only the first function call
/// is honoured; the loop executes one tool per step.
fn decision_from_response(response: ApiResponse) -> Result<Decision, OracleError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| OracleError::InvalidResponse("No choices in response".into()))?;

    let mut tool_calls = choice.message.tool_calls.unwrap_or_default();
    if !tool_calls.is_empty() {
        if tool_calls.len() > 1 {
            debug!(
                ignored = tool_calls.len() - 1,
                "Oracle proposed several tool calls; taking the first"
            );
        }
        let call = tool_calls.swap_remove(0);
        let raw = call.function.arguments;
        let arguments = if raw.trim().is_empty() {
            Ok(serde_json::json!({}))
        } else {
            serde_json::from_str::<serde_json::Value>(&raw)
        };
        return Ok(match arguments {
            Ok(args) => Decision::from_parts(&call.function.name, &args),
            Err(e) => Decision::Malformed {
                tool: Some(call.function.name),
                raw,
                reason: format!("function arguments are not valid JSON: {e}"),
            },
        });
    }

    let content = choice.message.content.unwrap_or_default();
    if content.trim().is_empty() {
        return Ok(Decision::Malformed {
            tool: None,
            raw: content,
            reason: "empty reply; call one of the available tools".into(),
        });
    }
    Ok(parse_text_decision(&content))
}

#[async_trait]
impl DecisionOracle for OpenAiCompatOracle {
    fn id(&self) -> &str {
        &self.id
    }

    async fn decide(&self, context: &DecisionContext) -> std::result::Result<Decision, OracleError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(context);

        debug!(
            oracle = %self.id,
            model = %self.model,
            step = context.step,
            history = context.history.len(),
            "Sending decision request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout(e.to_string())
                } else {
                    OracleError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(OracleError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(OracleError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Oracle endpoint returned error");
            return Err(OracleError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        if let Some(usage) = &api_response.usage {
            debug!(
                model = %api_response.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Decision received"
            );
        }

        decision_from_response(api_response)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
