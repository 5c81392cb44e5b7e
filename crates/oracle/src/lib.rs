//! Decision oracle implementations for patchwright.
//!
//! - [`OpenAiCompatOracle`]: any OpenAI-compatible `/chat/completions`
//!   endpoint (OpenAI, OpenRouter, vLLM, Ollama, ...). Native function
//!   calls are preferred; a plain-text `TOOL:` / `ARGS:` reply is accepted
//!   as a fallback.
//! - [`ScriptedOracle`]: a fixed sequence of decisions, for tests and for
//!   deterministic replays of stored runs.

pub mod openai_compat;
pub mod prompt;
pub mod scripted;
pub mod text;

pub use openai_compat::OpenAiCompatOracle;
pub use scripted::ScriptedOracle;
