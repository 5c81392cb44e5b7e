//! Configuration loading, validation, and management for patchwright.
//!
//! Loads configuration from `~/.patchwright/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use patchwright_core::agent::SolveConfig;
use patchwright_tools::ToolLimits;
use patchwright_workspace::DiffMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.patchwright/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Decision oracle (model endpoint) settings
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Step loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Trajectory database
    #[serde(default)]
    pub store: StoreConfig,

    /// Repository checkouts
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Output caps for the tool catalog
    #[serde(default)]
    pub tools: ToolLimits,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Model name; also the oracle identifier recorded on runs
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4o".into()
}
fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_output_tokens() -> u32 {
    4096
}
fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_url: default_api_url(),
            api_key: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for OracleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleConfig")
            .field("model", &self.model)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Extra oracle attempts per step on transport failure
    #[serde(default = "default_oracle_retries")]
    pub oracle_retries: u32,

    #[serde(default = "default_max_observation_chars")]
    pub max_observation_chars: usize,
}

fn default_max_steps() -> u32 {
    30
}
fn default_oracle_retries() -> u32 {
    1
}
fn default_max_observation_chars() -> usize {
    2000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            oracle_retries: default_oracle_retries(),
            max_observation_chars: default_max_observation_chars(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file; defaults to `~/.patchwright/patchwright.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Where checkouts live, one directory per instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repos_dir: Option<PathBuf>,

    #[serde(default)]
    pub diff_mode: DiffMode,

    /// Serve unmodified file reads through the store's file cache
    #[serde(default = "default_true")]
    pub cache: bool,
}

fn default_true() -> bool {
    true
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            repos_dir: None,
            diff_mode: DiffMode::default(),
            cache: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.patchwright/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_at(&Self::config_dir().join("config.toml"))
    }

    /// Load configuration from `path`, then apply environment overrides:
    /// - `PATCHWRIGHT_MODEL`
    /// - `PATCHWRIGHT_API_KEY` (falls back to `OPENAI_API_KEY`)
    /// - `PATCHWRIGHT_API_URL`
    /// - `PATCHWRIGHT_DB`
    pub fn load_at(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without environment
    /// overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(model) = non_empty("PATCHWRIGHT_MODEL") {
            self.oracle.model = model;
        }
        if let Some(key) = non_empty("PATCHWRIGHT_API_KEY") {
            self.oracle.api_key = Some(key);
        } else if self.oracle.api_key.is_none() {
            self.oracle.api_key = non_empty("OPENAI_API_KEY");
        }
        if let Some(url) = non_empty("PATCHWRIGHT_API_URL") {
            self.oracle.api_url = url;
        }
        if let Some(db) = non_empty("PATCHWRIGHT_DB") {
            self.store.path = Some(PathBuf::from(db));
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".patchwright")
    }

    pub fn database_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("patchwright.db"))
    }

    pub fn repos_dir(&self) -> PathBuf {
        self.workspace
            .repos_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("repos"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_steps must be greater than 0".into(),
            ));
        }

        if !(0.0..=2.0).contains(&self.oracle.temperature) {
            return Err(ConfigError::ValidationError(
                "oracle.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.oracle.max_output_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "oracle.max_output_tokens must be greater than 0".into(),
            ));
        }

        if self.oracle.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("oracle.model must not be empty".into()));
        }

        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.oracle.api_key.is_some()
    }

    /// The immutable per-solve configuration.
    pub fn solve_config(&self) -> SolveConfig {
        SolveConfig {
            oracle_id: self.oracle.model.clone(),
            max_steps: self.agent.max_steps,
            temperature: self.oracle.temperature,
            max_output_tokens: self.oracle.max_output_tokens,
            oracle_retries: self.agent.oracle_retries,
            max_observation_chars: self.agent.max_observation_chars,
        }
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// The effective configuration as TOML, with secrets masked.
    pub fn redacted_toml(&self) -> String {
        let mut shown = self.clone();
        if shown.oracle.api_key.is_some() {
            shown.oracle.api_key = Some("[REDACTED]".into());
        }
        toml::to_string_pretty(&shown).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
