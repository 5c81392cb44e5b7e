//! Immutable configuration for one solve.

use serde::{Deserialize, Serialize};

/// Built once before the loop starts and passed by reference into
/// `solve`; nothing in the loop mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveConfig {
    /// Selects the decision oracle (model + parameters); recorded on the run
    pub oracle_id: String,

    /// Hard step ceiling
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Oracle sampling parameter, passed through opaquely
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Oracle response length bound, passed through opaquely
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Extra oracle attempts allowed within one step on transport failure
    #[serde(default = "default_oracle_retries")]
    pub oracle_retries: u32,

    /// Observations longer than this are truncated in the decision context
    #[serde(default = "default_max_observation_chars")]
    pub max_observation_chars: usize,
}

fn default_max_steps() -> u32 {
    30
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_output_tokens() -> u32 {
    4096
}
fn default_oracle_retries() -> u32 {
    1
}
fn default_max_observation_chars() -> usize {
    2000
}

impl SolveConfig {
    pub fn new(oracle_id: impl Into<String>) -> Self {
        Self {
            oracle_id: oracle_id.into(),
            max_steps: default_max_steps(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            oracle_retries: default_oracle_retries(),
            max_observation_chars: default_max_observation_chars(),
        }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_oracle_retries(mut self, retries: u32) -> Self {
        self.oracle_retries = retries;
        self
    }
}
