use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// What a derivation does when an expression fails outside validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The first failure aborts the derivation and no state is returned.
    #[default]
    Abort,
    /// The failing step falls back (no override, hidden, raw value kept) and the
    /// failure is listed in the resulting state.
    Degrade,
}

/// Resource budget of a script engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ScriptLimits {
    /// Instruction budget for one script evaluation; `0` disables it.
    pub max_operations: u64,
    /// Wall-clock budget for one script evaluation.
    pub timeout_ms: u64,
    /// Wall-clock budget for one host-function call.
    pub host_call_timeout_ms: u64,
    pub max_call_levels: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000,
            timeout_ms: 2_000,
            host_call_timeout_ms: 5_000,
            max_call_levels: 32,
            max_string_size: 64 * 1024,
            max_array_size: 10_000,
            max_map_size: 10_000,
        }
    }
}

impl ScriptLimits {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn host_call_timeout(&self) -> Duration {
        Duration::from_millis(self.host_call_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RepetitionConfig {
    /// Repetitions used when the input carries no count for a container.
    /// Still clamped to the container's own bounds.
    pub default_repetitions: usize,
    /// Upper bound for containers that declare no `max_repetitions`.
    pub max_repetitions: usize,
}

impl Default for RepetitionConfig {
    fn default() -> Self {
        Self {
            default_repetitions: 0,
            max_repetitions: 1_000,
        }
    }
}

/// Secret names scripts may read through the `forms.secrets` provider.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SecretsPolicy {
    /// Glob patterns; an empty list allows every name not denied.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allow: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deny: Vec<String>,
}

/// Engine configuration. Every field has a default, so `{}` is valid.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EngineConfig {
    pub failure_policy: FailurePolicy,
    pub script: ScriptLimits,
    pub repetition: RepetitionConfig,
    pub secrets: SecretsPolicy,
}

impl EngineConfig {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw)
    }

    pub fn schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(EngineConfig)).unwrap_or_default()
    }
}
