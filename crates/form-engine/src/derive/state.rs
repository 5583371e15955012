use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::element::Element;
use crate::value::DataContext;

/// A failure tolerated under [`FailurePolicy::Degrade`](crate::config::FailurePolicy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DerivationFailure {
    pub key: String,
    pub step: String,
    pub message: String,
}

/// Immutable snapshot produced by one derivation.
///
/// All maps are keyed by element key: the element ID, prefixed with
/// `<container>_<index>` inside repetitions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct FormState {
    pub visibilities: BTreeMap<String, bool>,
    /// Effective values: inputs with computed values applied.
    pub values: DataContext,
    /// Validation messages of visible fields.
    pub errors: BTreeMap<String, String>,
    #[schemars(with = "BTreeMap<String, Value>")]
    pub overrides: BTreeMap<String, Element>,
    /// Repetition count per repeating container key.
    pub repetitions: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<DerivationFailure>,
}

impl FormState {
    /// Keys never visited count as visible.
    pub fn is_visible(&self, key: &str) -> bool {
        self.visibilities.get(key).copied().unwrap_or(true)
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn error(&self, key: &str) -> Option<&str> {
        self.errors.get(key).map(String::as_str)
    }

    pub fn override_for(&self, key: &str) -> Option<&Element> {
        self.overrides.get(key)
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Effective values of elements that are not hidden.
    pub fn visible_values(&self) -> DataContext {
        self.values
            .iter()
            .filter(|(key, _)| self.is_visible(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn schema() -> Value {
        serde_json::to_value(schemars::schema_for!(FormState)).unwrap_or_default()
    }
}
