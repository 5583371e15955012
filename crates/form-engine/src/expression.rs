use std::collections::BTreeSet;
use std::sync::{LazyLock, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Expression payload attached to an element, tagged by backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expression {
    Script(ScriptExpression),
    NoCode(NoCodeExpression),
    /// A stored expression that could not be understood. Kept so evaluation can
    /// fail loudly instead of silently changing the form's behaviour.
    Malformed { raw: Value, reason: String },
}

impl Expression {
    pub fn script(code: impl Into<String>) -> Self {
        Expression::Script(ScriptExpression::new(code))
    }

    pub fn no_code(expression: NoCodeExpression) -> Self {
        Expression::NoCode(expression)
    }

    /// Permissive construction from a stored definition. Never fails.
    pub fn from_value(value: &Value) -> Self {
        let Some(map) = value.as_object() else {
            return Expression::malformed(value, "expression must be an object");
        };

        let kind = map
            .get("kind")
            .and_then(Value::as_str)
            .map(|kind| kind.to_ascii_lowercase().replace(['_', '-'], ""));
        let kind = match kind.as_deref() {
            Some(kind) => kind.to_string(),
            None if map.contains_key("code") => "script".to_string(),
            None if map.contains_key("operator") => "nocode".to_string(),
            None => return Expression::malformed(value, "expression kind is missing"),
        };

        match kind.as_str() {
            "script" => match map.get("code") {
                Some(Value::String(code)) => Expression::script(code.clone()),
                None | Some(Value::Null) => Expression::script(""),
                Some(_) => Expression::malformed(value, "script code must be a string"),
            },
            "nocode" => match serde_json::from_value::<NoCodeExpression>(value.clone()) {
                Ok(expression) => Expression::NoCode(expression),
                Err(err) => Expression::malformed(value, &err.to_string()),
            },
            other => Expression::malformed(value, &format!("unknown expression kind '{other}'")),
        }
    }

    fn malformed(raw: &Value, reason: &str) -> Self {
        warn!(reason, "malformed expression in stored definition");
        Expression::Malformed {
            raw: raw.clone(),
            reason: reason.to_string(),
        }
    }

    /// Element IDs referenced by this expression, for diagnostics.
    pub fn referenced_ids(&self) -> BTreeSet<String> {
        match self {
            Expression::Script(script) => script.referenced_ids().clone(),
            Expression::NoCode(expression) => {
                let mut ids = BTreeSet::new();
                expression.collect_references(&mut ids);
                ids
            }
            Expression::Malformed { .. } => BTreeSet::new(),
        }
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Expression::from_value(&value))
    }
}

// Property or string-index access on the `data` and `row` globals,
// e.g. `data.consent`, `row.name` or `data["text_456"]`.
static ACCESSOR_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r#"\b(?:data|row)\s*(?:\?\.|\.)\s*([A-Za-z_][A-Za-z0-9_]*)|\b(?:data|row)\s*\??\[\s*"([A-Za-z_][A-Za-z0-9_]*)"\s*\]"#,
    )
    .ok()
});

// Bare IDs anywhere in the source: an identifier with at least one `_`
// segment and a digit, e.g. `text_123` or `container_0_field_1`.
static NUMBERED_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z][A-Za-z0-9]*(?:_[A-Za-z0-9]+)+\b").ok());

/// Source code for the sandboxed script backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptExpression {
    pub code: String,
    #[serde(skip)]
    references: OnceLock<BTreeSet<String>>,
}

impl ScriptExpression {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            references: OnceLock::new(),
        }
    }

    /// Element IDs textually present in the source. Computed once and cached.
    ///
    /// Used for dependency diagnostics only; the derivation order is the
    /// structural walk order.
    pub fn referenced_ids(&self) -> &BTreeSet<String> {
        self.references
            .get_or_init(|| extract_references(&self.code))
    }
}

impl PartialEq for ScriptExpression {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

fn extract_references(code: &str) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    if let Some(pattern) = ACCESSOR_PATTERN.as_ref() {
        for captures in pattern.captures_iter(code) {
            if let Some(id) = captures.get(1).or_else(|| captures.get(2)) {
                ids.insert(id.as_str().to_string());
            }
        }
    }
    if let Some(pattern) = NUMBERED_PATTERN.as_ref() {
        ids.extend(
            pattern
                .find_iter(code)
                .map(|found| found.as_str())
                .filter(|candidate| candidate.bytes().any(|byte| byte.is_ascii_digit()))
                .map(str::to_string),
        );
    }
    ids
}

/// Pre-structured operator application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoCodeExpression {
    /// Package-scoped operator identifier, e.g. `logic.and`.
    pub operator: String,
    #[serde(default)]
    pub operands: Vec<Operand>,
}

impl NoCodeExpression {
    pub fn new(operator: impl Into<String>, operands: Vec<Operand>) -> Self {
        Self {
            operator: operator.into(),
            operands,
        }
    }

    fn collect_references(&self, ids: &mut BTreeSet<String>) {
        for operand in &self.operands {
            match operand {
                Operand::Static { .. } => {}
                Operand::Reference { id } => {
                    ids.insert(id.clone());
                }
                Operand::Expression { expression } => expression.collect_references(ids),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operand {
    Static {
        #[serde(default)]
        value: Value,
    },
    /// Another element's derived value, resolved relative to the active id prefix.
    Reference { id: String },
    Expression { expression: Box<NoCodeExpression> },
}

impl Operand {
    pub fn value(value: impl Into<Value>) -> Self {
        Operand::Static {
            value: value.into(),
        }
    }

    pub fn reference(id: impl Into<String>) -> Self {
        Operand::Reference { id: id.into() }
    }

    pub fn nested(expression: NoCodeExpression) -> Self {
        Operand::Expression {
            expression: Box::new(expression),
        }
    }
}
