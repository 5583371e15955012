use std::fmt;

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Flat mapping from element key to effective value.
pub type DataContext = Map<String, Value>;

/// Date format shared by date-typed values and the `date` operators.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Closed set of primitive types an operator can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Any,
    Boolean,
    Number,
    String,
    Date,
    List,
    Object,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Any => "any",
            ValueType::Boolean => "boolean",
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::Date => "date",
            ValueType::List => "list",
            ValueType::Object => "object",
        }
    }

    /// Best-effort classification of a raw JSON value.
    ///
    /// Strings that parse as `YYYY-MM-DD` are still reported as strings; date
    /// typing only happens when an operator asks for a date.
    pub fn of(value: &Value) -> ValueType {
        match value {
            Value::Null => ValueType::Any,
            Value::Bool(_) => ValueType::Boolean,
            Value::Number(_) => ValueType::Number,
            Value::String(_) => ValueType::String,
            Value::Array(_) => ValueType::List,
            Value::Object(_) => ValueType::Object,
        }
    }

    /// Whether `value` is acceptable where this type is expected. `null` only
    /// satisfies `any`.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ValueType::Any => true,
            ValueType::Boolean => value.is_boolean(),
            ValueType::Number => value.is_number(),
            ValueType::String => value.is_string(),
            ValueType::Date => value
                .as_str()
                .is_some_and(|text| NaiveDate::parse_from_str(text, DATE_FORMAT).is_ok()),
            ValueType::List => value.is_array(),
            ValueType::Object => value.is_object(),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value produced by an evaluation backend, tagged with its declared type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TypedValue {
    pub value_type: ValueType,
    pub value: Value,
}

impl TypedValue {
    pub fn new(value_type: ValueType, value: Value) -> Self {
        Self { value_type, value }
    }

    pub fn null() -> Self {
        Self::new(ValueType::Any, Value::Null)
    }

    /// Wraps a raw value, inferring its type.
    pub fn infer(value: Value) -> Self {
        Self::new(ValueType::of(&value), value)
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(ValueType::Boolean, Value::Bool(value))
    }

    pub fn number(value: f64) -> Self {
        Self::new(ValueType::Number, number_value(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ValueType::String, Value::String(value.into()))
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

/// Converts a float into a JSON number, keeping integral values integral.
pub fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.is_finite() && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Truthiness used when a backend result decides visibility or validity.
///
/// `null` is reported as `None` so callers can apply their own default.
pub fn truthiness(value: &Value) -> Option<bool> {
    match value {
        Value::Null => None,
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => Some(number.as_f64().is_some_and(|n| n != 0.0)),
        Value::String(text) => Some(!text.is_empty()),
        Value::Array(items) => Some(!items.is_empty()),
        Value::Object(_) => Some(true),
    }
}
