use serde_json::Value;

use super::ScriptError;
use crate::nocode::describe_value;
use crate::value::TypedValue;

/// Dynamically typed script result.
///
/// Conversions are requested by the caller; a failed conversion is the
/// caller's error, not the engine's.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptValue(Value);

impl ScriptValue {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    pub fn as_bool(&self) -> Result<bool, ScriptError> {
        self.0.as_bool().ok_or_else(|| self.conversion("boolean"))
    }

    pub fn as_f64(&self) -> Result<f64, ScriptError> {
        match &self.0 {
            Value::Number(number) => number.as_f64().ok_or_else(|| self.conversion("number")),
            Value::String(text) => text
                .trim()
                .parse::<f64>()
                .map_err(|_| self.conversion("number")),
            _ => Err(self.conversion("number")),
        }
    }

    /// Scalars render as text; null, lists and objects do not convert.
    pub fn as_string(&self) -> Result<String, ScriptError> {
        match &self.0 {
            Value::String(text) => Ok(text.clone()),
            Value::Bool(flag) => Ok(flag.to_string()),
            Value::Number(number) => Ok(number.to_string()),
            _ => Err(self.conversion("string")),
        }
    }

    pub fn into_typed(self) -> TypedValue {
        TypedValue::infer(self.0)
    }

    fn conversion(&self, expected: &'static str) -> ScriptError {
        ScriptError::Conversion {
            expected,
            actual: describe_value(&self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conversions() {
        assert_eq!(ScriptValue::new(json!(true)).as_bool(), Ok(true));
        assert_eq!(ScriptValue::new(json!(" 2.5 ")).as_f64(), Ok(2.5));
        assert_eq!(ScriptValue::new(json!(7)).as_string(), Ok("7".to_string()));
    }

    #[test]
    fn failed_conversion_names_both_types() {
        let err = ScriptValue::new(Value::Null).as_bool().unwrap_err();
        assert_eq!(
            err,
            ScriptError::Conversion {
                expected: "boolean",
                actual: "null".into(),
            }
        );
        assert!(ScriptValue::new(json!({ "a": 1 })).as_string().is_err());
    }
}
