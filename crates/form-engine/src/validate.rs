//! Built-in field checks run before a field's validation expression.

use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::element::{Constraint, FieldElement, FieldType};
use crate::value::{DATE_FORMAT, truthiness};

/// A failed business rule on a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldViolation {
    pub code: &'static str,
    pub message: String,
}

impl FieldViolation {
    pub(crate) fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Required, type and constraint checks for a visible field.
pub fn check_field(field: &FieldElement, value: Option<&Value>) -> Option<FieldViolation> {
    let value = match value {
        Some(value) if !is_blank(field.field_type, value) => value,
        _ => {
            return field
                .required
                .then(|| FieldViolation::new("required", "a value is required"));
        }
    };

    if !matches_type(field.field_type, value) {
        return Some(FieldViolation::new("type_mismatch", "type mismatch"));
    }

    field
        .constraint
        .as_ref()
        .and_then(|constraint| enforce_constraint(&field.meta.id, value, constraint))
}

/// Interprets the result of a validation expression: `true`, `null` and the
/// empty string mean valid; `false` fails with the field's message; any other
/// string is itself the message.
pub fn interpret_validation_result(field: &FieldElement, result: &Value) -> Option<FieldViolation> {
    let fallback = || {
        field
            .validation_message
            .clone()
            .unwrap_or_else(|| "invalid value".to_string())
    };
    match result {
        Value::String(message) if message.is_empty() => None,
        Value::String(message) => Some(FieldViolation::new("validation", message.clone())),
        other => match truthiness(other) {
            None | Some(true) => None,
            Some(false) => Some(FieldViolation::new("validation", fallback())),
        },
    }
}

// An unticked checkbox counts as unanswered, so `required` means "must be ticked".
fn is_blank(field_type: FieldType, value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(false) => field_type == FieldType::Checkbox,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn matches_type(field_type: FieldType, value: &Value) -> bool {
    match field_type {
        FieldType::Text | FieldType::Textarea | FieldType::Email => value.is_string(),
        FieldType::Number => value.is_number(),
        FieldType::Checkbox => value.is_boolean(),
        FieldType::Date => value
            .as_str()
            .is_some_and(|text| chrono::NaiveDate::parse_from_str(text, DATE_FORMAT).is_ok()),
        FieldType::Select => value.is_string() || value.is_array(),
        FieldType::Other => true,
    }
}

fn enforce_constraint(id: &str, value: &Value, constraint: &Constraint) -> Option<FieldViolation> {
    if let Some(pattern) = &constraint.pattern
        && let Some(text) = value.as_str()
    {
        match Regex::new(pattern) {
            Ok(regex) if !regex.is_match(text) => {
                return Some(FieldViolation::new(
                    "pattern_mismatch",
                    "value does not match pattern",
                ));
            }
            Ok(_) => {}
            Err(err) => warn!(id, %err, "ignoring invalid constraint pattern"),
        }
    }

    if let Some(min_len) = constraint.min_len
        && let Some(text) = value.as_str()
        && text.chars().count() < min_len
    {
        return Some(FieldViolation::new(
            "min_length",
            "string shorter than min length",
        ));
    }

    if let Some(max_len) = constraint.max_len
        && let Some(text) = value.as_str()
        && text.chars().count() > max_len
    {
        return Some(FieldViolation::new(
            "max_length",
            "string longer than max length",
        ));
    }

    if let Some(min) = constraint.min
        && let Some(number) = value.as_f64()
        && number < min
    {
        return Some(FieldViolation::new("min", "value below minimum"));
    }

    if let Some(max) = constraint.max
        && let Some(number) = value.as_f64()
        && number > max
    {
        return Some(FieldViolation::new("max", "value above maximum"));
    }

    None
}
