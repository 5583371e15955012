use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use crate::nocode::NoCodeError;
use crate::nocode::operator::{ArgumentReader, Operator, OperatorProvider, Parameter};
use crate::value::{DataContext, TypedValue, ValueType};

const STRING_PAIR: &[Parameter] = &[
    Parameter::new("text", ValueType::String),
    Parameter::new("other", ValueType::String),
];

/// `text.*`: string helpers.
pub struct TextOperators;

impl OperatorProvider for TextOperators {
    fn package(&self) -> &'static str {
        "text"
    }

    fn operators(&self) -> Vec<Arc<dyn Operator>> {
        vec![
            Arc::new(ConcatOperator),
            Arc::new(LengthOperator),
            Arc::new(IsEmptyOperator),
            Arc::new(ContainsOperator),
            Arc::new(MatchesOperator),
        ]
    }
}

struct ConcatOperator;

impl Operator for ConcatOperator {
    fn name(&self) -> &'static str {
        "concat"
    }

    fn label(&self) -> &'static str {
        "Concatenate"
    }

    fn description(&self) -> &'static str {
        "Joins two strings."
    }

    fn parameters(&self) -> &'static [Parameter] {
        STRING_PAIR
    }

    fn return_type(&self) -> ValueType {
        ValueType::String
    }

    fn evaluate(&self, _: &DataContext, args: &[TypedValue]) -> Result<TypedValue, NoCodeError> {
        let args = ArgumentReader::new(self, args)?;
        Ok(TypedValue::string(format!("{}{}", args.string(0)?, args.string(1)?)))
    }
}

struct LengthOperator;

impl Operator for LengthOperator {
    fn name(&self) -> &'static str {
        "length"
    }

    fn label(&self) -> &'static str {
        "Length"
    }

    fn description(&self) -> &'static str {
        "Number of characters in a string."
    }

    fn parameters(&self) -> &'static [Parameter] {
        const PARAMETERS: &[Parameter] = &[Parameter::new("text", ValueType::String)];
        PARAMETERS
    }

    fn return_type(&self) -> ValueType {
        ValueType::Number
    }

    fn evaluate(&self, _: &DataContext, args: &[TypedValue]) -> Result<TypedValue, NoCodeError> {
        let args = ArgumentReader::new(self, args)?;
        Ok(TypedValue::number(args.string(0)?.chars().count() as f64))
    }
}

/// Null, blank strings and empty lists or objects count as empty.
struct IsEmptyOperator;

impl Operator for IsEmptyOperator {
    fn name(&self) -> &'static str {
        "is-empty"
    }

    fn label(&self) -> &'static str {
        "Is empty"
    }

    fn description(&self) -> &'static str {
        "True for null, blank strings and empty lists."
    }

    fn parameters(&self) -> &'static [Parameter] {
        const PARAMETERS: &[Parameter] = &[Parameter::new("value", ValueType::Any)];
        PARAMETERS
    }

    fn return_type(&self) -> ValueType {
        ValueType::Boolean
    }

    fn evaluate(&self, _: &DataContext, args: &[TypedValue]) -> Result<TypedValue, NoCodeError> {
        let args = ArgumentReader::new(self, args)?;
        let empty = match args.value(0)? {
            Value::Null => true,
            Value::String(text) => text.trim().is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Object(map) => map.is_empty(),
            Value::Bool(_) | Value::Number(_) => false,
        };
        Ok(TypedValue::boolean(empty))
    }
}

struct ContainsOperator;

impl Operator for ContainsOperator {
    fn name(&self) -> &'static str {
        "contains"
    }

    fn label(&self) -> &'static str {
        "Contains"
    }

    fn description(&self) -> &'static str {
        "True when the first string contains the second."
    }

    fn parameters(&self) -> &'static [Parameter] {
        STRING_PAIR
    }

    fn return_type(&self) -> ValueType {
        ValueType::Boolean
    }

    fn evaluate(&self, _: &DataContext, args: &[TypedValue]) -> Result<TypedValue, NoCodeError> {
        let args = ArgumentReader::new(self, args)?;
        Ok(TypedValue::boolean(args.string(0)?.contains(args.string(1)?)))
    }
}

struct MatchesOperator;

impl Operator for MatchesOperator {
    fn name(&self) -> &'static str {
        "matches"
    }

    fn label(&self) -> &'static str {
        "Matches pattern"
    }

    fn description(&self) -> &'static str {
        "True when the whole string matches the regular expression."
    }

    fn parameters(&self) -> &'static [Parameter] {
        const PARAMETERS: &[Parameter] = &[
            Parameter::new("text", ValueType::String),
            Parameter::new("pattern", ValueType::String),
        ];
        PARAMETERS
    }

    fn return_type(&self) -> ValueType {
        ValueType::Boolean
    }

    fn evaluate(&self, _: &DataContext, args: &[TypedValue]) -> Result<TypedValue, NoCodeError> {
        let args = ArgumentReader::new(self, args)?;
        let text = args.string(0)?;
        let pattern = args.string(1)?;
        let regex = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|err| args.failure(format!("invalid pattern: {err}")))?;
        Ok(TypedValue::boolean(regex.is_match(text)))
    }
}
