use std::sync::Arc;

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{NoCodeError, describe_value};
use crate::value::{DATE_FORMAT, DataContext, TypedValue, ValueType};

/// A declared operator parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameter {
    pub name: &'static str,
    pub value_type: ValueType,
}

impl Parameter {
    pub const fn new(name: &'static str, value_type: ValueType) -> Self {
        Self { name, value_type }
    }
}

/// A pure, typed function usable inside NoCode expressions.
///
/// Implementations are stateless; the same arguments always produce the same
/// result. They are responsible for their own arity and type checks, which
/// [`ArgumentReader`] makes uniform.
pub trait Operator: Send + Sync {
    /// Name within the provider package, e.g. `and`.
    fn name(&self) -> &'static str;
    fn label(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn parameters(&self) -> &'static [Parameter];
    fn return_type(&self) -> ValueType;
    fn evaluate(
        &self,
        context: &DataContext,
        args: &[TypedValue],
    ) -> Result<TypedValue, NoCodeError>;
}

/// A package of operators registered at startup.
pub trait OperatorProvider: Send + Sync {
    /// Package prefix of every operator identifier, e.g. `logic`.
    fn package(&self) -> &'static str;
    fn operators(&self) -> Vec<Arc<dyn Operator>>;
}

/// Read-only catalog entry for operator pickers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OperatorDescriptor {
    pub identifier: String,
    pub label: String,
    pub description: String,
    pub parameters: Vec<ParameterDescriptor>,
    pub return_type: ValueType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ParameterDescriptor {
    pub name: String,
    pub value_type: ValueType,
}

impl OperatorDescriptor {
    pub fn describe(identifier: &str, operator: &dyn Operator) -> Self {
        Self {
            identifier: identifier.to_string(),
            label: operator.label().to_string(),
            description: operator.description().to_string(),
            parameters: operator
                .parameters()
                .iter()
                .map(|parameter| ParameterDescriptor {
                    name: parameter.name.to_string(),
                    value_type: parameter.value_type,
                })
                .collect(),
            return_type: operator.return_type(),
        }
    }
}

/// Checked access to an operator's arguments.
///
/// Construction fails with [`NoCodeError::WrongArgumentCount`] unless exactly
/// one argument per declared parameter was supplied; each accessor checks the
/// argument against the declared parameter type.
pub struct ArgumentReader<'a> {
    operator: &'static str,
    parameters: &'static [Parameter],
    args: &'a [TypedValue],
}

impl<'a> ArgumentReader<'a> {
    pub fn new(operator: &dyn Operator, args: &'a [TypedValue]) -> Result<Self, NoCodeError> {
        let parameters = operator.parameters();
        if args.len() != parameters.len() {
            return Err(NoCodeError::WrongArgumentCount {
                operator: operator.name().to_string(),
                expected: parameters.len(),
                actual: args.len(),
            });
        }
        Ok(Self {
            operator: operator.name(),
            parameters,
            args,
        })
    }

    /// The argument at `index`, checked against its declared type.
    pub fn value(&self, index: usize) -> Result<&'a Value, NoCodeError> {
        let parameter = self.parameters[index];
        let value = &self.args[index].value;
        if parameter.value_type.accepts(value) {
            Ok(value)
        } else {
            Err(self.mismatch(index, value))
        }
    }

    pub fn boolean(&self, index: usize) -> Result<bool, NoCodeError> {
        let value = self.value(index)?;
        value.as_bool().ok_or_else(|| self.mismatch(index, value))
    }

    pub fn number(&self, index: usize) -> Result<f64, NoCodeError> {
        let value = self.value(index)?;
        value.as_f64().ok_or_else(|| self.mismatch(index, value))
    }

    pub fn string(&self, index: usize) -> Result<&'a str, NoCodeError> {
        let value = self.value(index)?;
        value.as_str().ok_or_else(|| self.mismatch(index, value))
    }

    pub fn list(&self, index: usize) -> Result<&'a [Value], NoCodeError> {
        let value = self.value(index)?;
        value
            .as_array()
            .map(Vec::as_slice)
            .ok_or_else(|| self.mismatch(index, value))
    }

    pub fn date(&self, index: usize) -> Result<NaiveDate, NoCodeError> {
        let text = self.string(index)?;
        NaiveDate::parse_from_str(text, DATE_FORMAT)
            .map_err(|_| self.mismatch(index, &self.args[index].value))
    }

    pub fn failure(&self, message: impl Into<String>) -> NoCodeError {
        NoCodeError::Evaluation {
            operator: self.operator.to_string(),
            message: message.into(),
        }
    }

    fn mismatch(&self, index: usize, value: &Value) -> NoCodeError {
        let parameter = self.parameters[index];
        NoCodeError::TypeMismatch {
            operator: self.operator.to_string(),
            parameter: parameter.name.to_string(),
            expected: parameter.value_type.to_string(),
            actual: describe_value(value),
        }
    }
}
