//! Operator-based expression backend.

pub mod operator;
pub mod operators;
pub mod registry;
pub mod service;

use serde_json::Value;
use thiserror::Error;

pub use operator::{ArgumentReader, Operator, OperatorDescriptor, OperatorProvider, Parameter};
pub use registry::OperatorRegistry;
pub use service::NoCodeService;

/// Failures raised while evaluating a NoCode expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NoCodeError {
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),
    #[error("malformed expression: {0}")]
    MalformedExpression(String),
    #[error("operator '{operator}' expects {expected} argument(s), got {actual}")]
    WrongArgumentCount {
        operator: String,
        expected: usize,
        actual: usize,
    },
    #[error("operator '{operator}' parameter '{parameter}' expects {expected}, got {actual}")]
    TypeMismatch {
        operator: String,
        parameter: String,
        expected: String,
        actual: String,
    },
    #[error("operator '{operator}' failed: {message}")]
    Evaluation { operator: String, message: String },
}

impl NoCodeError {
    /// Definition errors point at a corrupt stored definition rather than at
    /// the values being evaluated.
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            NoCodeError::UnknownOperator(_) | NoCodeError::MalformedExpression(_)
        )
    }

    /// Replaces the operator named in the error with its package-scoped
    /// identifier, e.g. `contains` with `text.contains`.
    pub(crate) fn scoped_to(mut self, identifier: &str) -> Self {
        match &mut self {
            NoCodeError::WrongArgumentCount { operator, .. }
            | NoCodeError::TypeMismatch { operator, .. }
            | NoCodeError::Evaluation { operator, .. } => *operator = identifier.to_string(),
            NoCodeError::UnknownOperator(_) | NoCodeError::MalformedExpression(_) => {}
        }
        self
    }
}

/// Type name used in error messages; `null` is reported as such.
pub(crate) fn describe_value(value: &Value) -> String {
    if value.is_null() {
        "null".to_string()
    } else {
        crate::value::ValueType::of(value).to_string()
    }
}
