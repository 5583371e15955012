use std::sync::Arc;

use crate::nocode::NoCodeError;
use crate::nocode::operator::{ArgumentReader, Operator, OperatorProvider, Parameter};
use crate::value::{DataContext, TypedValue, ValueType};

const BINARY: &[Parameter] = &[
    Parameter::new("left", ValueType::Boolean),
    Parameter::new("right", ValueType::Boolean),
];

/// `logic.*`: boolean connectives and the conditional.
pub struct LogicOperators;

impl OperatorProvider for LogicOperators {
    fn package(&self) -> &'static str {
        "logic"
    }

    fn operators(&self) -> Vec<Arc<dyn Operator>> {
        vec![
            Arc::new(AndOperator),
            Arc::new(OrOperator),
            Arc::new(XorOperator),
            Arc::new(NotOperator),
            Arc::new(IfElseOperator),
        ]
    }
}

pub struct AndOperator;

impl Operator for AndOperator {
    fn name(&self) -> &'static str {
        "and"
    }

    fn label(&self) -> &'static str {
        "And"
    }

    fn description(&self) -> &'static str {
        "True when both operands are true."
    }

    fn parameters(&self) -> &'static [Parameter] {
        BINARY
    }

    fn return_type(&self) -> ValueType {
        ValueType::Boolean
    }

    fn evaluate(&self, _: &DataContext, args: &[TypedValue]) -> Result<TypedValue, NoCodeError> {
        let args = ArgumentReader::new(self, args)?;
        // Both sides are type checked before combining.
        let (left, right) = (args.boolean(0)?, args.boolean(1)?);
        Ok(TypedValue::boolean(left && right))
    }
}

pub struct OrOperator;

impl Operator for OrOperator {
    fn name(&self) -> &'static str {
        "or"
    }

    fn label(&self) -> &'static str {
        "Or"
    }

    fn description(&self) -> &'static str {
        "True when at least one operand is true."
    }

    fn parameters(&self) -> &'static [Parameter] {
        BINARY
    }

    fn return_type(&self) -> ValueType {
        ValueType::Boolean
    }

    fn evaluate(&self, _: &DataContext, args: &[TypedValue]) -> Result<TypedValue, NoCodeError> {
        let args = ArgumentReader::new(self, args)?;
        let (left, right) = (args.boolean(0)?, args.boolean(1)?);
        Ok(TypedValue::boolean(left || right))
    }
}

pub struct XorOperator;

impl Operator for XorOperator {
    fn name(&self) -> &'static str {
        "xor"
    }

    fn label(&self) -> &'static str {
        "Exclusive or"
    }

    fn description(&self) -> &'static str {
        "True when exactly one operand is true."
    }

    fn parameters(&self) -> &'static [Parameter] {
        BINARY
    }

    fn return_type(&self) -> ValueType {
        ValueType::Boolean
    }

    fn evaluate(&self, _: &DataContext, args: &[TypedValue]) -> Result<TypedValue, NoCodeError> {
        let args = ArgumentReader::new(self, args)?;
        Ok(TypedValue::boolean(args.boolean(0)? ^ args.boolean(1)?))
    }
}

/// Boolean negation. `null` is rejected rather than coerced.
pub struct NotOperator;

impl Operator for NotOperator {
    fn name(&self) -> &'static str {
        "not"
    }

    fn label(&self) -> &'static str {
        "Not"
    }

    fn description(&self) -> &'static str {
        "Negates a boolean."
    }

    fn parameters(&self) -> &'static [Parameter] {
        const PARAMETERS: &[Parameter] = &[Parameter::new("value", ValueType::Boolean)];
        PARAMETERS
    }

    fn return_type(&self) -> ValueType {
        ValueType::Boolean
    }

    fn evaluate(&self, _: &DataContext, args: &[TypedValue]) -> Result<TypedValue, NoCodeError> {
        let args = ArgumentReader::new(self, args)?;
        Ok(TypedValue::boolean(!args.boolean(0)?))
    }
}

pub struct IfElseOperator;

impl Operator for IfElseOperator {
    fn name(&self) -> &'static str {
        "if-else"
    }

    fn label(&self) -> &'static str {
        "If / else"
    }

    fn description(&self) -> &'static str {
        "Yields the second operand when the condition holds, otherwise the third."
    }

    fn parameters(&self) -> &'static [Parameter] {
        const PARAMETERS: &[Parameter] = &[
            Parameter::new("condition", ValueType::Boolean),
            Parameter::new("then", ValueType::Any),
            Parameter::new("else", ValueType::Any),
        ];
        PARAMETERS
    }

    fn return_type(&self) -> ValueType {
        ValueType::Any
    }

    fn evaluate(&self, _: &DataContext, args: &[TypedValue]) -> Result<TypedValue, NoCodeError> {
        let args = ArgumentReader::new(self, args)?;
        let chosen = if args.boolean(0)? {
            args.value(1)?
        } else {
            args.value(2)?
        };
        Ok(TypedValue::infer(chosen.clone()))
    }
}
