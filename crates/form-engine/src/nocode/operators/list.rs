use std::sync::Arc;

use super::compare::values_equal;
use crate::nocode::NoCodeError;
use crate::nocode::operator::{ArgumentReader, Operator, OperatorProvider, Parameter};
use crate::value::{DataContext, TypedValue, ValueType};

const LIST: &[Parameter] = &[Parameter::new("list", ValueType::List)];

/// `list.*`: helpers for multi-select answers and repetition data.
pub struct ListOperators;

impl OperatorProvider for ListOperators {
    fn package(&self) -> &'static str {
        "list"
    }

    fn operators(&self) -> Vec<Arc<dyn Operator>> {
        vec![
            Arc::new(SizeOperator),
            Arc::new(ListContainsOperator),
            Arc::new(SumOperator),
        ]
    }
}

struct SizeOperator;

impl Operator for SizeOperator {
    fn name(&self) -> &'static str {
        "size"
    }

    fn label(&self) -> &'static str {
        "Size"
    }

    fn description(&self) -> &'static str {
        "Number of entries in a list."
    }

    fn parameters(&self) -> &'static [Parameter] {
        LIST
    }

    fn return_type(&self) -> ValueType {
        ValueType::Number
    }

    fn evaluate(&self, _: &DataContext, args: &[TypedValue]) -> Result<TypedValue, NoCodeError> {
        let args = ArgumentReader::new(self, args)?;
        Ok(TypedValue::number(args.list(0)?.len() as f64))
    }
}

struct ListContainsOperator;

impl Operator for ListContainsOperator {
    fn name(&self) -> &'static str {
        "contains"
    }

    fn label(&self) -> &'static str {
        "List contains"
    }

    fn description(&self) -> &'static str {
        "True when any entry equals the value."
    }

    fn parameters(&self) -> &'static [Parameter] {
        const PARAMETERS: &[Parameter] = &[
            Parameter::new("list", ValueType::List),
            Parameter::new("value", ValueType::Any),
        ];
        PARAMETERS
    }

    fn return_type(&self) -> ValueType {
        ValueType::Boolean
    }

    fn evaluate(&self, _: &DataContext, args: &[TypedValue]) -> Result<TypedValue, NoCodeError> {
        let args = ArgumentReader::new(self, args)?;
        let needle = args.value(1)?;
        let found = args.list(0)?.iter().any(|item| values_equal(item, needle));
        Ok(TypedValue::boolean(found))
    }
}

struct SumOperator;

impl Operator for SumOperator {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn label(&self) -> &'static str {
        "Sum"
    }

    fn description(&self) -> &'static str {
        "Adds all entries of a list of numbers."
    }

    fn parameters(&self) -> &'static [Parameter] {
        LIST
    }

    fn return_type(&self) -> ValueType {
        ValueType::Number
    }

    fn evaluate(&self, _: &DataContext, args: &[TypedValue]) -> Result<TypedValue, NoCodeError> {
        let args = ArgumentReader::new(self, args)?;
        let mut total = 0.0;
        for (index, item) in args.list(0)?.iter().enumerate() {
            let number = item
                .as_f64()
                .ok_or_else(|| args.failure(format!("entry {index} is not a number")))?;
            total += number;
        }
        if !total.is_finite() {
            return Err(args.failure("result is not a finite number"));
        }
        Ok(TypedValue::number(total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn call(name: &str, args: Vec<Value>) -> Result<Value, NoCodeError> {
        let operator = ListOperators
            .operators()
            .into_iter()
            .find(|operator| operator.name() == name)
            .expect("operator");
        let args: Vec<_> = args.into_iter().map(TypedValue::infer).collect();
        operator
            .evaluate(&DataContext::new(), &args)
            .map(TypedValue::into_value)
    }

    #[test]
    fn list_helpers() {
        assert_eq!(call("size", vec![json!([1, 2, 3])]).unwrap(), json!(3));
        assert_eq!(call("contains", vec![json!(["a", 2]), json!(2.0)]).unwrap(), json!(true));
        assert_eq!(call("sum", vec![json!([1, 2.5])]).unwrap(), json!(3.5));
    }

    #[test]
    fn sum_rejects_non_numbers() {
        let err = call("sum", vec![json!([1, "2"])]).unwrap_err();
        assert!(matches!(err, NoCodeError::Evaluation { .. }));
    }

    #[test]
    fn sum_rejects_overflow() {
        let err = call("sum", vec![json!([1e308, 1e308])]).unwrap_err();
        assert!(
            matches!(err, NoCodeError::Evaluation { ref message, .. } if message == "result is not a finite number")
        );
    }
}
