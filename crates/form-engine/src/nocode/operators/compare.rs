use std::sync::Arc;

use serde_json::Value;

use crate::nocode::NoCodeError;
use crate::nocode::operator::{ArgumentReader, Operator, OperatorProvider, Parameter};
use crate::value::{DataContext, TypedValue, ValueType};

const ANY_PAIR: &[Parameter] = &[
    Parameter::new("left", ValueType::Any),
    Parameter::new("right", ValueType::Any),
];

const NUMBER_PAIR: &[Parameter] = &[
    Parameter::new("left", ValueType::Number),
    Parameter::new("right", ValueType::Number),
];

/// `compare.*`: equality, numeric ordering and null checks.
pub struct ComparisonOperators;

impl OperatorProvider for ComparisonOperators {
    fn package(&self) -> &'static str {
        "compare"
    }

    fn operators(&self) -> Vec<Arc<dyn Operator>> {
        vec![
            Arc::new(EqualsOperator { negate: false }),
            Arc::new(EqualsOperator { negate: true }),
            Arc::new(OrderingOperator {
                name: "less-than",
                label: "Less than",
                test: |left, right| left < right,
            }),
            Arc::new(OrderingOperator {
                name: "less-or-equal",
                label: "Less than or equal",
                test: |left, right| left <= right,
            }),
            Arc::new(OrderingOperator {
                name: "greater-than",
                label: "Greater than",
                test: |left, right| left > right,
            }),
            Arc::new(OrderingOperator {
                name: "greater-or-equal",
                label: "Greater than or equal",
                test: |left, right| left >= right,
            }),
            Arc::new(IsNullOperator),
        ]
    }
}

/// Numbers compare by value, so `1` equals `1.0`.
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(left), Some(right)) if left.is_finite() && right.is_finite() => left == right,
        _ => left == right,
    }
}

struct EqualsOperator {
    negate: bool,
}

impl Operator for EqualsOperator {
    fn name(&self) -> &'static str {
        if self.negate { "not-equals" } else { "equals" }
    }

    fn label(&self) -> &'static str {
        if self.negate { "Not equal" } else { "Equal" }
    }

    fn description(&self) -> &'static str {
        if self.negate {
            "True when the operands differ."
        } else {
            "True when the operands are equal; numbers compare by value."
        }
    }

    fn parameters(&self) -> &'static [Parameter] {
        ANY_PAIR
    }

    fn return_type(&self) -> ValueType {
        ValueType::Boolean
    }

    fn evaluate(&self, _: &DataContext, args: &[TypedValue]) -> Result<TypedValue, NoCodeError> {
        let args = ArgumentReader::new(self, args)?;
        let equal = values_equal(args.value(0)?, args.value(1)?);
        Ok(TypedValue::boolean(equal != self.negate))
    }
}

struct OrderingOperator {
    name: &'static str,
    label: &'static str,
    test: fn(f64, f64) -> bool,
}

impl Operator for OrderingOperator {
    fn name(&self) -> &'static str {
        self.name
    }

    fn label(&self) -> &'static str {
        self.label
    }

    fn description(&self) -> &'static str {
        "Numeric comparison of the left operand against the right one."
    }

    fn parameters(&self) -> &'static [Parameter] {
        NUMBER_PAIR
    }

    fn return_type(&self) -> ValueType {
        ValueType::Boolean
    }

    fn evaluate(&self, _: &DataContext, args: &[TypedValue]) -> Result<TypedValue, NoCodeError> {
        let args = ArgumentReader::new(self, args)?;
        Ok(TypedValue::boolean((self.test)(args.number(0)?, args.number(1)?)))
    }
}

struct IsNullOperator;

impl Operator for IsNullOperator {
    fn name(&self) -> &'static str {
        "is-null"
    }

    fn label(&self) -> &'static str {
        "Is empty value"
    }

    fn description(&self) -> &'static str {
        "True when the operand is null, e.g. an unanswered or hidden field."
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
        Ok(TypedValue::boolean(args.value(0)?.is_null()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn operator(name: &str) -> Arc<dyn Operator> {
        ComparisonOperators
            .operators()
            .into_iter()
            .find(|operator| operator.name() == name)
            .expect("operator")
    }

    fn call(name: &str, args: Vec<Value>) -> Result<Value, NoCodeError> {
        let args: Vec<_> = args.into_iter().map(TypedValue::infer).collect();
        operator(name)
            .evaluate(&DataContext::new(), &args)
            .map(TypedValue::into_value)
    }

    #[test]
    fn equality_is_numeric_aware() {
        assert_eq!(call("equals", vec![json!(1), json!(1.0)]).unwrap(), json!(true));
        assert_eq!(call("equals", vec![json!("a"), json!("b")]).unwrap(), json!(false));
        assert_eq!(call("not-equals", vec![json!("a"), json!("b")]).unwrap(), json!(true));
        assert_eq!(call("equals", vec![Value::Null, Value::Null]).unwrap(), json!(true));
    }

    #[test]
    fn ordering_requires_numbers() {
        assert_eq!(call("less-than", vec![json!(1), json!(2)]).unwrap(), json!(true));
        assert_eq!(call("greater-or-equal", vec![json!(2), json!(2)]).unwrap(), json!(true));
        let err = call("greater-than", vec![json!("3"), json!(2)]).unwrap_err();
        assert!(matches!(err, NoCodeError::TypeMismatch { .. }));
    }
}
