use std::sync::Arc;

use crate::nocode::NoCodeError;
use crate::nocode::operator::{ArgumentReader, Operator, OperatorProvider, Parameter};
use crate::value::{DataContext, TypedValue, ValueType};

const NUMBER_PAIR: &[Parameter] = &[
    Parameter::new("left", ValueType::Number),
    Parameter::new("right", ValueType::Number),
];

/// `math.*`: arithmetic over numbers.
pub struct MathOperators;

impl OperatorProvider for MathOperators {
    fn package(&self) -> &'static str {
        "math"
    }

    fn operators(&self) -> Vec<Arc<dyn Operator>> {
        vec![
            Arc::new(ArithmeticOperator {
                name: "add",
                label: "Add",
                apply: |left, right| Ok(left + right),
            }),
            Arc::new(ArithmeticOperator {
                name: "subtract",
                label: "Subtract",
                apply: |left, right| Ok(left - right),
            }),
            Arc::new(ArithmeticOperator {
                name: "multiply",
                label: "Multiply",
                apply: |left, right| Ok(left * right),
            }),
            Arc::new(ArithmeticOperator {
                name: "divide",
                label: "Divide",
                apply: |left, right| {
                    if right == 0.0 {
                        Err("division by zero")
                    } else {
                        Ok(left / right)
                    }
                },
            }),
            Arc::new(RoundOperator),
        ]
    }
}

struct ArithmeticOperator {
    name: &'static str,
    label: &'static str,
    apply: fn(f64, f64) -> Result<f64, &'static str>,
}

impl Operator for ArithmeticOperator {
    fn name(&self) -> &'static str {
        self.name
    }

    fn label(&self) -> &'static str {
        self.label
    }

    fn description(&self) -> &'static str {
        "Binary arithmetic on two numbers."
    }

    fn parameters(&self) -> &'static [Parameter] {
        NUMBER_PAIR
    }

    fn return_type(&self) -> ValueType {
        ValueType::Number
    }

    fn evaluate(&self, _: &DataContext, args: &[TypedValue]) -> Result<TypedValue, NoCodeError> {
        let args = ArgumentReader::new(self, args)?;
        let result = (self.apply)(args.number(0)?, args.number(1)?)
            .map_err(|message| args.failure(message))?;
        if !result.is_finite() {
            return Err(args.failure("result is not a finite number"));
        }
        Ok(TypedValue::number(result))
    }
}

struct RoundOperator;

impl Operator for RoundOperator {
    fn name(&self) -> &'static str {
        "round"
    }

    fn label(&self) -> &'static str {
        "Round"
    }

    fn description(&self) -> &'static str {
        "Rounds half away from zero to the given number of decimals (0-10)."
    }

    fn parameters(&self) -> &'static [Parameter] {
        const PARAMETERS: &[Parameter] = &[
            Parameter::new("value", ValueType::Number),
            Parameter::new("decimals", ValueType::Number),
        ];
        PARAMETERS
    }

    fn return_type(&self) -> ValueType {
        ValueType::Number
    }

    fn evaluate(&self, _: &DataContext, args: &[TypedValue]) -> Result<TypedValue, NoCodeError> {
        let args = ArgumentReader::new(self, args)?;
        let value = args.number(0)?;
        let decimals = args.number(1)?;
        if decimals.fract() != 0.0 || !(0.0..=10.0).contains(&decimals) {
            return Err(args.failure("decimals must be a whole number between 0 and 10"));
        }
        let factor = 10f64.powi(decimals as i32);
        let result = (value * factor).round() / factor;
        if !result.is_finite() {
            return Err(args.failure("result is not a finite number"));
        }
        Ok(TypedValue::number(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn call(name: &str, args: Vec<Value>) -> Result<Value, NoCodeError> {
        let operator = MathOperators
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
    fn arithmetic() {
        assert_eq!(call("add", vec![json!(2), json!(3)]).unwrap(), json!(5));
        assert_eq!(call("subtract", vec![json!(2), json!(3.5)]).unwrap(), json!(-1.5));
        assert_eq!(call("multiply", vec![json!(4), json!(2.5)]).unwrap(), json!(10));
        assert_eq!(call("divide", vec![json!(9), json!(3)]).unwrap(), json!(3));
    }

    #[test]
    fn division_by_zero_fails() {
        let err = call("divide", vec![json!(1), json!(0)]).unwrap_err();
        assert_eq!(
            err,
            NoCodeError::Evaluation {
                operator: "divide".into(),
                message: "division by zero".into(),
            }
        );
    }

    #[test]
    fn round_to_decimals() {
        assert_eq!(call("round", vec![json!(2.345), json!(1)]).unwrap(), json!(2.3));
        assert_eq!(call("round", vec![json!(2.5), json!(0)]).unwrap(), json!(3));
        assert!(call("round", vec![json!(2.5), json!(0.5)]).is_err());
    }

    #[test]
    fn round_rejects_overflow() {
        let err = call("round", vec![json!(1e300), json!(10)]).unwrap_err();
        assert!(
            matches!(err, NoCodeError::Evaluation { ref message, .. } if message == "result is not a finite number")
        );
    }
}
