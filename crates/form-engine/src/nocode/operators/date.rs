use std::sync::Arc;

use chrono::Datelike;

use crate::nocode::NoCodeError;
use crate::nocode::operator::{ArgumentReader, Operator, OperatorProvider, Parameter};
use crate::value::{DataContext, TypedValue, ValueType};

const DATE_PAIR: &[Parameter] = &[
    Parameter::new("date", ValueType::Date),
    Parameter::new("other", ValueType::Date),
];

/// `date.*`: comparisons over ISO-8601 calendar dates.
pub struct DateOperators;

impl OperatorProvider for DateOperators {
    fn package(&self) -> &'static str {
        "date"
    }

    fn operators(&self) -> Vec<Arc<dyn Operator>> {
        vec![
            Arc::new(DateOrderOperator { after: false }),
            Arc::new(DateOrderOperator { after: true }),
            Arc::new(YearsBetweenOperator),
        ]
    }
}

struct DateOrderOperator {
    after: bool,
}

impl Operator for DateOrderOperator {
    fn name(&self) -> &'static str {
        if self.after { "after" } else { "before" }
    }

    fn label(&self) -> &'static str {
        if self.after { "Is after" } else { "Is before" }
    }

    fn description(&self) -> &'static str {
        "Strict calendar comparison of two dates."
    }

    fn parameters(&self) -> &'static [Parameter] {
        DATE_PAIR
    }

    fn return_type(&self) -> ValueType {
        ValueType::Boolean
    }

    fn evaluate(&self, _: &DataContext, args: &[TypedValue]) -> Result<TypedValue, NoCodeError> {
        let args = ArgumentReader::new(self, args)?;
        let (date, other) = (args.date(0)?, args.date(1)?);
        let result = if self.after { date > other } else { date < other };
        Ok(TypedValue::boolean(result))
    }
}

/// Full years from the first date to the second, e.g. an age.
struct YearsBetweenOperator;

impl Operator for YearsBetweenOperator {
    fn name(&self) -> &'static str {
        "years-between"
    }

    fn label(&self) -> &'static str {
        "Years between"
    }

    fn description(&self) -> &'static str {
        "Completed years from the first date to the second; negative when reversed."
    }

    fn parameters(&self) -> &'static [Parameter] {
        const PARAMETERS: &[Parameter] = &[
            Parameter::new("from", ValueType::Date),
            Parameter::new("to", ValueType::Date),
        ];
        PARAMETERS
    }

    fn return_type(&self) -> ValueType {
        ValueType::Number
    }

    fn evaluate(&self, _: &DataContext, args: &[TypedValue]) -> Result<TypedValue, NoCodeError> {
        let args = ArgumentReader::new(self, args)?;
        let (from, to) = (args.date(0)?, args.date(1)?);
        let (early, late, sign) = if from <= to {
            (from, to, 1)
        } else {
            (to, from, -1)
        };
        let mut years = late.year() - early.year();
        if (late.month(), late.day()) < (early.month(), early.day()) {
            years -= 1;
        }
        Ok(TypedValue::number(f64::from(years * sign)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn call(name: &str, args: Vec<Value>) -> Result<Value, NoCodeError> {
        let operator = DateOperators
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
    fn ordering() {
        let (a, b) = (json!("2020-01-31"), json!("2020-02-01"));
        assert_eq!(call("before", vec![a.clone(), b.clone()]).unwrap(), json!(true));
        assert_eq!(call("after", vec![a, b]).unwrap(), json!(false));
    }

    #[test]
    fn years_between_counts_completed_years() {
        assert_eq!(
            call("years-between", vec![json!("2000-06-15"), json!("2024-06-14")]).unwrap(),
            json!(23)
        );
        assert_eq!(
            call("years-between", vec![json!("2000-06-15"), json!("2024-06-15")]).unwrap(),
            json!(24)
        );
        assert_eq!(
            call("years-between", vec![json!("2024-06-15"), json!("2000-06-15")]).unwrap(),
            json!(-24)
        );
    }

    #[test]
    fn rejects_non_iso_dates() {
        let err = call("before", vec![json!("15.06.2000"), json!("2000-06-15")]).unwrap_err();
        assert!(matches!(err, NoCodeError::TypeMismatch { .. }));
    }
}
