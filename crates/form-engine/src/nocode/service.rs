use std::sync::Arc;

use tracing::{instrument, trace};

use super::NoCodeError;
use super::registry::OperatorRegistry;
use crate::expression::{NoCodeExpression, Operand};
use crate::value::{DataContext, TypedValue};

/// Evaluates NoCode expression trees against a data context.
#[derive(Debug, Clone)]
pub struct NoCodeService {
    registry: Arc<OperatorRegistry>,
}

impl NoCodeService {
    pub fn new(registry: Arc<OperatorRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &OperatorRegistry {
        &self.registry
    }

    /// Evaluates `expression`, resolving references as `<id_prefix>_<id>` when a
    /// prefix is given.
    ///
    /// Operands are resolved left to right, all of them; short-circuiting is an
    /// operator concern. The result is tagged with the operator's declared
    /// return type.
    #[instrument(level = "trace", skip_all, fields(operator = %expression.operator))]
    pub fn evaluate(
        &self,
        expression: &NoCodeExpression,
        context: &DataContext,
        id_prefix: Option<&str>,
    ) -> Result<TypedValue, NoCodeError> {
        let operator = self
            .registry
            .get(&expression.operator)
            .ok_or_else(|| NoCodeError::UnknownOperator(expression.operator.clone()))?;

        let args = expression
            .operands
            .iter()
            .map(|operand| self.resolve(operand, context, id_prefix))
            .collect::<Result<Vec<_>, _>>()?;

        let result = operator
            .evaluate(context, &args)
            .map_err(|err| err.scoped_to(&expression.operator))?;
        trace!(?result, "operator evaluated");
        Ok(TypedValue::new(operator.return_type(), result.into_value()))
    }

    fn resolve(
        &self,
        operand: &Operand,
        context: &DataContext,
        id_prefix: Option<&str>,
    ) -> Result<TypedValue, NoCodeError> {
        match operand {
            Operand::Static { value } => Ok(TypedValue::infer(value.clone())),
            Operand::Reference { id } => {
                let key = scoped_key(id_prefix, id);
                // Unresolved references are legal: the field may be hidden or unanswered.
                Ok(context
                    .get(&key)
                    .cloned()
                    .map(TypedValue::infer)
                    .unwrap_or_else(TypedValue::null))
            }
            Operand::Expression { expression } => self.evaluate(expression, context, id_prefix),
        }
    }
}

/// Key of `id` inside the repetition identified by `id_prefix`.
pub fn scoped_key(id_prefix: Option<&str>, id: &str) -> String {
    match id_prefix {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}_{id}"),
        _ => id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueType;
    use serde_json::{Value, json};

    fn service() -> NoCodeService {
        NoCodeService::new(Arc::new(OperatorRegistry::with_defaults()))
    }

    fn context(value: Value) -> DataContext {
        value.as_object().cloned().unwrap_or_default()
    }

    fn and(left: Operand, right: Operand) -> NoCodeExpression {
        NoCodeExpression::new("logic.and", vec![left, right])
    }

    #[test]
    fn and_of_same_reference() {
        let expr = and(Operand::reference("a"), Operand::reference("a"));
        let result = service()
            .evaluate(&expr, &context(json!({ "a": true })), None)
            .unwrap();
        assert_eq!(result, TypedValue::boolean(true));
    }

    #[test]
    fn and_of_two_references() {
        let expr = and(Operand::reference("a"), Operand::reference("b"));
        let result = service()
            .evaluate(&expr, &context(json!({ "a": true, "b": false })), None)
            .unwrap();
        assert_eq!(result.value, json!(false));
        assert_eq!(result.value_type, ValueType::Boolean);
    }

    #[test]
    fn missing_reference_resolves_to_null() {
        let expr = NoCodeExpression::new("compare.is-null", vec![Operand::reference("absent")]);
        let result = service().evaluate(&expr, &DataContext::new(), None).unwrap();
        assert_eq!(result.value, json!(true));
    }

    #[test]
    fn prefix_scopes_references() {
        let expr = NoCodeExpression::new(
            "compare.equals",
            vec![Operand::reference("field_x"), Operand::value(2)],
        );
        let ctx = context(json!({ "rep_0_field_x": 1, "rep_1_field_x": 2, "field_x": 2 }));
        let svc = service();
        assert_eq!(svc.evaluate(&expr, &ctx, Some("rep_0")).unwrap().value, json!(false));
        assert_eq!(svc.evaluate(&expr, &ctx, Some("rep_1")).unwrap().value, json!(true));
        assert_eq!(svc.evaluate(&expr, &ctx, None).unwrap().value, json!(true));
    }

    #[test]
    fn unknown_operator_is_a_definition_error() {
        let expr = NoCodeExpression::new("nope.missing", vec![]);
        let err = service().evaluate(&expr, &DataContext::new(), None).unwrap_err();
        assert_eq!(err, NoCodeError::UnknownOperator("nope.missing".into()));
        assert!(err.is_definition_error());
    }

    #[test]
    fn wrong_arity_is_reported() {
        let expr = NoCodeExpression::new("logic.and", vec![Operand::value(true)]);
        let err = service().evaluate(&expr, &DataContext::new(), None).unwrap_err();
        assert_eq!(
            err,
            NoCodeError::WrongArgumentCount {
                operator: "logic.and".into(),
                expected: 2,
                actual: 1,
            }
        );
    }

    #[test]
    fn operator_errors_name_the_package() {
        let text = NoCodeExpression::new("text.contains", vec![Operand::value("abc")]);
        let list = NoCodeExpression::new("list.contains", vec![Operand::value("abc")]);
        let text_err = service().evaluate(&text, &DataContext::new(), None).unwrap_err();
        let list_err = service().evaluate(&list, &DataContext::new(), None).unwrap_err();
        assert!(text_err.to_string().starts_with("operator 'text.contains'"));
        assert!(list_err.to_string().starts_with("operator 'list.contains'"));
    }

    #[test]
    fn nested_expressions_recurse() {
        let expr = NoCodeExpression::new(
            "logic.not",
            vec![Operand::nested(and(
                Operand::value(true),
                Operand::reference("flag"),
            ))],
        );
        let svc = service();
        let ctx = context(json!({ "flag": false }));
        let first = svc.evaluate(&expr, &ctx, None).unwrap();
        let second = svc.evaluate(&expr, &ctx, None).unwrap();
        assert_eq!(first, TypedValue::boolean(true));
        assert_eq!(first, second);
    }
}
