use std::sync::Arc;

use serde_json::json;

use form_engine::nocode::operators::default_providers;
use form_engine::nocode::{ArgumentReader, Parameter};
use form_engine::{
    DataContext, Element, EngineConfig, FormEngine, NoCodeError, NoCodeExpression, NoCodeService,
    Operand, Operator, OperatorProvider, OperatorRegistry, ProviderRegistry, RegistryError,
    TypedValue, ValueType, number_value,
};

struct TaxOperators;

struct RateOperator;

impl Operator for RateOperator {
    fn name(&self) -> &'static str {
        "rate"
    }

    fn label(&self) -> &'static str {
        "Tax rate"
    }

    fn description(&self) -> &'static str {
        "Flat tax rate for a yearly income."
    }

    fn parameters(&self) -> &'static [Parameter] {
        const PARAMETERS: &[Parameter] = &[Parameter::new("income", ValueType::Number)];
        PARAMETERS
    }

    fn return_type(&self) -> ValueType {
        ValueType::Number
    }

    fn evaluate(&self, _: &DataContext, args: &[TypedValue]) -> Result<TypedValue, NoCodeError> {
        let args = ArgumentReader::new(self, args)?;
        let income = args.number(0)?;
        let rate = if income > 50_000.0 { 0.42 } else { 0.25 };
        Ok(TypedValue::new(ValueType::Number, number_value(rate)))
    }
}

impl OperatorProvider for TaxOperators {
    fn package(&self) -> &'static str {
        "tax"
    }

    fn operators(&self) -> Vec<Arc<dyn Operator>> {
        vec![Arc::new(RateOperator)]
    }
}

fn registry_with_tax() -> Arc<OperatorRegistry> {
    let mut providers = default_providers();
    providers.push(Box::new(TaxOperators));
    Arc::new(OperatorRegistry::new(providers).unwrap())
}

#[test]
fn custom_packages_are_usable_in_forms() {
    let tree = Element::from_value(&json!({
        "id": "form",
        "type": "root",
        "children": [
            { "id": "income", "type": "number" },
            {
                "id": "rate", "type": "number",
                "compute_value": {
                    "kind": "no_code",
                    "operator": "tax.rate",
                    "operands": [{ "type": "reference", "id": "income" }]
                }
            }
        ]
    }));
    let engine = FormEngine::new(registry_with_tax(), ProviderRegistry::empty(), EngineConfig::default());
    let inputs = json!({ "income": 64_000 }).as_object().cloned().unwrap();
    let state = engine.derive(&tree, &inputs).unwrap();
    assert_eq!(state.value("rate"), Some(&json!(0.42)));
}

#[test]
fn registering_a_package_twice_fails() {
    let providers: Vec<Box<dyn OperatorProvider>> = vec![Box::new(TaxOperators), Box::new(TaxOperators)];
    assert_eq!(
        OperatorRegistry::new(providers).unwrap_err(),
        RegistryError::DuplicateOperator("tax.rate".into())
    );
}

#[test]
fn catalog_describes_every_operator() {
    let registry = registry_with_tax();
    let catalog = registry.catalog();
    assert_eq!(catalog.len(), registry.len());
    let rate = catalog
        .iter()
        .find(|entry| entry.identifier == "tax.rate")
        .expect("tax.rate");
    assert_eq!(rate.label, "Tax rate");
    assert_eq!(rate.parameters.len(), 1);
    assert_eq!(rate.return_type, ValueType::Number);
    assert!(catalog.iter().any(|entry| entry.identifier == "logic.and"));
}

#[test]
fn nested_expressions_resolve_inside_repetitions() {
    let service = NoCodeService::new(Arc::new(OperatorRegistry::with_defaults()));
    // not(and(text_123, text_456)) within the second repetition of `jobs`.
    let expression = NoCodeExpression::new(
        "logic.not",
        vec![Operand::nested(NoCodeExpression::new(
            "logic.and",
            vec![Operand::reference("text_123"), Operand::reference("text_456")],
        ))],
    );
    let context = json!({
        "jobs_1_text_123": true,
        "jobs_1_text_456": false,
        "text_123": false
    })
    .as_object()
    .cloned()
    .unwrap();
    let result = service.evaluate(&expression, &context, Some("jobs_1")).unwrap();
    assert_eq!(result.into_value(), json!(true));
}

#[test]
fn stored_expressions_round_trip_through_definitions() {
    let stored = json!({
        "operator": "compare.equals",
        "operands": [
            { "type": "reference", "id": "country" },
            { "type": "static", "value": "DE" }
        ]
    });
    let expression: form_engine::Expression = serde_json::from_value(stored).unwrap();
    let service = NoCodeService::new(Arc::new(OperatorRegistry::with_defaults()));
    let form_engine::Expression::NoCode(expression) = expression else {
        panic!("expected a NoCode expression");
    };
    let context = json!({ "country": "DE" }).as_object().cloned().unwrap();
    assert_eq!(
        service.evaluate(&expression, &context, None).unwrap().into_value(),
        json!(true)
    );
}
