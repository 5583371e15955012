use serde_json::{Map, Value, json};
use tracing::{trace, warn};

use super::state::{DerivationFailure, FormState};
use crate::config::{EngineConfig, FailurePolicy};
use crate::element::{Element, FieldElement, RepeatingElement};
use crate::error::{DerivationError, DerivationStep, ExpressionError};
use crate::expression::Expression;
use crate::nocode::service::scoped_key;
use crate::nocode::{NoCodeError, NoCodeService};
use crate::script::{ScriptEngine, ScriptError};
use crate::validate::{FieldViolation, check_field, interpret_validation_result};
use crate::value::{DataContext, truthiness};

/// Where in the instantiated tree an element is being evaluated.
struct Site<'k> {
    id: &'k str,
    key: &'k str,
    prefix: Option<&'k str>,
}

/// Mutable state of one derivation request.
pub(crate) struct DerivationContext<'a> {
    nocode: &'a NoCodeService,
    scripts: &'a mut ScriptEngine,
    config: &'a EngineConfig,
    state: FormState,
    /// `data` in the script engine lags behind `state.values`.
    data_stale: bool,
}

impl<'a> DerivationContext<'a> {
    pub(crate) fn new(
        nocode: &'a NoCodeService,
        scripts: &'a mut ScriptEngine,
        config: &'a EngineConfig,
        inputs: &DataContext,
    ) -> Self {
        Self {
            nocode,
            scripts,
            config,
            state: FormState {
                values: inputs.clone(),
                ..FormState::default()
            },
            data_stale: true,
        }
    }

    pub(crate) fn run(mut self, tree: &Element) -> Result<FormState, DerivationError> {
        self.visit(tree, None)?;
        Ok(self.state)
    }

    /// Patch, visibility, compute and validate one element, then recurse.
    fn visit(&mut self, element: &Element, prefix: Option<&str>) -> Result<(), DerivationError> {
        let key = scoped_key(prefix, element.id());
        let site = Site {
            id: element.id(),
            key: &key,
            prefix,
        };

        let patched = self.patch(element, &site)?;
        let effective = patched.as_ref().unwrap_or(element);

        let visible = self.visibility(effective, &site)?;
        self.state.visibilities.insert(key.clone(), visible);
        if !visible {
            trace!(%key, "hidden; subtree skipped");
            self.hide_children(element, &key, prefix);
            return Ok(());
        }

        if let Element::Field(field) = effective {
            self.compute(field, &site)?;
            self.validate(field, &site);
        }

        // Children always come from the stored tree.
        self.visit_children(element, &key, prefix)
    }

    fn visit_children(
        &mut self,
        element: &Element,
        key: &str,
        prefix: Option<&str>,
    ) -> Result<(), DerivationError> {
        if let Element::Repeating(repeating) = element {
            let count = self.repetitions(repeating, key);
            self.expand_rows(key, count);
            self.state.repetitions.insert(key.to_string(), count);
            for index in 0..count {
                let row_prefix = format!("{key}_{index}");
                for child in &repeating.children {
                    self.visit(child, Some(&row_prefix))?;
                }
            }
            return Ok(());
        }
        for child in element.children() {
            self.visit(child, prefix)?;
        }
        Ok(())
    }

    fn hide_children(&mut self, element: &Element, key: &str, prefix: Option<&str>) {
        if let Element::Repeating(repeating) = element {
            for index in 0..self.repetitions(repeating, key) {
                let row_prefix = format!("{key}_{index}");
                for child in &repeating.children {
                    self.hide(child, Some(&row_prefix));
                }
            }
            return;
        }
        for child in element.children() {
            self.hide(child, prefix);
        }
    }

    fn hide(&mut self, element: &Element, prefix: Option<&str>) {
        let key = scoped_key(prefix, element.id());
        self.state.visibilities.insert(key.clone(), false);
        self.hide_children(element, &key, prefix);
    }

    fn patch(&mut self, element: &Element, site: &Site) -> Result<Option<Element>, DerivationError> {
        let Some(expression) = &element.meta().patch else {
            return Ok(None);
        };
        let outcome = self.evaluate(expression, site);
        let result = self.settle(site, DerivationStep::Patch, outcome, || Value::Null)?;

        let overlay = match result {
            Value::Null => return Ok(None),
            Value::Object(overlay) => overlay,
            other => {
                warn!(key = site.key, result = %other, "patch result is not an element definition; ignored");
                return Ok(None);
            }
        };

        // Attributes the patch leaves out are inherited from the stored element.
        let mut definition = match serde_json::to_value(element) {
            Ok(Value::Object(definition)) => definition,
            _ => Map::new(),
        };
        definition.extend(overlay);
        definition
            .entry("id")
            .or_insert_with(|| Value::String(site.id.to_string()));

        let replacement = Element::from_value(&Value::Object(definition));
        trace!(key = site.key, "element overridden");
        self.state
            .overrides
            .insert(site.key.to_string(), replacement.clone());
        Ok(Some(replacement))
    }

    fn visibility(&mut self, element: &Element, site: &Site) -> Result<bool, DerivationError> {
        let Some(expression) = &element.meta().visibility else {
            return Ok(true);
        };
        let outcome = self
            .evaluate(expression, site)
            .map(|value| truthiness(&value).unwrap_or(true));
        self.settle(site, DerivationStep::Visibility, outcome, || false)
    }

    fn compute(&mut self, field: &FieldElement, site: &Site) -> Result<(), DerivationError> {
        let Some(expression) = &field.compute_value else {
            return Ok(());
        };
        let outcome = self.evaluate(expression, site).map(Some);
        if let Some(value) = self.settle(site, DerivationStep::Compute, outcome, || None)? {
            trace!(key = site.key, ?value, "value computed");
            self.state.values.insert(site.key.to_string(), value);
            self.data_stale = true;
        }
        Ok(())
    }

    /// Validation never aborts: every outcome lands in `errors`.
    fn validate(&mut self, field: &FieldElement, site: &Site) {
        let mut violation = check_field(field, self.state.values.get(site.key));

        if violation.is_none()
            && let Some(expression) = &field.validation
        {
            violation = match self.evaluate(expression, site) {
                Ok(result) => interpret_validation_result(field, &result),
                Err(err) => {
                    warn!(key = site.key, error = %err, "validation expression failed");
                    self.record_failure(site, DerivationStep::Validate, &err);
                    Some(FieldViolation::new(
                        "validation_failed",
                        format!("validation could not be evaluated: {err}"),
                    ))
                }
            };
        }

        if let Some(violation) = violation {
            trace!(key = site.key, code = violation.code, "field invalid");
            self.state
                .errors
                .insert(site.key.to_string(), violation.message);
        }
    }

    fn evaluate(&mut self, expression: &Expression, site: &Site) -> Result<Value, ExpressionError> {
        match expression {
            Expression::NoCode(expression) => Ok(self
                .nocode
                .evaluate(expression, &self.state.values, site.prefix)?
                .into_value()),
            Expression::Script(script) => {
                self.publish_globals(site)?;
                Ok(self.scripts.evaluate_code(script)?.into_value())
            }
            Expression::Malformed { reason, .. } => {
                Err(NoCodeError::MalformedExpression(reason.clone()).into())
            }
        }
    }

    /// Refreshes `data`, `row` and `element` for the next script.
    fn publish_globals(&mut self, site: &Site) -> Result<(), ScriptError> {
        if self.data_stale {
            self.scripts
                .register_global_object("data", &Value::Object(self.state.values.clone()))?;
            self.data_stale = false;
        }
        self.scripts
            .register_global_object("row", &Value::Object(self.row(site.prefix)))?;
        self.scripts.register_global_object(
            "element",
            &json!({ "id": site.id, "key": site.key, "prefix": site.prefix }),
        )
    }

    /// Values of the current repetition with the prefix stripped.
    fn row(&self, prefix: Option<&str>) -> DataContext {
        let Some(prefix) = prefix else {
            return DataContext::new();
        };
        let lead = format!("{prefix}_");
        self.state
            .values
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(&lead)
                    .map(|local| (local.to_string(), value.clone()))
            })
            .collect()
    }

    fn repetitions(&self, repeating: &RepeatingElement, key: &str) -> usize {
        let policy = &self.config.repetition;
        let requested = match self.state.values.get(key) {
            Some(Value::Array(rows)) => rows.len(),
            Some(value) => value
                .as_u64()
                .and_then(|count| usize::try_from(count).ok())
                .unwrap_or(policy.default_repetitions),
            None => policy.default_repetitions,
        };
        let max = repeating.max_repetitions.unwrap_or(policy.max_repetitions);
        requested.max(repeating.min_repetitions).min(max)
    }

    /// Flattens `key: [{..}, ..]` inputs into `key_<i>_<field>` entries.
    /// Explicit flat inputs win.
    fn expand_rows(&mut self, key: &str, count: usize) {
        let Some(Value::Array(rows)) = self.state.values.get(key) else {
            return;
        };
        let flattened: Vec<(String, Value)> = rows
            .iter()
            .take(count)
            .enumerate()
            .filter_map(|(index, row)| row.as_object().map(|row| (index, row)))
            .flat_map(|(index, row)| {
                row.iter()
                    .map(move |(field, value)| (format!("{key}_{index}_{field}"), value.clone()))
            })
            .collect();
        for (flat_key, value) in flattened {
            if !self.state.values.contains_key(&flat_key) {
                self.state.values.insert(flat_key, value);
                self.data_stale = true;
            }
        }
    }

    fn settle<T>(
        &mut self,
        site: &Site,
        step: DerivationStep,
        outcome: Result<T, ExpressionError>,
        fallback: impl FnOnce() -> T,
    ) -> Result<T, DerivationError> {
        match outcome {
            Ok(value) => Ok(value),
            Err(source) => match self.config.failure_policy {
                FailurePolicy::Abort => Err(DerivationError {
                    key: site.key.to_string(),
                    step,
                    source,
                }),
                FailurePolicy::Degrade => {
                    warn!(key = site.key, %step, error = %source, "expression failed; degrading");
                    self.record_failure(site, step, &source);
                    Ok(fallback())
                }
            },
        }
    }

    fn record_failure(&mut self, site: &Site, step: DerivationStep, error: &ExpressionError) {
        self.state.failures.push(DerivationFailure {
            key: site.key.to_string(),
            step: step.as_str().to_string(),
            message: error.to_string(),
        });
    }
}
