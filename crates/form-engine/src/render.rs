use serde_json::{Map, Value, json};

use crate::derive::FormState;
use crate::element::Element;
use crate::nocode::service::scoped_key;

/// Status labels returned by the renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryStatus {
    /// Every visible field passed validation.
    Valid,
    /// At least one visible field carries an error.
    Invalid,
}

impl SummaryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStatus::Valid => "valid",
            SummaryStatus::Invalid => "invalid",
        }
    }
}

/// One visible field of a derived form.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub key: String,
    /// Label after overrides.
    pub label: String,
    pub value: Option<Value>,
    pub error: Option<String>,
    /// Nesting below the root.
    pub depth: usize,
}

/// Visible fields in document order, repetitions expanded.
pub fn summary_rows(tree: &Element, state: &FormState) -> Vec<SummaryRow> {
    let mut rows = Vec::new();
    collect_rows(tree, None, 0, state, &mut rows);
    rows
}

fn collect_rows(
    element: &Element,
    prefix: Option<&str>,
    depth: usize,
    state: &FormState,
    rows: &mut Vec<SummaryRow>,
) {
    let key = scoped_key(prefix, element.id());
    if !state.is_visible(&key) {
        return;
    }
    let effective = state.override_for(&key).unwrap_or(element);

    if let Element::Field(_) = effective {
        rows.push(SummaryRow {
            label: effective.label().to_string(),
            value: state.value(&key).cloned(),
            error: state.error(&key).map(str::to_string),
            key,
            depth,
        });
        return;
    }

    if let Element::Repeating(repeating) = element {
        let count = state.repetitions.get(&key).copied().unwrap_or(0);
        for index in 0..count {
            let row_prefix = format!("{key}_{index}");
            for child in &repeating.children {
                collect_rows(child, Some(&row_prefix), depth + 1, state, rows);
            }
        }
        return;
    }

    for child in element.children() {
        collect_rows(child, prefix, depth + 1, state, rows);
    }
}

fn status(state: &FormState) -> SummaryStatus {
    if state.is_valid() {
        SummaryStatus::Valid
    } else {
        SummaryStatus::Invalid
    }
}

/// Render the summary as human-friendly text.
pub fn render_text(tree: &Element, state: &FormState) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Form: {} ({})", tree.label(), tree.id()));
    lines.push(format!(
        "Status: {} ({} error(s))",
        status(state).as_str(),
        state.errors.len()
    ));

    for row in summary_rows(tree, state) {
        let indent = "  ".repeat(row.depth.saturating_sub(1));
        let value = row.value.as_ref().map(display_value).unwrap_or_default();
        let label = if row.label.is_empty() {
            row.key.as_str()
        } else {
            row.label.as_str()
        };
        lines.push(format!("{indent}{label}: {value}"));
        if let Some(error) = &row.error {
            lines.push(format!("{indent}  ! {error}"));
        }
    }

    for failure in &state.failures {
        lines.push(format!(
            "Failure: {} of {}: {}",
            failure.step, failure.key, failure.message
        ));
    }

    lines.join("\n")
}

/// Render the summary as a structured JSON-friendly value.
pub fn render_json(tree: &Element, state: &FormState) -> Value {
    let rows = summary_rows(tree, state)
        .into_iter()
        .map(|row| {
            let mut map = Map::new();
            map.insert("key".into(), Value::String(row.key));
            map.insert("label".into(), Value::String(row.label));
            map.insert("depth".into(), Value::from(row.depth));
            map.insert("value".into(), row.value.unwrap_or(Value::Null));
            if let Some(error) = row.error {
                map.insert("error".into(), Value::String(error));
            }
            Value::Object(map)
        })
        .collect::<Vec<_>>();

    json!({
        "form_id": tree.id(),
        "form_label": tree.label(),
        "status": status(state).as_str(),
        "rows": rows,
        "errors": state.errors,
        "failures": state.failures,
    })
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}
