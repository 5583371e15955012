use serde_json::{Map, Value};
use tracing::warn;

use super::{
    Constraint, ContainerElement, ContentElement, Element, ElementMeta, FieldElement, FieldType,
    RepeatingElement, RootElement,
};
use crate::expression::Expression;

impl Element {
    /// Builds an element tree from a stored definition.
    ///
    /// Never fails: absent or mistyped attributes fall back to defaults (empty
    /// label, no expressions, `group` for a missing or unknown type) so that a
    /// partially broken definition still yields a renderable tree.
    pub fn from_value(value: &Value) -> Element {
        let empty = Map::new();
        let map = match value.as_object() {
            Some(map) => map,
            None => {
                warn!("element definition is not an object; using an empty group");
                &empty
            }
        };

        let meta = parse_meta(map);
        let raw_type = map.get("type").and_then(Value::as_str).unwrap_or("");

        match raw_type.to_ascii_lowercase().replace('-', "_").as_str() {
            "root" | "form" => Element::Root(RootElement {
                introduction: sub_step(map, "introduction"),
                children: parse_children(map),
                summary: sub_step(map, "summary"),
                submit: sub_step(map, "submit"),
                meta,
            }),
            "step" => Element::Step(ContainerElement {
                children: parse_children(map),
                meta,
            }),
            "repeating" | "repeating_container" | "replicating" | "replicating_container" => {
                Element::Repeating(RepeatingElement {
                    children: parse_children(map),
                    min_repetitions: usize_field(map, "min_repetitions").unwrap_or(0),
                    max_repetitions: usize_field(map, "max_repetitions"),
                    meta,
                })
            }
            "field" => Element::Field(parse_field(map, meta, None)),
            "content" | "text_content" | "headline" => Element::Content(ContentElement {
                content: string_field(map, "content"),
                meta,
            }),
            "group" => Element::Group(ContainerElement {
                children: parse_children(map),
                meta,
            }),
            other => {
                if let Some(field_type) = FieldType::parse(other) {
                    return Element::Field(parse_field(map, meta, Some(field_type)));
                }
                if !other.is_empty() {
                    warn!(id = %meta.id, element_type = other, "unknown element type; treating as group");
                }
                Element::Group(ContainerElement {
                    children: parse_children(map),
                    meta,
                })
            }
        }
    }
}

fn parse_meta(map: &Map<String, Value>) -> ElementMeta {
    let id = string_field(map, "id");
    if id.is_empty() {
        warn!("element without id in stored definition");
    }
    ElementMeta {
        id,
        label: string_field(map, "label"),
        weight: map.get("weight").and_then(Value::as_i64),
        visibility: expression_field(map, &["visibility", "visible_if"]),
        patch: expression_field(map, &["patch", "override"]),
    }
}

fn parse_field(
    map: &Map<String, Value>,
    meta: ElementMeta,
    field_type: Option<FieldType>,
) -> FieldElement {
    let field_type = field_type
        .or_else(|| {
            map.get("field_type")
                .and_then(Value::as_str)
                .and_then(FieldType::parse)
        })
        .unwrap_or_default();
    let constraint = map.get("constraint").and_then(|raw| {
        serde_json::from_value::<Constraint>(raw.clone())
            .map_err(|err| warn!(id = %meta.id, %err, "ignoring unreadable constraint"))
            .ok()
    });

    FieldElement {
        field_type,
        required: map.get("required").and_then(Value::as_bool).unwrap_or(false),
        constraint,
        validation: expression_field(map, &["validation"]),
        validation_message: map
            .get("validation_message")
            .and_then(Value::as_str)
            .map(str::to_string),
        compute_value: expression_field(map, &["compute_value", "computed"]),
        meta,
    }
}

fn parse_children(map: &Map<String, Value>) -> Vec<Element> {
    let mut children: Vec<Element> = match map.get("children") {
        Some(Value::Array(items)) => items.iter().map(Element::from_value).collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            warn!("children must be an array; ignoring");
            Vec::new()
        }
    };
    // Stable: unweighted siblings keep their stored order.
    children.sort_by_key(|child| child.meta().weight.unwrap_or(0));
    children
}

fn sub_step(map: &Map<String, Value>, key: &str) -> Option<Box<Element>> {
    map.get(key)
        .filter(|value| value.is_object())
        .map(|value| {
            let mut step = Element::from_value(value);
            if let Element::Group(container) = step {
                // Fixed root sub-steps are steps even when untyped.
                step = Element::Step(container);
            }
            Box::new(step)
        })
}

fn expression_field(map: &Map<String, Value>, keys: &[&str]) -> Option<Expression> {
    keys.iter()
        .find_map(|key| map.get(*key))
        .filter(|value| !value.is_null())
        .map(Expression::from_value)
}

fn string_field(map: &Map<String, Value>, key: &str) -> String {
    match map.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        _ => String::new(),
    }
}

fn usize_field(map: &Map<String, Value>, key: &str) -> Option<usize> {
    map.get(key)
        .and_then(Value::as_u64)
        .and_then(|value| usize::try_from(value).ok())
}
