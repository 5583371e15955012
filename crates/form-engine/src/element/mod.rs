//! Typed form-definition tree.
//!
//! Elements are built once from a stored definition (see [`Element::from_value`])
//! and are read-only afterwards; derivation writes into its own state maps and
//! never touches the tree.

mod parse;
mod walk;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::expression::Expression;

/// Attributes shared by every element variant.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ElementMeta {
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Expression>,
    /// Yields a replacement element definition when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<Expression>,
}

/// A node of the form tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Element {
    Root(RootElement),
    Step(ContainerElement),
    Group(ContainerElement),
    Repeating(RepeatingElement),
    Field(FieldElement),
    Content(ContentElement),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RootElement {
    #[serde(flatten)]
    pub meta: ElementMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introduction: Option<Box<Element>>,
    pub children: Vec<Element>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Box<Element>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submit: Option<Box<Element>>,
}

/// Steps and groups: plain containers.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ContainerElement {
    #[serde(flatten)]
    pub meta: ElementMeta,
    pub children: Vec<Element>,
}

/// Container whose children are instantiated once per repetition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepeatingElement {
    #[serde(flatten)]
    pub meta: ElementMeta,
    pub children: Vec<Element>,
    pub min_repetitions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_repetitions: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldElement {
    #[serde(flatten)]
    pub meta: ElementMeta,
    pub field_type: FieldType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<Constraint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<Expression>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compute_value: Option<Expression>,
}

/// Static text or markup; never carries a value.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ContentElement {
    #[serde(flatten)]
    pub meta: ElementMeta,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Text,
    Textarea,
    Number,
    Checkbox,
    Date,
    Select,
    Email,
    Other,
}

impl FieldType {
    pub fn parse(raw: &str) -> Option<FieldType> {
        match raw.to_ascii_lowercase().as_str() {
            "text" | "string" => Some(FieldType::Text),
            "textarea" => Some(FieldType::Textarea),
            "number" | "integer" => Some(FieldType::Number),
            "checkbox" | "boolean" => Some(FieldType::Checkbox),
            "date" => Some(FieldType::Date),
            "select" | "radio" | "enum" => Some(FieldType::Select),
            "email" => Some(FieldType::Email),
            "other" => Some(FieldType::Other),
            _ => None,
        }
    }
}

/// Built-in value constraints checked before a field's validation expression.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Constraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_len: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Variant tag without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Root,
    Step,
    Group,
    Repeating,
    Field,
    Content,
}

impl Element {
    pub fn meta(&self) -> &ElementMeta {
        match self {
            Element::Root(root) => &root.meta,
            Element::Step(container) | Element::Group(container) => &container.meta,
            Element::Repeating(repeating) => &repeating.meta,
            Element::Field(field) => &field.meta,
            Element::Content(content) => &content.meta,
        }
    }

    pub fn id(&self) -> &str {
        &self.meta().id
    }

    pub fn label(&self) -> &str {
        &self.meta().label
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            Element::Root(_) => ElementKind::Root,
            Element::Step(_) => ElementKind::Step,
            Element::Group(_) => ElementKind::Group,
            Element::Repeating(_) => ElementKind::Repeating,
            Element::Field(_) => ElementKind::Field,
            Element::Content(_) => ElementKind::Content,
        }
    }

    pub fn as_field(&self) -> Option<&FieldElement> {
        match self {
            Element::Field(field) => Some(field),
            _ => None,
        }
    }

    /// Structural children in walk order. For the root this is the
    /// introduction step, the regular steps, then summary and submit.
    pub fn children(&self) -> Vec<&Element> {
        match self {
            Element::Root(root) => root
                .introduction
                .as_deref()
                .into_iter()
                .chain(root.children.iter())
                .chain(root.summary.as_deref())
                .chain(root.submit.as_deref())
                .collect(),
            Element::Step(container) | Element::Group(container) => {
                container.children.iter().collect()
            }
            Element::Repeating(repeating) => repeating.children.iter().collect(),
            Element::Field(_) | Element::Content(_) => Vec::new(),
        }
    }
}

impl<'de> Deserialize<'de> for Element {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Element::from_value(&value))
    }
}
