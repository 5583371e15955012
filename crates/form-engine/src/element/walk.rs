use std::collections::{BTreeMap, BTreeSet};

use super::Element;
use crate::expression::Expression;

impl Element {
    /// Applies `action` to every node exactly once, parent before children.
    pub fn for_each<F>(&self, action: &mut F)
    where
        F: FnMut(&Element),
    {
        self.for_each_with_depth(0, &mut |element, _| action(element));
    }

    /// Pre-order walk that also reports the nesting depth (root = 0).
    pub fn for_each_with_depth<F>(&self, depth: usize, action: &mut F)
    where
        F: FnMut(&Element, usize),
    {
        action(self, depth);
        for child in self.children() {
            child.for_each_with_depth(depth + 1, action);
        }
    }

    pub fn find(&self, id: &str) -> Option<&Element> {
        if self.id() == id {
            return Some(self);
        }
        self.children().into_iter().find_map(|child| child.find(id))
    }

    /// IDs of every element in walk order.
    pub fn ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        self.for_each(&mut |element| ids.push(element.id().to_string()));
        ids
    }

    /// For each element carrying expressions, the element IDs those
    /// expressions reference. Diagnostic only.
    pub fn collect_references(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut references = BTreeMap::new();
        self.for_each(&mut |element| {
            let mut ids = BTreeSet::new();
            for expression in element.expressions() {
                ids.extend(expression.referenced_ids());
            }
            if !ids.is_empty() {
                references.insert(element.id().to_string(), ids);
            }
        });
        references
    }

    /// Expressions attached to this node, not to its children.
    pub fn expressions(&self) -> Vec<&Expression> {
        let meta = self.meta();
        let mut expressions: Vec<&Expression> =
            meta.visibility.iter().chain(meta.patch.iter()).collect();
        if let Element::Field(field) = self {
            expressions.extend(field.validation.iter());
            expressions.extend(field.compute_value.iter());
        }
        expressions
    }
}
