//! Built-in operator packages.

mod compare;
mod date;
mod list;
mod logic;
mod math;
mod text;

pub use compare::ComparisonOperators;
pub use date::DateOperators;
pub use list::ListOperators;
pub use logic::{AndOperator, LogicOperators, NotOperator, OrOperator};
pub use math::MathOperators;
pub use text::TextOperators;

use super::operator::OperatorProvider;

/// Statically assembled provider list used by
/// [`OperatorRegistry::with_defaults`](super::OperatorRegistry::with_defaults).
pub fn default_providers() -> Vec<Box<dyn OperatorProvider>> {
    vec![
        Box::new(LogicOperators),
        Box::new(ComparisonOperators),
        Box::new(MathOperators),
        Box::new(TextOperators),
        Box::new(ListOperators),
        Box::new(DateOperators),
    ]
}
