use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::operator::{Operator, OperatorDescriptor, OperatorProvider};
use super::operators;
use crate::error::RegistryError;

/// Immutable lookup table of operators keyed by `<package>.<name>`.
///
/// Built once at startup and shared read-only between derivations.
#[derive(Clone, Default)]
pub struct OperatorRegistry {
    operators: BTreeMap<String, Arc<dyn Operator>>,
}

impl OperatorRegistry {
    /// Registers the providers in order; any identifier clash is rejected.
    pub fn new<I>(providers: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = Box<dyn OperatorProvider>>,
    {
        let mut operators = BTreeMap::new();
        for provider in providers {
            let package = provider.package();
            if package.is_empty() {
                return Err(RegistryError::InvalidPackage(package.to_string()));
            }
            for operator in provider.operators() {
                let identifier = format!("{}.{}", package, operator.name());
                if operators.contains_key(&identifier) {
                    return Err(RegistryError::DuplicateOperator(identifier));
                }
                debug!(%identifier, "operator registered");
                operators.insert(identifier, operator);
            }
        }
        Ok(Self { operators })
    }

    /// The built-in `logic`, `compare`, `math`, `text`, `list` and `date`
    /// packages.
    ///
    /// # Panics
    ///
    /// Panics if two built-in operators share an identifier.
    pub fn with_defaults() -> Self {
        match Self::new(operators::default_providers()) {
            Ok(registry) => registry,
            Err(err) => panic!("built-in operator packages clash: {err}"),
        }
    }

    pub fn get(&self, identifier: &str) -> Option<&Arc<dyn Operator>> {
        self.operators.get(identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.operators.contains_key(identifier)
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.operators.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Descriptor dump for operator pickers, sorted by identifier.
    pub fn catalog(&self) -> Vec<OperatorDescriptor> {
        self.operators
            .iter()
            .map(|(identifier, operator)| OperatorDescriptor::describe(identifier, operator.as_ref()))
            .collect()
    }
}

impl std::fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorRegistry")
            .field("operators", &self.operators.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nocode::operators::LogicOperators;
    use crate::value::ValueType;

    #[test]
    fn defaults_are_package_scoped() {
        let registry = OperatorRegistry::with_defaults();
        assert!(registry.contains("logic.and"));
        assert!(registry.contains("logic.not"));
        assert!(registry.contains("compare.equals"));
        assert!(registry.contains("date.years-between"));
        assert!(!registry.contains("and"));
    }

    #[test]
    fn defaults_go_through_the_duplicate_check() {
        let checked = OperatorRegistry::new(operators::default_providers()).unwrap();
        let defaults = OperatorRegistry::with_defaults();
        assert_eq!(
            checked.identifiers().collect::<Vec<_>>(),
            defaults.identifiers().collect::<Vec<_>>()
        );
    }

    #[test]
    fn duplicate_packages_are_rejected() {
        let providers: Vec<Box<dyn OperatorProvider>> =
            vec![Box::new(LogicOperators), Box::new(LogicOperators)];
        let err = OperatorRegistry::new(providers).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateOperator(id) if id.starts_with("logic.")));
    }

    #[test]
    fn catalog_describes_signatures() {
        let registry = OperatorRegistry::with_defaults();
        let catalog = registry.catalog();
        assert_eq!(catalog.len(), registry.len());
        let not = catalog
            .iter()
            .find(|entry| entry.identifier == "logic.not")
            .expect("not operator");
        assert_eq!(not.return_type, ValueType::Boolean);
        assert_eq!(not.parameters.len(), 1);
        assert_eq!(not.parameters[0].value_type, ValueType::Boolean);
    }
}
