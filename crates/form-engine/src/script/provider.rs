use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::error::RegistryError;

/// Per-call information handed to host functions.
#[derive(Debug, Clone, Copy)]
pub struct HostCallContext {
    /// Wall-clock bound the call is expected to honour.
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    #[error("{0}")]
    Failed(String),
    #[error("access to '{0}' is denied")]
    Denied(String),
    #[error("timed out")]
    Timeout,
}

/// Largest number of arguments a host function may declare.
pub const MAX_HOST_ARITY: usize = 4;

type HostHandler = dyn Fn(&HostCallContext, &[Value]) -> Result<Value, HostError> + Send + Sync;

/// A native function explicitly exported to scripts.
#[derive(Clone)]
pub struct HostFunction {
    pub name: &'static str,
    pub arity: usize,
    handler: Arc<HostHandler>,
}

impl HostFunction {
    pub fn new<F>(name: &'static str, arity: usize, handler: F) -> Self
    where
        F: Fn(&HostCallContext, &[Value]) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        Self {
            name,
            arity,
            handler: Arc::new(handler),
        }
    }

    pub fn call(&self, context: &HostCallContext, args: &[Value]) -> Result<Value, HostError> {
        (self.handler)(context, args)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// A capability offered to scripts as one global module.
///
/// Only the functions returned by [`exports`](Self::exports) are reachable from
/// script code; nothing else about the provider is visible.
pub trait HostFunctionProvider: Send + Sync {
    /// Package identifier, e.g. `forms.secrets`. See [`global_name`].
    fn package(&self) -> &str;

    fn exports(&self) -> Vec<HostFunction>;

    /// Called exactly once when a script engine that registered this provider
    /// is disposed.
    fn release(&self) {}
}

/// Script-visible module name for a provider package: every character that is
/// not ASCII alphanumeric becomes `_`, and a leading digit is prefixed with `_`.
pub fn global_name(package: &str) -> String {
    let mut name: String = package
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// Ordered, immutable list of host providers built at startup.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn HostFunctionProvider>>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<Arc<dyn HostFunctionProvider>>) -> Result<Self, RegistryError> {
        let mut names = BTreeSet::new();
        for provider in &providers {
            if provider.package().is_empty() {
                return Err(RegistryError::InvalidPackage(String::new()));
            }
            let name = global_name(provider.package());
            if !names.insert(name.clone()) {
                return Err(RegistryError::DuplicateProvider(name));
            }
            let mut functions = BTreeSet::new();
            for function in provider.exports() {
                if function.arity > MAX_HOST_ARITY {
                    return Err(RegistryError::UnsupportedArity {
                        provider: name.clone(),
                        function: function.name.to_string(),
                        arity: function.arity,
                        max: MAX_HOST_ARITY,
                    });
                }
                if !functions.insert(function.name) {
                    return Err(RegistryError::DuplicateHostFunction {
                        provider: name.clone(),
                        function: function.name.to_string(),
                    });
                }
            }
        }
        Ok(Self { providers })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn providers(&self) -> &[Arc<dyn HostFunctionProvider>] {
        &self.providers
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|provider| provider.package()))
            .finish()
    }
}
