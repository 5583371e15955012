use thiserror::Error;

use crate::nocode::NoCodeError;
use crate::script::ScriptError;

/// Startup failures while assembling operator or host-provider registries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("operator '{0}' is registered twice")]
    DuplicateOperator(String),
    #[error("host provider '{0}' is registered twice")]
    DuplicateProvider(String),
    #[error("host provider '{provider}' exports '{function}' twice")]
    DuplicateHostFunction { provider: String, function: String },
    #[error("host function '{provider}::{function}' takes {arity} arguments, at most {max} are supported")]
    UnsupportedArity {
        provider: String,
        function: String,
        arity: usize,
        max: usize,
    },
    #[error("invalid provider package '{0}'")]
    InvalidPackage(String),
    #[error("invalid secrets policy: {0}")]
    SecretsPolicy(String),
}

/// Which step of the per-element state machine failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivationStep {
    /// Registering caller-supplied script globals.
    Prepare,
    Patch,
    Visibility,
    Compute,
    Validate,
}

impl DerivationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            DerivationStep::Prepare => "prepare",
            DerivationStep::Patch => "patch",
            DerivationStep::Visibility => "visibility",
            DerivationStep::Compute => "compute",
            DerivationStep::Validate => "validate",
        }
    }
}

impl std::fmt::Display for DerivationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend failure of a single expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error(transparent)]
    NoCode(#[from] NoCodeError),
    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// Fatal failure of a derivation; no partial state is returned.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{step} of '{key}' failed: {source}")]
pub struct DerivationError {
    /// Element key, including any repetition prefix.
    pub key: String,
    pub step: DerivationStep,
    #[source]
    pub source: ExpressionError,
}
