//! Form derivation: one pre-order pass over the element tree producing a
//! [`FormState`].
//!
//! Per element the steps run in a fixed order: patch, visibility, then for
//! visible fields compute and validate, then the children. Elements are
//! evaluated in document order, so an expression sees computed values of
//! every element before it but none after it.

mod context;
mod state;

use std::sync::Arc;

use tracing::{info, instrument};

use crate::config::EngineConfig;
use crate::element::Element;
use crate::error::{DerivationError, DerivationStep};
use crate::nocode::{NoCodeService, OperatorRegistry};
use crate::script::{ProviderRegistry, ScriptEngine};
use crate::value::DataContext;
use context::DerivationContext;

pub use state::{DerivationFailure, FormState};

/// Shared, stateless entry point. Safe to use from many threads: each
/// derivation owns its own script engine and state.
#[derive(Debug, Clone)]
pub struct FormEngine {
    nocode: NoCodeService,
    providers: ProviderRegistry,
    config: EngineConfig,
}

impl FormEngine {
    pub fn new(
        registry: Arc<OperatorRegistry>,
        providers: ProviderRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            nocode: NoCodeService::new(registry),
            providers,
            config,
        }
    }

    /// Built-in operators, no host providers, default configuration.
    pub fn with_defaults() -> Self {
        Self::new(
            Arc::new(OperatorRegistry::with_defaults()),
            ProviderRegistry::empty(),
            EngineConfig::default(),
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &OperatorRegistry {
        self.nocode.registry()
    }

    pub fn derive(&self, tree: &Element, inputs: &DataContext) -> Result<FormState, DerivationError> {
        self.derive_with_globals(tree, inputs, &DataContext::new())
    }

    /// Like [`derive`](Self::derive), additionally exposing `globals` (for
    /// example form metadata under `form`) to scripts. `data`, `row` and
    /// `element` are set by the engine and shadow caller globals of the same
    /// name.
    #[instrument(skip_all, fields(form = %tree.id(), inputs = inputs.len()))]
    pub fn derive_with_globals(
        &self,
        tree: &Element,
        inputs: &DataContext,
        globals: &DataContext,
    ) -> Result<FormState, DerivationError> {
        let state = ScriptEngine::scoped(&self.providers, self.config.script.clone(), |scripts| {
            for (name, value) in globals {
                scripts
                    .register_global_object(name, value)
                    .map_err(|source| DerivationError {
                        key: tree.id().to_string(),
                        step: DerivationStep::Prepare,
                        source: source.into(),
                    })?;
            }
            DerivationContext::new(&self.nocode, scripts, &self.config, inputs).run(tree)
        })?;

        info!(
            elements = state.visibilities.len(),
            errors = state.errors.len(),
            overrides = state.overrides.len(),
            failures = state.failures.len(),
            "form derived"
        );
        Ok(state)
    }
}
