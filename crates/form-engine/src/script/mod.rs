//! Sandboxed script backend built on Rhai.
//!
//! Each [`ScriptEngine`] owns one isolated Rhai engine. Host capabilities are
//! reachable only through the functions a [`HostFunctionProvider`] exports,
//! each provider surfacing as one static module named after its package.

pub mod engine;
pub mod provider;
pub mod providers;
pub mod value;

use std::time::Duration;

use thiserror::Error;

pub use engine::ScriptEngine;
pub use provider::{
    HostCallContext, HostError, HostFunction, HostFunctionProvider, ProviderRegistry, global_name,
};
pub use value::ScriptValue;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("script failed to compile: {0}")]
    Compile(String),
    #[error("script failed: {0}")]
    Runtime(String),
    #[error("script exceeded its budget of {0} operations")]
    BudgetExhausted(u64),
    #[error("script exceeded its time budget of {0:?}")]
    Timeout(Duration),
    #[error("host function {provider}::{function} failed: {message}")]
    Host {
        provider: String,
        function: String,
        message: String,
    },
    #[error("host function {provider}::{function} exceeded {timeout:?}")]
    HostTimeout {
        provider: String,
        function: String,
        timeout: Duration,
    },
    #[error("'{0}' is not a valid global name")]
    InvalidGlobal(String),
    #[error("cannot convert script value: {0}")]
    Value(String),
    #[error("script result is not a {expected}: got {actual}")]
    Conversion {
        expected: &'static str,
        actual: String,
    },
}
