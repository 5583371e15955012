#![allow(missing_docs)]

pub mod config;
pub mod derive;
pub mod element;
pub mod error;
pub mod expression;
pub mod nocode;
pub mod render;
pub mod script;
pub mod validate;
pub mod value;

pub use config::{EngineConfig, FailurePolicy, RepetitionConfig, ScriptLimits, SecretsPolicy};
pub use derive::{DerivationFailure, FormEngine, FormState};
pub use element::{
    Constraint, ContainerElement, ContentElement, Element, ElementKind, ElementMeta, FieldElement,
    FieldType, RepeatingElement, RootElement,
};
pub use error::{DerivationError, DerivationStep, ExpressionError, RegistryError};
pub use expression::{Expression, NoCodeExpression, Operand, ScriptExpression};
pub use nocode::service::scoped_key;
pub use nocode::{NoCodeError, NoCodeService, Operator, OperatorProvider, OperatorRegistry};
pub use render::{SummaryRow, SummaryStatus, render_json, render_text, summary_rows};
pub use script::providers::{SecretsProvider, TextProvider};
pub use script::{
    HostFunction, HostFunctionProvider, ProviderRegistry, ScriptEngine, ScriptError, ScriptValue,
};
pub use value::{DataContext, TypedValue, ValueType, number_value};
