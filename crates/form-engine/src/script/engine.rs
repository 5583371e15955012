use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use rhai::module_resolvers::DummyModuleResolver;
use rhai::packages::{Package, StandardPackage};
use rhai::{AST, Dynamic, Engine, EvalAltResult, FuncRegistration, Module, Scope};
use serde_json::Value;
use tracing::{debug, instrument, trace, warn};

use super::provider::{HostCallContext, HostError, HostFunctionProvider, ProviderRegistry, global_name};
use super::value::ScriptValue;
use super::ScriptError;
use crate::config::ScriptLimits;
use crate::expression::ScriptExpression;

/// One isolated script execution context.
///
/// Globals registered through [`register_global_object`](Self::register_global_object)
/// are pushed as constants into a fresh scope for every evaluation, so scripts
/// can read them but never write back. Dropping the engine releases every
/// registered provider exactly once.
pub struct ScriptEngine {
    engine: Engine,
    limits: ScriptLimits,
    globals: BTreeMap<String, Dynamic>,
    providers: Vec<Arc<dyn HostFunctionProvider>>,
    compiled: RefCell<HashMap<String, Rc<AST>>>,
    deadline: Rc<Cell<Option<Instant>>>,
    host_failure: Rc<RefCell<Option<ScriptError>>>,
}

impl ScriptEngine {
    pub fn new(registry: &ProviderRegistry, limits: ScriptLimits) -> Self {
        let mut engine = Engine::new_raw();
        engine.register_global_module(StandardPackage::new().as_shared_module());
        engine.set_module_resolver(DummyModuleResolver::new());
        engine.disable_symbol("eval");
        engine.set_max_operations(limits.max_operations);
        engine.set_max_call_levels(limits.max_call_levels);
        engine.set_max_string_size(limits.max_string_size);
        engine.set_max_array_size(limits.max_array_size);
        engine.set_max_map_size(limits.max_map_size);

        let deadline: Rc<Cell<Option<Instant>>> = Rc::new(Cell::new(None));
        let watch = Rc::clone(&deadline);
        engine.on_progress(move |_| match watch.get() {
            Some(deadline) if Instant::now() >= deadline => Some(Dynamic::from("timeout")),
            _ => None,
        });

        let host_failure = Rc::new(RefCell::new(None));
        for provider in registry.providers() {
            let name = global_name(provider.package());
            let module = host_module(&name, provider.as_ref(), &limits, &host_failure);
            engine.register_static_module(name.as_str(), module.into());
            debug!(module = %name, "host provider registered");
        }

        Self {
            engine,
            limits,
            globals: BTreeMap::new(),
            providers: registry.providers().to_vec(),
            compiled: RefCell::new(HashMap::new()),
            deadline,
            host_failure,
        }
    }

    /// Runs `action` with a fresh engine and disposes it afterwards, whether
    /// `action` succeeds, fails or unwinds.
    pub fn scoped<R>(
        registry: &ProviderRegistry,
        limits: ScriptLimits,
        action: impl FnOnce(&mut ScriptEngine) -> R,
    ) -> R {
        let mut engine = ScriptEngine::new(registry, limits);
        action(&mut engine)
    }

    /// Makes `value` readable from scripts under `name`, replacing any
    /// previous global of that name.
    pub fn register_global_object(&mut self, name: &str, value: &Value) -> Result<(), ScriptError> {
        if !is_identifier(name) {
            return Err(ScriptError::InvalidGlobal(name.to_string()));
        }
        let value = rhai::serde::to_dynamic(value).map_err(|err| ScriptError::Value(err.to_string()))?;
        self.globals.insert(name.to_string(), value);
        Ok(())
    }

    #[instrument(level = "trace", skip_all, fields(len = script.code.len()))]
    pub fn evaluate_code(&self, script: &ScriptExpression) -> Result<ScriptValue, ScriptError> {
        let ast = self.compile(&script.code)?;

        let mut scope = Scope::new();
        for (name, value) in &self.globals {
            scope.push_constant_dynamic(name.as_str(), value.clone());
        }

        self.host_failure.borrow_mut().take();
        self.deadline.set(Some(Instant::now() + self.limits.timeout()));
        let outcome = self.engine.eval_ast_with_scope::<Dynamic>(&mut scope, &ast);
        self.deadline.set(None);

        match outcome {
            Ok(result) => {
                let value: Value = rhai::serde::from_dynamic(&result)
                    .map_err(|err| ScriptError::Value(err.to_string()))?;
                trace!(?value, "script evaluated");
                Ok(ScriptValue::new(value))
            }
            Err(err) => Err(self.classify(*err)),
        }
    }

    fn compile(&self, code: &str) -> Result<Rc<AST>, ScriptError> {
        if let Some(ast) = self.compiled.borrow().get(code) {
            return Ok(Rc::clone(ast));
        }
        let ast = Rc::new(
            self.engine
                .compile(code)
                .map_err(|err| ScriptError::Compile(err.to_string()))?,
        );
        self.compiled
            .borrow_mut()
            .insert(code.to_string(), Rc::clone(&ast));
        Ok(ast)
    }

    fn classify(&self, err: EvalAltResult) -> ScriptError {
        // Host failures surface inside Rhai as plain runtime errors; the
        // recorded failure carries the precise cause.
        if let Some(failure) = self.host_failure.borrow_mut().take() {
            return failure;
        }
        match err {
            EvalAltResult::ErrorTooManyOperations(_) => {
                ScriptError::BudgetExhausted(self.limits.max_operations)
            }
            EvalAltResult::ErrorTerminated(_, _) => ScriptError::Timeout(self.limits.timeout()),
            EvalAltResult::ErrorParsing(parse, _) => ScriptError::Compile(parse.to_string()),
            other => ScriptError::Runtime(other.to_string()),
        }
    }
}

impl Drop for ScriptEngine {
    fn drop(&mut self) {
        for provider in &self.providers {
            provider.release();
        }
        debug!(providers = self.providers.len(), "script context released");
    }
}

type HostCall = Rc<dyn Fn(Vec<Dynamic>) -> Result<Dynamic, Box<EvalAltResult>>>;

fn host_module(
    module_name: &str,
    provider: &dyn HostFunctionProvider,
    limits: &ScriptLimits,
    failure_slot: &Rc<RefCell<Option<ScriptError>>>,
) -> Module {
    let mut module = Module::new();
    let timeout = limits.host_call_timeout();

    for function in provider.exports() {
        let provider_name = module_name.to_string();
        let slot = Rc::clone(failure_slot);
        let name = function.name;
        let arity = function.arity;

        let call: HostCall = Rc::new(move |args: Vec<Dynamic>| -> Result<Dynamic, Box<EvalAltResult>> {
            let values = args
                .iter()
                .map(|arg| rhai::serde::from_dynamic::<Value>(arg))
                .collect::<Result<Vec<_>, _>>()?;

            let started = Instant::now();
            let outcome = function.call(&HostCallContext { timeout }, &values);
            let timed_out = started.elapsed() > timeout || outcome == Err(HostError::Timeout);

            let failure = if timed_out {
                Some(ScriptError::HostTimeout {
                    provider: provider_name.clone(),
                    function: name.to_string(),
                    timeout,
                })
            } else {
                outcome.as_ref().err().map(|err| ScriptError::Host {
                    provider: provider_name.clone(),
                    function: name.to_string(),
                    message: err.to_string(),
                })
            };
            if let Some(failure) = failure {
                let message = failure.to_string();
                *slot.borrow_mut() = Some(failure);
                return Err(message.into());
            }

            match outcome {
                Ok(value) => rhai::serde::to_dynamic(&value),
                Err(err) => Err(err.to_string().into()),
            }
        });

        // Internal namespace: reachable only as `<module>::<name>(..)`.
        let registration = FuncRegistration::new(name).in_internal_namespace();
        match arity {
            0 => {
                registration.set_into_module(&mut module, move || call(Vec::new()));
            }
            1 => {
                registration.set_into_module(&mut module, move |a: Dynamic| call(vec![a]));
            }
            2 => {
                registration
                    .set_into_module(&mut module, move |a: Dynamic, b: Dynamic| call(vec![a, b]));
            }
            3 => {
                registration.set_into_module(
                    &mut module,
                    move |a: Dynamic, b: Dynamic, c: Dynamic| call(vec![a, b, c]),
                );
            }
            4 => {
                registration.set_into_module(
                    &mut module,
                    move |a: Dynamic, b: Dynamic, c: Dynamic, d: Dynamic| call(vec![a, b, c, d]),
                );
            }
            // ProviderRegistry::new rejects larger arities.
            _ => warn!(module = %module_name, function = name, arity, "host function skipped"),
        }
    }
    module
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::provider::HostFunction;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        released: AtomicUsize,
    }

    impl HostFunctionProvider for Recorder {
        fn package(&self) -> &str {
            "test.recorder"
        }

        fn exports(&self) -> Vec<HostFunction> {
            vec![
                HostFunction::new("double", 1, |_, args| {
                    let n = args[0].as_i64().ok_or_else(|| HostError::Failed("not an int".into()))?;
                    Ok(json!(n * 2))
                }),
                HostFunction::new("join", 3, |_, args| {
                    let parts: Vec<String> = args
                        .iter()
                        .map(|arg| arg.as_str().map(str::to_string).unwrap_or_else(|| arg.to_string()))
                        .collect();
                    Ok(json!(parts.join("-")))
                }),
                HostFunction::new("fail", 0, |_, _| Err(HostError::Failed("boom".into()))),
                HostFunction::new("slow", 0, |_, _| Err(HostError::Timeout)),
            ]
        }

        fn release(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn registry(recorder: &Arc<Recorder>) -> ProviderRegistry {
        let provider: Arc<dyn HostFunctionProvider> = recorder.clone();
        ProviderRegistry::new(vec![provider]).unwrap()
    }

    fn eval(engine: &ScriptEngine, code: &str) -> Result<ScriptValue, ScriptError> {
        engine.evaluate_code(&ScriptExpression::new(code))
    }

    #[test]
    fn globals_are_readable() {
        let mut engine = ScriptEngine::new(&ProviderRegistry::empty(), ScriptLimits::default());
        engine
            .register_global_object("data", &json!({ "text_1": "abc", "n": 2 }))
            .unwrap();
        assert_eq!(eval(&engine, "data.text_1.len() + data.n").unwrap().value(), &json!(5));
    }

    #[test]
    fn globals_are_read_only() {
        let mut engine = ScriptEngine::new(&ProviderRegistry::empty(), ScriptLimits::default());
        engine.register_global_object("data", &json!({ "a": 1 })).unwrap();
        assert!(eval(&engine, "data.a = 5; data.a").is_err());
        assert_eq!(eval(&engine, "data.a").unwrap().value(), &json!(1));
    }

    #[test]
    fn invalid_global_names_are_rejected() {
        let mut engine = ScriptEngine::new(&ProviderRegistry::empty(), ScriptLimits::default());
        let err = engine.register_global_object("not-valid", &json!(1)).unwrap_err();
        assert_eq!(err, ScriptError::InvalidGlobal("not-valid".into()));
    }

    #[test]
    fn exported_host_functions_are_namespaced() {
        let recorder = Arc::new(Recorder::default());
        let engine = ScriptEngine::new(&registry(&recorder), ScriptLimits::default());
        assert_eq!(eval(&engine, "test_recorder::double(21)").unwrap().value(), &json!(42));
        assert_eq!(
            eval(&engine, "test_recorder::join(\"a\", 1, true)").unwrap().value(),
            &json!("a-1-true")
        );
        assert!(eval(&engine, "test_recorder::double(1, 2)").is_err());
        assert!(eval(&engine, "double(21)").is_err());
        assert!(eval(&engine, "test_recorder::release()").is_err());
    }

    #[test]
    fn host_failures_are_reported_precisely() {
        let recorder = Arc::new(Recorder::default());
        let engine = ScriptEngine::new(&registry(&recorder), ScriptLimits::default());
        assert_eq!(
            eval(&engine, "test_recorder::fail()").unwrap_err(),
            ScriptError::Host {
                provider: "test_recorder".into(),
                function: "fail".into(),
                message: "boom".into(),
            }
        );
        assert!(matches!(
            eval(&engine, "test_recorder::slow()").unwrap_err(),
            ScriptError::HostTimeout { .. }
        ));
    }

    #[test]
    fn release_happens_once_on_success_and_failure() {
        let recorder = Arc::new(Recorder::default());
        let registry = registry(&recorder);

        let ok = ScriptEngine::scoped(&registry, ScriptLimits::default(), |engine| {
            eval(engine, "1 + 1")
        });
        assert!(ok.is_ok());
        assert_eq!(recorder.released.load(Ordering::SeqCst), 1);

        let failed = ScriptEngine::scoped(&registry, ScriptLimits::default(), |engine| {
            eval(engine, "throw \"nope\"")
        });
        assert!(matches!(failed, Err(ScriptError::Runtime(_))));
        assert_eq!(recorder.released.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn operation_budget_stops_runaway_loops() {
        let limits = ScriptLimits {
            max_operations: 10_000,
            ..ScriptLimits::default()
        };
        let engine = ScriptEngine::new(&ProviderRegistry::empty(), limits);
        assert_eq!(
            eval(&engine, "loop { }").unwrap_err(),
            ScriptError::BudgetExhausted(10_000)
        );
    }

    #[test]
    fn wall_clock_budget_stops_runaway_loops() {
        let limits = ScriptLimits {
            max_operations: 0,
            timeout_ms: 20,
            ..ScriptLimits::default()
        };
        let engine = ScriptEngine::new(&ProviderRegistry::empty(), limits);
        assert_eq!(
            eval(&engine, "loop { }").unwrap_err(),
            ScriptError::Timeout(Duration::from_millis(20))
        );
    }

    #[test]
    fn compile_errors_are_distinguished() {
        let engine = ScriptEngine::new(&ProviderRegistry::empty(), ScriptLimits::default());
        assert!(matches!(eval(&engine, "let = ;"), Err(ScriptError::Compile(_))));
    }

    #[test]
    fn separate_engines_do_not_share_state() {
        let mut first = ScriptEngine::new(&ProviderRegistry::empty(), ScriptLimits::default());
        first.register_global_object("secret", &json!("x")).unwrap();
        let second = ScriptEngine::new(&ProviderRegistry::empty(), ScriptLimits::default());
        assert!(eval(&second, "secret").is_err());
        assert_eq!(eval(&first, "secret").unwrap().value(), &json!("x"));
    }
}
