use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use form_engine::{
    DataContext, Element, EngineConfig, FormEngine, FormState, HostFunctionProvider,
    OperatorRegistry, ProviderRegistry, SecretsProvider, TextProvider, render_json, render_text,
};
use serde_json::{Value, json};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Environment variables with this prefix become `forms_secrets` entries.
const SECRET_PREFIX: &str = "FORM_SECRET_";

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Form derivation CLI",
    long_about = "Derives visibility, computed values and validation errors for a stored form tree and a set of inputs"
)]
struct Cli {
    /// Log engine internals to stderr (RUST_LOG takes precedence).
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    /// Summary of visible fields as JSON.
    Json,
    /// Summary of visible fields as text.
    Text,
    /// The complete derived state.
    State,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SchemaTarget {
    Config,
    State,
}

#[derive(Args)]
struct EngineArgs {
    /// Engine configuration JSON; defaults apply when omitted.
    #[arg(long, value_name = "CONFIG")]
    config: Option<PathBuf>,
    /// URL prefix scripts may fetch through `forms_http` (repeatable).
    #[cfg(feature = "http")]
    #[arg(long = "http-allow", value_name = "PREFIX")]
    http_allow: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Derive the form state for a tree and its inputs.
    Derive {
        /// Path to the form tree JSON.
        #[arg(long, value_name = "TREE")]
        tree: PathBuf,
        /// Path to the inputs JSON object.
        #[arg(long, value_name = "INPUTS")]
        inputs: PathBuf,
        /// Optional JSON object of extra script globals, e.g. `{"form": {...}}`.
        #[arg(long, value_name = "GLOBALS")]
        globals: Option<PathBuf>,
        #[command(flatten)]
        engine: EngineArgs,
        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Derive and fail when any visible field is invalid.
    Validate {
        /// Path to the form tree JSON.
        #[arg(long, value_name = "TREE")]
        tree: PathBuf,
        /// Path to the inputs JSON object.
        #[arg(long, value_name = "INPUTS")]
        inputs: PathBuf,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Print the catalog of registered NoCode operators.
    Operators,
    /// List element IDs referenced by each script, flagging unknown ones.
    References {
        /// Path to the form tree JSON.
        #[arg(long, value_name = "TREE")]
        tree: PathBuf,
    },
    /// Print a JSON schema.
    Schema {
        #[arg(value_enum, default_value_t = SchemaTarget::Config)]
        target: SchemaTarget,
    },
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Command::Derive {
            tree,
            inputs,
            globals,
            engine,
            format,
        } => run_derive(&tree, &inputs, globals.as_deref(), &engine, format),
        Command::Validate {
            tree,
            inputs,
            engine,
        } => run_validate(&tree, &inputs, &engine),
        Command::Operators => run_operators(),
        Command::References { tree } => run_references(&tree),
        Command::Schema { target } => run_schema(target),
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "info,form_engine=debug,form_derive=debug"
        } else {
            "warn,form_engine=info"
        })
    });
    // stdout carries the command output.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_derive(
    tree_path: &Path,
    inputs_path: &Path,
    globals_path: Option<&Path>,
    args: &EngineArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let tree = load_tree(tree_path)?;
    let inputs = load_object(inputs_path)?;
    let globals = match globals_path {
        Some(path) => load_object(path)?,
        None => DataContext::new(),
    };
    let engine = build_engine(args)?;
    let state = engine.derive_with_globals(&tree, &inputs, &globals)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&render_json(&tree, &state))?),
        OutputFormat::Text => println!("{}", render_text(&tree, &state)),
        OutputFormat::State => println!("{}", serde_json::to_string_pretty(&state)?),
    }
    Ok(())
}

fn run_validate(tree_path: &Path, inputs_path: &Path, args: &EngineArgs) -> CliResult<()> {
    let tree = load_tree(tree_path)?;
    let inputs = load_object(inputs_path)?;
    let state = build_engine(args)?.derive(&tree, &inputs)?;

    println!(
        "Validation result: {}",
        if state.is_valid() { "valid" } else { "invalid" }
    );
    describe_validation(&state);

    if state.is_valid() {
        Ok(())
    } else {
        Err("validation failed".into())
    }
}

fn describe_validation(state: &FormState) {
    if !state.errors.is_empty() {
        println!("Errors:");
        for (key, message) in &state.errors {
            println!("  {key} - {message}");
        }
    }
    if !state.failures.is_empty() {
        println!("Degraded:");
        for failure in &state.failures {
            println!("  {} ({}) - {}", failure.key, failure.step, failure.message);
        }
    }
}

fn run_operators() -> CliResult<()> {
    let registry = OperatorRegistry::with_defaults();
    println!("{}", serde_json::to_string_pretty(&registry.catalog())?);
    Ok(())
}

fn run_references(tree_path: &Path) -> CliResult<()> {
    let tree = load_tree(tree_path)?;
    let report = reference_report(&tree);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Script references per element, plus references no element ID explains.
/// Prefixed IDs (`container_0_field`) count as known when they end in a
/// known ID.
fn reference_report(tree: &Element) -> Value {
    let known: BTreeSet<String> = tree.ids().into_iter().collect();
    let references = tree.collect_references();
    let unresolved: BTreeSet<&String> = references
        .values()
        .flatten()
        .filter(|reference| {
            !known.contains(*reference)
                && !known
                    .iter()
                    .any(|id| reference.ends_with(&format!("_{id}")))
        })
        .collect();
    json!({
        "references": references,
        "unresolved": unresolved,
    })
}

fn run_schema(target: SchemaTarget) -> CliResult<()> {
    let schema = match target {
        SchemaTarget::Config => EngineConfig::schema(),
        SchemaTarget::State => FormState::schema(),
    };
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

fn build_engine(args: &EngineArgs) -> CliResult<FormEngine> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_json(&fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };

    #[cfg_attr(not(feature = "http"), allow(unused_mut))]
    let mut providers: Vec<Arc<dyn HostFunctionProvider>> = vec![
        Arc::new(TextProvider),
        Arc::new(SecretsProvider::from_env(SECRET_PREFIX, &config.secrets)?),
    ];
    #[cfg(feature = "http")]
    if !args.http_allow.is_empty() {
        providers.push(Arc::new(form_engine::script::providers::HttpProvider::new(
            args.http_allow.clone(),
        )));
    }
    let providers = ProviderRegistry::new(providers)?;
    debug!(?providers, policy = ?config.failure_policy, "engine configured");

    Ok(FormEngine::new(
        Arc::new(OperatorRegistry::with_defaults()),
        providers,
        config,
    ))
}

fn load_tree(path: &Path) -> CliResult<Element> {
    let definition: Value = serde_json::from_str(&fs::read_to_string(path)?)?;
    let tree = Element::from_value(&definition);
    info!(form = %tree.id(), elements = tree.ids().len(), "form tree loaded");
    Ok(tree)
}

fn load_object(path: &Path) -> CliResult<DataContext> {
    match serde_json::from_str::<Value>(&fs::read_to_string(path)?)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(DataContext::new()),
        _ => Err(format!("{} must contain a JSON object", path.display()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_cmd::Command;
    use assert_fs::TempDir;
    use assert_fs::prelude::*;

    const TREE: &str = r#"{
        "id": "contact",
        "type": "root",
        "label": "Contact",
        "children": [
            { "id": "name", "type": "text", "label": "Name", "required": true },
            { "id": "wants_call", "type": "checkbox", "label": "Call me" },
            {
                "id": "phone", "type": "text", "label": "Phone", "required": true,
                "visibility": { "kind": "script", "code": "data.wants_call == true" }
            },
            {
                "id": "greeting", "type": "text", "label": "Greeting",
                "compute_value": { "kind": "script", "code": "\"Hello \" + data.name" }
            }
        ]
    }"#;

    fn workspace(inputs: &str) -> TempDir {
        let temp = TempDir::new().expect("temp dir");
        temp.child("tree.json").write_str(TREE).expect("tree");
        temp.child("inputs.json").write_str(inputs).expect("inputs");
        temp
    }

    fn form_derive() -> Command {
        Command::cargo_bin("form-derive").expect("binary")
    }

    #[test]
    fn derive_prints_state() {
        let temp = workspace(r#"{ "name": "Ada", "wants_call": false }"#);
        let output = form_derive()
            .arg("derive")
            .arg("--tree")
            .arg(temp.child("tree.json").path())
            .arg("--inputs")
            .arg(temp.child("inputs.json").path())
            .args(["--format", "state"])
            .output()
            .expect("run");
        assert!(output.status.success());
        let state: Value = serde_json::from_slice(&output.stdout).expect("json");
        assert_eq!(state["values"]["greeting"], json!("Hello Ada"));
        assert_eq!(state["visibilities"]["phone"], json!(false));
    }

    #[test]
    fn derive_renders_text_summary() {
        let temp = workspace(r#"{ "name": "Ada", "wants_call": true, "phone": "0301234" }"#);
        let output = form_derive()
            .arg("derive")
            .arg("--tree")
            .arg(temp.child("tree.json").path())
            .arg("--inputs")
            .arg(temp.child("inputs.json").path())
            .args(["--format", "text"])
            .output()
            .expect("run");
        assert!(output.status.success());
        let stdout = String::from_utf8(output.stdout).expect("utf8");
        assert!(stdout.contains("Status: valid"));
        assert!(stdout.contains("Phone: 0301234"));
    }

    #[test]
    fn validate_fails_on_errors() {
        let temp = workspace(r#"{ "wants_call": true }"#);
        let output = form_derive()
            .arg("validate")
            .arg("--tree")
            .arg(temp.child("tree.json").path())
            .arg("--inputs")
            .arg(temp.child("inputs.json").path())
            .output()
            .expect("run");
        assert!(!output.status.success());
        let stdout = String::from_utf8(output.stdout).expect("utf8");
        assert!(stdout.contains("Validation result: invalid"));
        assert!(stdout.contains("phone - a value is required"));
    }

    #[test]
    fn config_file_switches_failure_policy() {
        let temp = TempDir::new().expect("temp dir");
        temp.child("tree.json")
            .write_str(
                r#"{ "id": "f", "type": "root", "children": [
                    { "id": "x", "type": "number", "compute_value": { "kind": "script", "code": "throw \"down\"" } }
                ] }"#,
            )
            .expect("tree");
        temp.child("inputs.json").write_str("{}").expect("inputs");
        temp.child("config.json")
            .write_str(r#"{ "failure_policy": "degrade" }"#)
            .expect("config");

        let run = |with_config: bool| {
            let mut command = form_derive();
            command
                .arg("derive")
                .arg("--tree")
                .arg(temp.child("tree.json").path())
                .arg("--inputs")
                .arg(temp.child("inputs.json").path());
            if with_config {
                command.arg("--config").arg(temp.child("config.json").path());
            }
            command.output().expect("run")
        };
        assert!(!run(false).status.success());
        let degraded = run(true);
        assert!(degraded.status.success());
        let payload: Value = serde_json::from_slice(&degraded.stdout).expect("json");
        assert_eq!(payload["failures"][0]["step"], json!("compute"));
    }

    #[test]
    fn operators_lists_catalog() {
        let output = form_derive().arg("operators").output().expect("run");
        assert!(output.status.success());
        let catalog: Value = serde_json::from_slice(&output.stdout).expect("json");
        assert!(
            catalog
                .as_array()
                .expect("array")
                .iter()
                .any(|entry| entry["identifier"] == "logic.and")
        );
    }

    #[test]
    fn reference_report_flags_unknown_ids() {
        let tree = Element::from_value(&json!({
            "id": "form",
            "type": "root",
            "children": [
                { "id": "text_123", "type": "text" },
                {
                    "id": "text_456", "type": "text",
                    "visibility": { "kind": "script", "code": "data.text_123 != () && data.text_999 == ()" }
                }
            ]
        }));
        let report = reference_report(&tree);
        assert_eq!(
            report["references"]["text_456"],
            json!(["text_123", "text_999"])
        );
        assert_eq!(report["unresolved"], json!(["text_999"]));
    }

    #[test]
    fn schema_prints_config_schema() {
        let output = form_derive().arg("schema").output().expect("run");
        assert!(output.status.success());
        let schema: Value = serde_json::from_slice(&output.stdout).expect("json");
        assert!(schema["properties"]["failure_policy"].is_object());
    }
}
