use regex::Regex;
use serde_json::Value;

use crate::script::provider::{HostError, HostFunction, HostFunctionProvider};

/// `forms.text`: string normalisation helpers for scripts.
pub struct TextProvider;

fn text_arg(args: &[Value], index: usize) -> Result<&str, HostError> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| HostError::Failed(format!("argument {index} must be a string")))
}

impl HostFunctionProvider for TextProvider {
    fn package(&self) -> &str {
        "forms.text"
    }

    fn exports(&self) -> Vec<HostFunction> {
        vec![
            HostFunction::new("normalize", 1, |_, args| {
                let text = text_arg(args, 0)?;
                Ok(Value::String(
                    text.split_whitespace().collect::<Vec<_>>().join(" "),
                ))
            }),
            HostFunction::new("matches", 2, |_, args| {
                let text = text_arg(args, 0)?;
                let pattern = text_arg(args, 1)?;
                let regex = Regex::new(pattern)
                    .map_err(|err| HostError::Failed(format!("invalid pattern: {err}")))?;
                Ok(Value::Bool(regex.is_match(text)))
            }),
        ]
    }
}
