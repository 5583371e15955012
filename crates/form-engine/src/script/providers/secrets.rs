use std::collections::BTreeMap;
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::Value;

use crate::config::SecretsPolicy;
use crate::error::RegistryError;
use crate::script::provider::{HostError, HostFunction, HostFunctionProvider};

/// `forms.secrets`: read-only access to named secrets, filtered by policy.
///
/// Exposed to scripts as `forms_secrets::get(name)` and
/// `forms_secrets::has(name)`.
pub struct SecretsProvider {
    inner: Arc<SecretStore>,
}

struct SecretStore {
    values: BTreeMap<String, String>,
    allow: Option<GlobSet>,
    deny: GlobSet,
}

impl SecretStore {
    fn allowed(&self, name: &str) -> bool {
        !self.deny.is_match(name)
            && self
                .allow
                .as_ref()
                .is_none_or(|allow| allow.is_match(name))
    }
}

impl SecretsProvider {
    pub fn new(
        values: BTreeMap<String, String>,
        policy: &SecretsPolicy,
    ) -> Result<Self, RegistryError> {
        let allow = if policy.allow.is_empty() {
            None
        } else {
            Some(build_set(&policy.allow)?)
        };
        let deny = build_set(&policy.deny)?;
        Ok(Self {
            inner: Arc::new(SecretStore {
                values,
                allow,
                deny,
            }),
        })
    }

    /// Collects secrets from environment variables starting with `prefix`;
    /// `FORM_SECRET_API_KEY` becomes `api_key` for prefix `FORM_SECRET_`.
    pub fn from_env(prefix: &str, policy: &SecretsPolicy) -> Result<Self, RegistryError> {
        let values = std::env::vars()
            .filter_map(|(key, value)| {
                key.strip_prefix(prefix)
                    .filter(|name| !name.is_empty())
                    .map(|name| (name.to_ascii_lowercase(), value))
            })
            .collect();
        Self::new(values, policy)
    }
}

fn build_set(patterns: &[String]) -> Result<GlobSet, RegistryError> {
    let invalid = |err: globset::Error| RegistryError::SecretsPolicy(err.to_string());
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).map_err(invalid)?);
    }
    builder.build().map_err(invalid)
}

fn secret_name(args: &[Value]) -> Result<&str, HostError> {
    args.first()
        .and_then(Value::as_str)
        .ok_or_else(|| HostError::Failed("secret name must be a string".into()))
}

impl HostFunctionProvider for SecretsProvider {
    fn package(&self) -> &str {
        "forms.secrets"
    }

    fn exports(&self) -> Vec<HostFunction> {
        let get_store = Arc::clone(&self.inner);
        let has_store = Arc::clone(&self.inner);
        vec![
            HostFunction::new("get", 1, move |_, args| {
                let name = secret_name(args)?;
                if !get_store.allowed(name) {
                    return Err(HostError::Denied(name.to_string()));
                }
                Ok(get_store
                    .values
                    .get(name)
                    .map(|value| Value::String(value.clone()))
                    .unwrap_or(Value::Null))
            }),
            HostFunction::new("has", 1, move |_, args| {
                let name = secret_name(args)?;
                Ok(Value::Bool(
                    has_store.allowed(name) && has_store.values.contains_key(name),
                ))
            }),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::provider::HostCallContext;
    use serde_json::json;
    use std::time::Duration;

    fn provider() -> SecretsProvider {
        let values = BTreeMap::from([
            ("api_key".to_string(), "k-123".to_string()),
            ("db_password".to_string(), "hunter2".to_string()),
        ]);
        let policy = SecretsPolicy {
            allow: vec!["api_*".into(), "db_*".into()],
            deny: vec!["db_*".into()],
        };
        SecretsProvider::new(values, &policy).unwrap()
    }

    fn call(provider: &SecretsProvider, function: &str, name: &str) -> Result<Value, HostError> {
        let context = HostCallContext {
            timeout: Duration::from_secs(1),
        };
        provider
            .exports()
            .into_iter()
            .find(|export| export.name == function)
            .expect("export")
            .call(&context, &[json!(name)])
    }

    #[test]
    fn allowed_secret_is_returned() {
        assert_eq!(call(&provider(), "get", "api_key").unwrap(), json!("k-123"));
        assert_eq!(call(&provider(), "get", "api_other").unwrap(), Value::Null);
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let policy = SecretsPolicy {
            allow: vec!["api_[".into()],
            deny: Vec::new(),
        };
        assert!(matches!(
            SecretsProvider::new(BTreeMap::new(), &policy),
            Err(RegistryError::SecretsPolicy(_))
        ));
    }

    #[test]
    fn deny_wins_over_allow() {
        assert_eq!(
            call(&provider(), "get", "db_password").unwrap_err(),
            HostError::Denied("db_password".into())
        );
        assert_eq!(call(&provider(), "has", "db_password").unwrap(), json!(false));
        assert_eq!(call(&provider(), "has", "api_key").unwrap(), json!(true));
    }
}
