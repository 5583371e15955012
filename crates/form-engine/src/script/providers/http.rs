use reqwest::blocking::Client;
use serde_json::Value;

use crate::script::provider::{HostError, HostFunction, HostFunctionProvider};

/// `forms.http`: outbound JSON lookups restricted to configured URL prefixes.
///
/// Each request is bound to the engine's host-call timeout.
pub struct HttpProvider {
    allowed_prefixes: Vec<String>,
}

impl HttpProvider {
    pub fn new(allowed_prefixes: Vec<String>) -> Self {
        Self { allowed_prefixes }
    }
}

impl HostFunctionProvider for HttpProvider {
    fn package(&self) -> &str {
        "forms.http"
    }

    fn exports(&self) -> Vec<HostFunction> {
        let allowed = self.allowed_prefixes.clone();
        vec![HostFunction::new("get_json", 1, move |context, args| {
            let url = args
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| HostError::Failed("url must be a string".into()))?;
            if !allowed.iter().any(|prefix| url.starts_with(prefix.as_str())) {
                return Err(HostError::Denied(url.to_string()));
            }

            let client = Client::builder()
                .timeout(context.timeout)
                .build()
                .map_err(|err| HostError::Failed(err.to_string()))?;
            let response = client.get(url).send().map_err(|err| {
                if err.is_timeout() {
                    HostError::Timeout
                } else {
                    HostError::Failed(err.to_string())
                }
            })?;
            if !response.status().is_success() {
                return Err(HostError::Failed(format!("status {}", response.status())));
            }
            response
                .json::<Value>()
                .map_err(|err| HostError::Failed(err.to_string()))
        })]
    }
}
