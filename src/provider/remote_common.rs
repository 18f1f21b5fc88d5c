//! Shared utilities for all remote (HTTP API) providers: HTTP status mapping,
//! API key and base URL resolution, and transport error classification.

use crate::api::ModelSpec;
use crate::error::{ClientError, Result};
use reqwest::Client;

/// Map an HTTP response status to a `ClientError` for non-success codes.
/// Returns `Ok(response)` when the status is 2xx.
pub(crate) fn check_http_status(
    provider_name: &str,
    response: reqwest::Response,
) -> std::result::Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(match status.as_u16() {
        429 => ClientError::RateLimited,
        401 | 403 => ClientError::Unauthorized,
        500..=599 => ClientError::Unavailable,
        _ => ClientError::Api(format!("{} API error: {}", provider_name, status)),
    })
}

/// Classify a reqwest transport failure. Deadline overruns become
/// [`ClientError::Timeout`]; everything else is reported as an API error.
pub(crate) fn map_transport_error(provider_name: &str, error: reqwest::Error) -> ClientError {
    if error.is_timeout() {
        ClientError::Timeout
    } else {
        ClientError::Api(format!("{} request failed: {}", provider_name, error))
    }
}

/// Resolve the API key for a remote model binding.
///
/// An explicit key on the spec wins. Otherwise the `api_key_env` option names
/// the environment variable to read; `default_env` is used when unset.
pub(crate) fn resolve_api_key(spec: &ModelSpec, default_env: &str) -> Result<String> {
    if let Some(key) = &spec.api_key {
        return Ok(key.expose().to_string());
    }

    let env_var_name = spec
        .options
        .get("api_key_env")
        .and_then(|v| v.as_str())
        .unwrap_or(default_env);

    std::env::var(env_var_name)
        .map_err(|_| ClientError::Config(format!("{} env var not set", env_var_name)))
}

/// Resolve the API base URL, preferring the `base_url` option over the
/// provider default. Trailing slashes are stripped so that endpoint paths can
/// be appended uniformly.
pub(crate) fn resolve_base_url(spec: &ModelSpec, default_url: &str) -> String {
    spec.options
        .get("base_url")
        .and_then(|v| v.as_str())
        .unwrap_or(default_url)
        .trim_end_matches('/')
        .to_string()
}

/// Unwrap the `{"value": ...}` envelope used to carry a choice schema through
/// APIs that require an object at the schema root. Passes non-choice output
/// through untouched.
pub(crate) fn unwrap_choice(
    value: serde_json::Value,
    schema: &crate::traits::OutputSchema,
) -> Result<serde_json::Value> {
    use serde_json::Value;

    if !matches!(schema, crate::traits::OutputSchema::Choice(_)) {
        return Ok(value);
    }
    match value {
        Value::Object(mut map) => map
            .remove("value")
            .ok_or_else(|| ClientError::Decode("choice output missing 'value' field".to_string())),
        // Lenient backends may return the bare string.
        Value::String(s) => Ok(Value::String(s)),
        other => Err(ClientError::Decode(format!(
            "unexpected choice output: {other}"
        ))),
    }
}

/// Shared HTTP plumbing for remote providers. One `reqwest::Client` per
/// provider instance; connections are pooled across every model bound
/// through it.
pub(crate) struct RemoteProviderBase {
    pub(crate) client: Client,
}

impl RemoteProviderBase {
    pub(crate) fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}
