//! Validation of provider-specific options JSON.
//!
//! Called during [`ProviderRegistry::resolve`](crate::registry::ProviderRegistry::resolve)
//! to reject unknown or malformed options before a model handle is bound.

use crate::error::{ClientError, Result};
use serde_json::Value;

/// Validate provider-specific options for the given `provider_id`.
///
/// Returns `Ok(())` if the options are valid or the provider is unknown
/// (unknown providers are silently accepted to allow third-party extensions).
pub fn validate_provider_options(provider_id: &str, options: &Value) -> Result<()> {
    match provider_id {
        "openai" => validate_openai_options(provider_id, options),
        "anthropic" => validate_anthropic_options(provider_id, options),
        "gemini" => validate_string_keys_only(provider_id, options, &["api_key_env", "base_url"]),
        _ => Ok(()),
    }
}

/// Parse `options` as a JSON object map, returning `None` for null and an
/// error for non-object types.
fn as_object<'a>(
    provider_id: &str,
    options: &'a Value,
) -> Result<Option<&'a serde_json::Map<String, Value>>> {
    match options {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(map)),
        _ => Err(ClientError::Config(format!(
            "Options for provider '{}' must be a JSON object or null",
            provider_id
        ))),
    }
}

/// Return an error if `map` contains any key not in `allowed`.
fn reject_unknown_keys(
    provider_id: &str,
    map: &serde_json::Map<String, Value>,
    allowed: &[&str],
) -> Result<()> {
    for key in map.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(ClientError::Config(format!(
                "Unknown option '{}' for provider '{}'",
                key, provider_id
            )));
        }
    }
    Ok(())
}

/// Require that all specified keys, if present, are strings.
fn require_string_keys(
    provider_id: &str,
    map: &serde_json::Map<String, Value>,
    keys: &[&str],
) -> Result<()> {
    for key in keys {
        if let Some(value) = map.get(*key)
            && !value.is_string()
        {
            return Err(ClientError::Config(format!(
                "Option '{}' for provider '{}' must be a string",
                key, provider_id
            )));
        }
    }
    Ok(())
}

/// Require that the named key, if present, is a positive (> 0) integer.
fn require_positive_u64(
    provider_id: &str,
    map: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<()> {
    if let Some(value) = map.get(key) {
        let Some(v) = value.as_u64() else {
            return Err(ClientError::Config(format!(
                "Option '{}' for provider '{}' must be a positive integer",
                key, provider_id
            )));
        };
        if v == 0 {
            return Err(ClientError::Config(format!(
                "Option '{}' for provider '{}' must be greater than 0",
                key, provider_id
            )));
        }
    }
    Ok(())
}

/// Validate providers whose options are all optional string keys.
fn validate_string_keys_only(
    provider_id: &str,
    options: &Value,
    allowed_keys: &[&str],
) -> Result<()> {
    let Some(map) = as_object(provider_id, options)? else {
        return Ok(());
    };
    reject_unknown_keys(provider_id, map, allowed_keys)?;
    require_string_keys(provider_id, map, allowed_keys)
}

/// Validate OpenAI-compatible options: string keys only, including the
/// reasoning tag override used for endpoints that emit tagged thinking.
fn validate_openai_options(provider_id: &str, options: &Value) -> Result<()> {
    validate_string_keys_only(
        provider_id,
        options,
        &["api_key_env", "base_url", "organization", "reasoning_tag"],
    )
}

/// Validate Anthropic options: string keys plus the optional default
/// `max_tokens` cap (the messages API requires one on every request).
fn validate_anthropic_options(provider_id: &str, options: &Value) -> Result<()> {
    let Some(map) = as_object(provider_id, options)? else {
        return Ok(());
    };
    reject_unknown_keys(
        provider_id,
        map,
        &["api_key_env", "base_url", "anthropic_version", "max_tokens"],
    )?;
    require_string_keys(
        provider_id,
        map,
        &["api_key_env", "base_url", "anthropic_version"],
    )?;
    require_positive_u64(provider_id, map, "max_tokens")
}
