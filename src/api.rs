//! Public API types for configuring the client: model specs, credentials,
//! and stream presentation.

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// An API credential for a remote provider.
///
/// Wraps the raw secret so it cannot leak through `Debug` formatting of a
/// [`ModelSpec`] or a client. Use [`expose`](ApiKey::expose) at the single
/// point where the value goes into a request header.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a raw secret.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the underlying secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Declarative specification of one inference target: which provider, which
/// model, and how to authenticate.
///
/// Built programmatically or parsed from JSON with [`ModelSpec::from_json_str`]
/// or [`ModelSpec::from_file`]. Credentials never round-trip through JSON — use
/// the `api_key_env` option to name an environment variable instead.
///
/// # Example JSON
///
/// ```json
/// {
///   "provider_id": "anthropic",
///   "model_id": "claude-sonnet-4-5",
///   "options": { "api_key_env": "MY_ANTHROPIC_KEY" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Identifier of the provider that will serve this model (e.g. `"openai"`,
    /// `"anthropic"`, `"gemini"`).
    pub provider_id: String,
    /// Model identifier understood by the provider (e.g. `"gpt-4o"`,
    /// `"gemini-2.0-flash"`).
    pub model_id: String,
    /// Explicit credential. Takes precedence over `api_key_env` and the
    /// provider's default environment variable. Never serialized.
    #[serde(skip)]
    pub api_key: Option<ApiKey>,
    /// Provider-specific options (e.g. `{"base_url": "..."}` or
    /// `{"api_key_env": "MY_KEY"}`). `Null` when absent; [`ModelSpec::new`]
    /// starts with `{}`.
    #[serde(default)]
    pub options: serde_json::Value,
}

impl ModelSpec {
    /// Build a spec with empty options and no explicit credential.
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
            api_key: None,
            options: serde_json::json!({}),
        }
    }

    /// Attach an explicit credential.
    pub fn with_api_key(mut self, key: impl Into<ApiKey>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set one provider-specific option key.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        if !self.options.is_object() {
            self.options = serde_json::json!({});
        }
        if let Some(map) = self.options.as_object_mut() {
            map.insert(key.into(), value.into());
        }
        self
    }

    /// Validate invariants: provider and model ids must be non-empty, options
    /// must be a JSON object when present.
    pub fn validate(&self) -> Result<()> {
        if self.provider_id.is_empty() {
            return Err(ClientError::Config(
                "Provider id cannot be empty".to_string(),
            ));
        }
        if self.model_id.is_empty() {
            return Err(ClientError::Config("Model id cannot be empty".to_string()));
        }
        if !self.options.is_object() && !self.options.is_null() {
            return Err(ClientError::Config(format!(
                "Options for '{}/{}' must be a JSON object",
                self.provider_id, self.model_id
            )));
        }
        Ok(())
    }

    /// Parse a `ModelSpec` from a JSON value.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let spec: Self = serde_json::from_value(value)
            .map_err(|e| ClientError::Config(format!("Invalid ModelSpec JSON: {}", e)))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse a `ModelSpec` from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let spec: Self = serde_json::from_str(s)
            .map_err(|e| ClientError::Config(format!("Invalid ModelSpec JSON: {}", e)))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Read and parse a `ModelSpec` from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!(
                "Failed to read spec file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&contents)
    }
}

/// Presentation pacing applied to text streams by the client.
///
/// Smoothing is a nicety, not a correctness feature: it re-chunks the stream
/// without changing its concatenated content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Smoothing {
    /// Pass provider chunks through untouched. This is the default.
    #[default]
    Off,
    /// Re-chunk so that each emitted piece ends on a word boundary.
    Word,
}

impl std::fmt::Display for Smoothing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Word => write!(f, "word"),
        }
    }
}
