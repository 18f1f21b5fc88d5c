//! Core traits that every provider and model implementation must satisfy.

use crate::api::ModelSpec;
use crate::error::{ClientError, Result};
use crate::message::Message;
use crate::stream::EventStream;
use async_trait::async_trait;
use std::sync::Arc;

/// One class of operation a provider can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Non-streaming text generation.
    Text,
    /// Incremental token/chunk delivery.
    Streaming,
    /// Schema-constrained object generation.
    StructuredOutput,
    /// Enum-constrained generation (a special case of structured output that
    /// some APIs expose separately).
    Classification,
    /// Image content parts (bytes or URL) in user messages.
    ImageInput,
    /// Raw file content parts (bytes plus media type) in user messages.
    FileInput,
}

/// Advertised capabilities of a [`ChatProvider`].
#[derive(Debug, Clone)]
pub struct ProviderCapabilities {
    /// The set of [`Capability`] variants this provider can handle.
    pub supported: Vec<Capability>,
}

impl ProviderCapabilities {
    /// A provider that serves every operation class.
    pub fn full() -> Self {
        Self {
            supported: vec![
                Capability::Text,
                Capability::Streaming,
                Capability::StructuredOutput,
                Capability::Classification,
                Capability::ImageInput,
                Capability::FileInput,
            ],
        }
    }

    /// Check a single capability.
    pub fn supports(&self, capability: Capability) -> bool {
        self.supported.contains(&capability)
    }
}

/// Health status reported by a provider.
#[derive(Debug, Clone)]
pub enum ProviderHealth {
    /// The provider is fully operational.
    Healthy,
    /// The provider is operational but experiencing partial issues.
    Degraded(String),
    /// The provider cannot serve requests.
    Unhealthy(String),
}

/// A pluggable backend that connects model specs to ready-to-call models.
///
/// Providers are registered with
/// [`ProviderRegistry::register`](crate::registry::ProviderRegistry::register)
/// and are identified by their [`provider_id`](ChatProvider::provider_id)
/// (e.g. `"openai"`, `"anthropic"`).
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Unique identifier for this provider (e.g. `"openai"`, `"gemini"`).
    fn provider_id(&self) -> &'static str;

    /// Return the set of operation classes this provider supports.
    fn capabilities(&self) -> ProviderCapabilities;

    /// Resolve credentials and options from `spec` and return a bound model
    /// handle. Remote providers do not make a network call here; binding
    /// failures are configuration errors.
    async fn connect(&self, spec: &ModelSpec) -> Result<Arc<dyn LanguageModel>>;

    /// Report the current health of this provider.
    async fn health(&self) -> ProviderHealth;
}

/// Sampling and length parameters for generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOptions {
    /// Maximum number of tokens to generate. Provider default if `None`.
    pub max_tokens: Option<usize>,
    /// Sampling temperature (0.0 = greedy, higher = more random).
    pub temperature: Option<f32>,
    /// Nucleus sampling threshold.
    pub top_p: Option<f32>,
}

/// A fully shaped generation request: the message sequence in conversation
/// order plus sampling options.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub messages: Vec<Message>,
    pub options: GenerationOptions,
}

impl GenerationRequest {
    /// A request with default sampling options.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            options: GenerationOptions::default(),
        }
    }

    /// Replace the sampling options.
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }
}

/// The output of a non-streaming text generation call.
#[derive(Debug, Clone)]
pub struct TextGeneration {
    /// The generated answer text.
    pub text: String,
    /// Intermediate reasoning content, when the provider separates it from
    /// the answer (natively or via a tag convention).
    pub reasoning: Option<String>,
    /// Token usage statistics, if reported by the provider.
    pub usage: Option<TokenUsage>,
}

/// The output of a structured generation call.
#[derive(Debug, Clone)]
pub struct ObjectGeneration {
    /// The structured payload. Conformance to the caller's schema is the
    /// provider's guarantee; this layer does not re-validate it.
    pub object: serde_json::Value,
    /// Token usage statistics, if reported by the provider.
    pub usage: Option<TokenUsage>,
}

/// Token counts for a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenUsage {
    /// Number of tokens in the prompt / input.
    pub prompt_tokens: usize,
    /// Number of tokens generated.
    pub completion_tokens: usize,
    /// Sum of prompt and completion tokens.
    pub total_tokens: usize,
}

/// Constraint applied to structured generation output.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputSchema {
    /// A JSON Schema the output object must conform to.
    Json(serde_json::Value),
    /// The output must be exactly one of these strings.
    Choice(Vec<String>),
}

impl OutputSchema {
    /// Derive a JSON schema from a Rust type via its
    /// [`JsonSchema`](schemars::JsonSchema) implementation.
    pub fn of<T: schemars::JsonSchema>() -> Result<Self> {
        let schema = schemars::schema_for!(T);
        let value = serde_json::to_value(schema)
            .map_err(|e| ClientError::Config(format!("Failed to build output schema: {}", e)))?;
        Ok(Self::Json(value))
    }

    /// An enum constraint over the given values.
    pub fn choice<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Choice(values.into_iter().map(Into::into).collect())
    }
}

/// A bound, ready-to-call model under one provider.
///
/// Implementations speak the provider's wire API and normalize its output
/// into the crate's result and event types.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// The model identifier this handle is bound to (e.g. `"gpt-4o"`).
    fn model_id(&self) -> &str;

    /// Generate a complete response for the conversation.
    async fn generate_text(&self, request: GenerationRequest) -> Result<TextGeneration>;

    /// Start a streaming generation. The returned stream yields text and
    /// reasoning deltas in provider order, then usage, then end-of-stream.
    async fn stream_text(&self, request: GenerationRequest) -> Result<EventStream>;

    /// Generate output constrained by `schema`.
    async fn generate_object(
        &self,
        request: GenerationRequest,
        schema: &OutputSchema,
    ) -> Result<ObjectGeneration>;

    /// Start a streaming structured generation. Text deltas on the returned
    /// stream carry fragments of the serialized object.
    async fn stream_object(
        &self,
        request: GenerationRequest,
        schema: &OutputSchema,
    ) -> Result<EventStream>;
}

impl std::fmt::Debug for dyn LanguageModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageModel")
            .field("model_id", &self.model_id())
            .finish_non_exhaustive()
    }
}
