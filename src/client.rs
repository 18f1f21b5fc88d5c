//! The client facade: one bound model, uniform operations for chat,
//! streaming, structured output, classification, and attachments.

use crate::api::{ModelSpec, Smoothing};
use crate::error::{ClientError, Result};
use crate::message::{ContentPart, Message, Role, media_type_for_path};
use crate::options_validation::validate_provider_options;
use crate::registry::ProviderRegistry;
use crate::stream::{ChatStream, ObjectStream};
use crate::traits::{
    Capability, GenerationOptions, GenerationRequest, LanguageModel, OutputSchema,
    ProviderCapabilities, TextGeneration, TokenUsage,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Reply to a chat operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    /// The answer text.
    pub text: String,
    /// Reasoning content the model produced alongside the answer, when the
    /// provider separates it.
    pub reasoning: Option<String>,
    /// Token usage, when the provider reported it.
    pub usage: Option<TokenUsage>,
}

impl From<TextGeneration> for ChatReply {
    fn from(generation: TextGeneration) -> Self {
        Self {
            text: generation.text,
            reasoning: generation.reasoning,
            usage: generation.usage,
        }
    }
}

/// Reply to a structured-output operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectReply<T = Value> {
    /// The generated object.
    pub object: T,
    /// Token usage, when the provider reported it.
    pub usage: Option<TokenUsage>,
}

/// Reply to a classification operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// The category the model picked.
    pub category: String,
    /// Token usage, when the provider reported it.
    pub usage: Option<TokenUsage>,
}

/// A resolved model handle plus what its provider advertised.
struct Binding {
    provider_id: String,
    model: Arc<dyn LanguageModel>,
    capabilities: ProviderCapabilities,
}

impl Binding {
    fn require(&self, capability: Capability) -> Result<()> {
        if self.capabilities.supports(capability) {
            return Ok(());
        }
        Err(ClientError::CapabilityMismatch(format!(
            "Provider '{}' does not support {:?}",
            self.provider_id, capability
        )))
    }
}

/// A client bound to one model, exposing the uniform chat, streaming,
/// structured-output, classification, and attachment operations.
///
/// Clients are cheap to share: the model handle is reference-counted and
/// every operation takes `&self`. Construction is lazy by default — the
/// provider is first contacted on first use, and a spec that cannot be
/// honored leaves the client unconfigured, so that every operation returns
/// [`ClientError::Unconfigured`]. Use [`ModelClientBuilder::try_build`] to
/// fail fast instead.
pub struct ModelClient {
    registry: Arc<ProviderRegistry>,
    spec: Option<ModelSpec>,
    smoothing: Smoothing,
    options: GenerationOptions,
    bound: RwLock<Option<Arc<Binding>>>,
}

impl std::fmt::Debug for ModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelClient")
            .field("spec", &self.spec)
            .field("smoothing", &self.smoothing)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ModelClient {
    /// A client for `model_id` served by `provider_id`, using the built-in
    /// registry and default options.
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self::builder()
            .model(ModelSpec::new(provider_id, model_id))
            .build()
    }

    /// Start building a client.
    pub fn builder() -> ModelClientBuilder {
        ModelClientBuilder::default()
    }

    /// Whether a model spec was accepted at construction. An unconfigured
    /// client fails every operation with [`ClientError::Unconfigured`].
    pub fn is_configured(&self) -> bool {
        self.spec.is_some()
    }

    /// The spec this client was built with, if one was accepted.
    pub fn model_spec(&self) -> Option<&ModelSpec> {
        self.spec.as_ref()
    }

    /// The resolved model binding, connecting on first use.
    async fn binding(&self) -> Result<Arc<Binding>> {
        let spec = self.spec.as_ref().ok_or(ClientError::Unconfigured)?;

        // Fast path: already bound
        {
            let bound = self.bound.read().await;
            if let Some(binding) = bound.as_ref() {
                return Ok(binding.clone());
            }
        }

        let mut bound = self.bound.write().await;
        // Double-check after acquiring the write lock
        if let Some(binding) = bound.as_ref() {
            return Ok(binding.clone());
        }

        let (model, capabilities) = self.registry.resolve(spec).await?;
        let binding = Arc::new(Binding {
            provider_id: spec.provider_id.clone(),
            model,
            capabilities,
        });
        *bound = Some(binding.clone());
        Ok(binding)
    }

    fn request(&self, messages: Vec<Message>) -> GenerationRequest {
        GenerationRequest::new(messages).with_options(self.options.clone())
    }

    /// Send a conversation to the model and return its complete reply.
    #[tracing::instrument(skip(self, messages))]
    pub async fn chat(&self, messages: Vec<Message>) -> Result<ChatReply> {
        let binding = self.binding().await?;
        binding.require(Capability::Text)?;
        let request = self.request(messages);
        let generation = dispatch(
            "chat",
            &binding.provider_id,
            binding.model.generate_text(request),
        )
        .await?;
        Ok(generation.into())
    }

    /// Start a streaming chat completion.
    ///
    /// Returns as soon as the provider begins producing output. Answer text
    /// arrives on [`ChatStream::text`]; reasoning and usage resolve on their
    /// side channels once the stream finishes.
    #[tracing::instrument(skip(self, messages))]
    pub async fn stream_chat(&self, messages: Vec<Message>) -> Result<ChatStream> {
        let binding = self.binding().await?;
        binding.require(Capability::Text)?;
        binding.require(Capability::Streaming)?;
        let request = self.request(messages);
        let events = dispatch(
            "stream_chat",
            &binding.provider_id,
            binding.model.stream_text(request),
        )
        .await?;
        Ok(ChatStream::from_events(events, self.smoothing))
    }

    /// Generate a JSON object conforming to `schema`.
    ///
    /// Conformance is the provider's guarantee; the object is returned as
    /// the provider produced it.
    #[tracing::instrument(skip(self, messages, schema))]
    pub async fn create_object(
        &self,
        messages: Vec<Message>,
        schema: Value,
    ) -> Result<ObjectReply> {
        self.object_with(messages, OutputSchema::Json(schema))
            .await
    }

    /// Generate an object of type `T`, deriving the output schema from its
    /// [`JsonSchema`](schemars::JsonSchema) implementation and deserializing
    /// the reply.
    #[tracing::instrument(skip(self, messages))]
    pub async fn create_object_as<T>(&self, messages: Vec<Message>) -> Result<ObjectReply<T>>
    where
        T: schemars::JsonSchema + DeserializeOwned,
    {
        let schema = OutputSchema::of::<T>()?;
        let reply = self.object_with(messages, schema).await?;
        typed(reply)
    }

    async fn object_with(
        &self,
        messages: Vec<Message>,
        schema: OutputSchema,
    ) -> Result<ObjectReply> {
        let binding = self.binding().await?;
        binding.require(Capability::StructuredOutput)?;
        let request = self.request(messages);
        let generation = dispatch(
            "create_object",
            &binding.provider_id,
            binding.model.generate_object(request, &schema),
        )
        .await?;
        Ok(ObjectReply {
            object: generation.object,
            usage: generation.usage,
        })
    }

    /// Stream a structured generation as progressively larger partial
    /// objects; the final element is the complete object.
    #[tracing::instrument(skip(self, messages, schema))]
    pub async fn stream_object(
        &self,
        messages: Vec<Message>,
        schema: Value,
    ) -> Result<ObjectStream> {
        let binding = self.binding().await?;
        binding.require(Capability::StructuredOutput)?;
        binding.require(Capability::Streaming)?;
        let schema = OutputSchema::Json(schema);
        let request = self.request(messages);
        let events = dispatch(
            "stream_object",
            &binding.provider_id,
            binding.model.stream_object(request, &schema),
        )
        .await?;
        Ok(ObjectStream::from_events(events))
    }

    /// Classify `text` into one of `categories`.
    ///
    /// The category list is passed to the provider verbatim as an enumerated
    /// output schema. The returned value is taken as-is and not re-checked
    /// against the set.
    #[tracing::instrument(skip(self, text, categories))]
    pub async fn classify<I, S>(
        &self,
        text: impl Into<String>,
        categories: I,
    ) -> Result<Classification>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let binding = self.binding().await?;
        binding.require(Capability::Classification)?;
        let schema = OutputSchema::choice(categories);
        let request = self.request(vec![Message::user(text)]);
        let generation = dispatch(
            "classify",
            &binding.provider_id,
            binding.model.generate_object(request, &schema),
        )
        .await?;
        let category = match generation.object {
            Value::String(s) => s,
            other => {
                return Err(ClientError::Decode(format!(
                    "Classification output was not a string: {}",
                    other
                )));
            }
        };
        Ok(Classification {
            category,
            usage: generation.usage,
        })
    }

    /// Chat with a local image attached: the file is read fully into memory
    /// and appended as one trailing user message. The media type is inferred
    /// from the file extension.
    #[tracing::instrument(skip(self, messages, path), fields(path = %path.as_ref().display()))]
    pub async fn chat_with_image_file(
        &self,
        messages: Vec<Message>,
        path: impl AsRef<Path>,
    ) -> Result<ChatReply> {
        let path = path.as_ref();
        let binding = self.binding().await?;
        binding.require(Capability::Text)?;
        binding.require(Capability::ImageInput)?;
        let data = read_attachment(path).await?;
        let media_type = media_type_for_path(path).map(str::to_string);
        let part = ContentPart::image_bytes(data, media_type);
        self.chat_with_part("chat_with_image_file", &binding, messages, part)
            .await
    }

    /// Chat with an image referenced by URL. No I/O happens locally; the
    /// URL is passed to the provider as-is.
    #[tracing::instrument(skip(self, messages, url))]
    pub async fn chat_with_image_url(
        &self,
        messages: Vec<Message>,
        url: impl Into<String>,
    ) -> Result<ChatReply> {
        let binding = self.binding().await?;
        binding.require(Capability::Text)?;
        binding.require(Capability::ImageInput)?;
        let part = ContentPart::image_url(url);
        self.chat_with_part("chat_with_image_url", &binding, messages, part)
            .await
    }

    /// Chat with a local file (PDF, text, CSV, …) attached: the file is read
    /// fully into memory and appended as one trailing user message.
    #[tracing::instrument(skip(self, messages, path), fields(path = %path.as_ref().display()))]
    pub async fn chat_with_file(
        &self,
        messages: Vec<Message>,
        path: impl AsRef<Path>,
    ) -> Result<ChatReply> {
        let path = path.as_ref();
        let binding = self.binding().await?;
        binding.require(Capability::Text)?;
        binding.require(Capability::FileInput)?;
        let part = file_part(path).await?;
        self.chat_with_part("chat_with_file", &binding, messages, part)
            .await
    }

    async fn chat_with_part(
        &self,
        op: &'static str,
        binding: &Binding,
        mut messages: Vec<Message>,
        part: ContentPart,
    ) -> Result<ChatReply> {
        messages.push(Message::with_parts(Role::User, vec![part]));
        let request = self.request(messages);
        let generation = dispatch(
            op,
            &binding.provider_id,
            binding.model.generate_text(request),
        )
        .await?;
        Ok(generation.into())
    }

    /// Attach a local file and generate a JSON object conforming to
    /// `schema`. The prompt describing what to extract travels in
    /// `messages`.
    #[tracing::instrument(skip(self, messages, path, schema), fields(path = %path.as_ref().display()))]
    pub async fn extract_from_file(
        &self,
        messages: Vec<Message>,
        path: impl AsRef<Path>,
        schema: Value,
    ) -> Result<ObjectReply> {
        self.extract_with(messages, path.as_ref(), OutputSchema::Json(schema))
            .await
    }

    /// Attach a local file and generate an object of type `T`.
    #[tracing::instrument(skip(self, messages, path), fields(path = %path.as_ref().display()))]
    pub async fn extract_from_file_as<T>(
        &self,
        messages: Vec<Message>,
        path: impl AsRef<Path>,
    ) -> Result<ObjectReply<T>>
    where
        T: schemars::JsonSchema + DeserializeOwned,
    {
        let schema = OutputSchema::of::<T>()?;
        let reply = self.extract_with(messages, path.as_ref(), schema).await?;
        typed(reply)
    }

    async fn extract_with(
        &self,
        mut messages: Vec<Message>,
        path: &Path,
        schema: OutputSchema,
    ) -> Result<ObjectReply> {
        let binding = self.binding().await?;
        binding.require(Capability::FileInput)?;
        binding.require(Capability::StructuredOutput)?;
        let part = file_part(path).await?;
        messages.push(Message::with_parts(Role::User, vec![part]));
        let request = self.request(messages);
        let generation = dispatch(
            "extract_from_file",
            &binding.provider_id,
            binding.model.generate_object(request, &schema),
        )
        .await?;
        Ok(ObjectReply {
            object: generation.object,
            usage: generation.usage,
        })
    }
}

/// Builds a [`ModelClient`].
#[derive(Default)]
pub struct ModelClientBuilder {
    registry: Option<ProviderRegistry>,
    spec: Option<ModelSpec>,
    smoothing: Smoothing,
    options: GenerationOptions,
}

impl ModelClientBuilder {
    /// Use a custom provider registry instead of the built-in one.
    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// The model to bind.
    pub fn model(mut self, spec: ModelSpec) -> Self {
        self.spec = Some(spec);
        self
    }

    /// Re-chunking applied to streamed text. Off by default.
    pub fn smoothing(mut self, smoothing: Smoothing) -> Self {
        self.smoothing = smoothing;
        self
    }

    /// Default sampling options applied to every request.
    pub fn generation_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Build without contacting the provider.
    ///
    /// The spec is vetted against the registry here; a spec that cannot be
    /// honored (unknown provider, invalid fields, bad options) is logged and
    /// dropped, leaving the client unconfigured. Connection failures surface
    /// on first use.
    pub fn build(self) -> ModelClient {
        let registry = Arc::new(self.registry.unwrap_or_default());
        let spec = self.spec.and_then(|spec| match vet(&registry, &spec) {
            Ok(()) => Some(spec),
            Err(e) => {
                tracing::warn!(
                    provider = %spec.provider_id,
                    model = %spec.model_id,
                    error = %e,
                    "Rejected model spec; the client starts unconfigured"
                );
                None
            }
        });
        ModelClient {
            registry,
            spec,
            smoothing: self.smoothing,
            options: self.options,
            bound: RwLock::new(None),
        }
    }

    /// Build and resolve the model binding immediately, so configuration
    /// mistakes fail here instead of on first call.
    pub async fn try_build(self) -> Result<ModelClient> {
        let registry = Arc::new(self.registry.unwrap_or_default());
        let spec = self.spec.ok_or(ClientError::Unconfigured)?;
        let (model, capabilities) = registry.resolve(&spec).await?;
        let binding = Arc::new(Binding {
            provider_id: spec.provider_id.clone(),
            model,
            capabilities,
        });
        Ok(ModelClient {
            registry,
            spec: Some(spec),
            smoothing: self.smoothing,
            options: self.options,
            bound: RwLock::new(Some(binding)),
        })
    }
}

fn vet(registry: &ProviderRegistry, spec: &ModelSpec) -> Result<()> {
    spec.validate()?;
    if !registry.contains(&spec.provider_id) {
        return Err(ClientError::ProviderNotFound(format!(
            "Provider '{}' not found",
            spec.provider_id
        )));
    }
    validate_provider_options(&spec.provider_id, &spec.options)
}

/// Await a provider call, recording call metrics and logging the fault if
/// one occurs.
async fn dispatch<T>(
    op: &'static str,
    provider_id: &str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tracing::debug!(op, provider = provider_id, "Dispatching model call");
    let start = std::time::Instant::now();
    let result = call.await;
    metrics::histogram!("model_call.duration_seconds").record(start.elapsed().as_secs_f64());
    let status = if result.is_ok() { "success" } else { "failure" };
    metrics::counter!(
        "model_call.total",
        "provider" => provider_id.to_string(),
        "op" => op,
        "status" => status
    )
    .increment(1);
    if let Err(e) = &result {
        tracing::warn!(op, provider = provider_id, error = %e, "Model call failed");
    }
    result
}

/// Read an attachment fully into memory, suspending the calling task until
/// the whole file is available. No size limit is enforced.
async fn read_attachment(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|source| ClientError::Attachment {
            path: path.to_path_buf(),
            source,
        })
}

async fn file_part(path: &Path) -> Result<ContentPart> {
    let data = read_attachment(path).await?;
    let media_type = media_type_for_path(path).unwrap_or("application/octet-stream");
    Ok(ContentPart::file(data, media_type))
}

fn typed<T: DeserializeOwned>(reply: ObjectReply) -> Result<ObjectReply<T>> {
    let object = serde_json::from_value(reply.object).map_err(|e| {
        ClientError::Decode(format!(
            "Structured output did not match the requested type: {}",
            e
        ))
    })?;
    Ok(ObjectReply {
        object,
        usage: reply.usage,
    })
}
