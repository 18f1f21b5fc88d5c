//! The provider registry that maps provider ids to implementations and
//! resolves model specs into bound handles.

use crate::api::ModelSpec;
use crate::error::{ClientError, Result};
use crate::options_validation::validate_provider_options;
use crate::traits::{ChatProvider, LanguageModel, ProviderCapabilities};
use std::collections::HashMap;
use std::sync::Arc;

/// Maps provider ids (e.g. `"openai"`) to [`ChatProvider`] implementations.
///
/// A registry with the built-in providers is the default; library users add
/// their own backends with [`register`](Self::register). Registries are
/// consulted once, at client construction, to resolve a [`ModelSpec`] into a
/// model handle.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ChatProvider>>,
}

impl ProviderRegistry {
    /// An empty registry with no providers.
    pub fn empty() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// A registry holding every built-in provider whose Cargo feature is
    /// enabled.
    pub fn builtin() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::empty();
        #[cfg(feature = "provider-openai")]
        {
            registry = registry.register(crate::provider::OpenAiProvider::new());
        }
        #[cfg(feature = "provider-anthropic")]
        {
            registry = registry.register(crate::provider::AnthropicProvider::new());
        }
        #[cfg(feature = "provider-gemini")]
        {
            registry = registry.register(crate::provider::GeminiProvider::new());
        }
        registry
    }

    /// Register a provider. The provider's
    /// [`provider_id`](ChatProvider::provider_id) is used as the lookup key;
    /// registering a second provider with the same ID replaces the first.
    pub fn register<P: ChatProvider + 'static>(mut self, provider: P) -> Self {
        self.providers
            .insert(provider.provider_id().to_string(), Arc::new(provider));
        self
    }

    /// Check whether a provider id is registered.
    pub fn contains(&self, provider_id: &str) -> bool {
        self.providers.contains_key(provider_id)
    }

    /// Look up a provider by id.
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn ChatProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// The ids of all registered providers, in no particular order.
    pub fn provider_ids(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// Validate `spec`, dispatch to its provider, and return the bound model
    /// handle together with the provider's advertised capabilities.
    #[tracing::instrument(skip(self, spec), fields(provider = %spec.provider_id, model = %spec.model_id))]
    pub async fn resolve(
        &self,
        spec: &ModelSpec,
    ) -> Result<(Arc<dyn LanguageModel>, ProviderCapabilities)> {
        spec.validate()?;
        let provider = self.get(&spec.provider_id).ok_or_else(|| {
            ClientError::ProviderNotFound(format!("Provider '{}' not found", spec.provider_id))
        })?;
        validate_provider_options(&spec.provider_id, &spec.options)?;

        tracing::debug!(model = %spec.model_id, "Connecting model handle");
        let start = std::time::Instant::now();
        let connected = provider.connect(spec).await;
        metrics::histogram!("model_connect.duration_seconds")
            .record(start.elapsed().as_secs_f64());

        match connected {
            Ok(model) => {
                metrics::counter!("model_connect.total", "status" => "success").increment(1);
                Ok((model, provider.capabilities()))
            }
            Err(e) => {
                metrics::counter!("model_connect.total", "status" => "failure").increment(1);
                tracing::error!(provider = %spec.provider_id, error = %e, "Model connect failed");
                Err(e)
            }
        }
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
