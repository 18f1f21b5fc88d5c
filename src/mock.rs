#![allow(dead_code)]

//! Mock implementations for testing
//!
//! This module provides a scriptable provider/model pair for testing the
//! client facade without network access. All types are gated with
//! `#[cfg(test)]`.

use crate::api::ModelSpec;
use crate::error::{ClientError, Result};
use crate::stream::{EventStream, StreamEvent};
use crate::traits::{
    ChatProvider, GenerationRequest, LanguageModel, ObjectGeneration, OutputSchema,
    ProviderCapabilities, ProviderHealth, TextGeneration, TokenUsage,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// What a [`MockLanguageModel`] answers with.
#[derive(Debug, Clone, Default)]
pub enum MockBehavior {
    /// Answer with the text of the last message. For choice-constrained
    /// structured calls, answer with the first allowed value.
    #[default]
    Echo,
    /// Answer with this text (and optional reasoning).
    Text {
        text: String,
        reasoning: Option<String>,
    },
    /// Answer structured calls with this object.
    Object(Value),
    /// Fail every call with an API error carrying this detail.
    Fail(String),
}

/// Shared observation point for a mock provider and the models it hands out.
///
/// The provider keeps an `Arc` to this state and every connected model
/// shares it, so tests keep visibility after the provider moves into a
/// registry.
#[derive(Default)]
pub struct MockState {
    pub behavior: Mutex<MockBehavior>,
    pub usage: Mutex<Option<TokenUsage>>,
    pub calls: AtomicU32,
    pub requests: Mutex<Vec<GenerationRequest>>,
    pub schemas: Mutex<Vec<OutputSchema>>,
}

impl MockState {
    /// Number of generation calls (text, object, or streaming) so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The most recent request, if any call was made.
    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    /// The most recent output schema a structured call received.
    pub fn last_schema(&self) -> Option<OutputSchema> {
        self.schemas.lock().unwrap().last().cloned()
    }

    fn record(&self, request: &GenerationRequest) -> MockBehavior {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        self.behavior.lock().unwrap().clone()
    }

    fn record_with_schema(
        &self,
        request: &GenerationRequest,
        schema: &OutputSchema,
    ) -> MockBehavior {
        self.schemas.lock().unwrap().push(schema.clone());
        self.record(request)
    }

    fn usage(&self) -> Option<TokenUsage> {
        *self.usage.lock().unwrap()
    }
}

/// Mock chat provider with scriptable model behavior.
pub struct MockChatProvider {
    pub connect_count: Arc<AtomicU32>,
    pub state: Arc<MockState>,
    capabilities: ProviderCapabilities,
    connect_error: Option<String>,
}

impl MockChatProvider {
    pub fn new() -> Self {
        Self {
            connect_count: Arc::new(AtomicU32::new(0)),
            state: Arc::new(MockState::default()),
            capabilities: ProviderCapabilities::full(),
            connect_error: None,
        }
    }

    pub fn with_behavior(self, behavior: MockBehavior) -> Self {
        *self.state.behavior.lock().unwrap() = behavior;
        self
    }

    pub fn with_usage(self, usage: TokenUsage) -> Self {
        *self.state.usage.lock().unwrap() = Some(usage);
        self
    }

    pub fn with_capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn failing_connect(mut self, detail: impl Into<String>) -> Self {
        self.connect_error = Some(detail.into());
        self
    }
}

impl Default for MockChatProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatProvider for MockChatProvider {
    fn provider_id(&self) -> &'static str {
        "mock/chat"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities.clone()
    }

    async fn connect(&self, spec: &ModelSpec) -> Result<Arc<dyn LanguageModel>> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        if let Some(detail) = &self.connect_error {
            return Err(ClientError::Config(detail.clone()));
        }
        Ok(Arc::new(MockLanguageModel {
            model_id: spec.model_id.clone(),
            state: self.state.clone(),
        }))
    }

    async fn health(&self) -> ProviderHealth {
        ProviderHealth::Healthy
    }
}

/// Mock model. Every handle connected from one provider shares that
/// provider's [`MockState`].
pub struct MockLanguageModel {
    model_id: String,
    state: Arc<MockState>,
}

impl MockLanguageModel {
    fn answer_text(behavior: MockBehavior, request: &GenerationRequest) -> Result<TextGeneration> {
        let (text, reasoning) = match behavior {
            MockBehavior::Fail(detail) => return Err(ClientError::Api(detail)),
            MockBehavior::Echo => (last_text(request), None),
            MockBehavior::Text { text, reasoning } => (text, reasoning),
            MockBehavior::Object(value) => (value.to_string(), None),
        };
        Ok(TextGeneration {
            text,
            reasoning,
            usage: None,
        })
    }

    fn answer_object(
        behavior: MockBehavior,
        request: &GenerationRequest,
        schema: &OutputSchema,
    ) -> Result<Value> {
        match behavior {
            MockBehavior::Fail(detail) => Err(ClientError::Api(detail)),
            MockBehavior::Object(value) => Ok(value),
            MockBehavior::Echo | MockBehavior::Text { .. } => match schema {
                OutputSchema::Choice(values) => Ok(Value::String(
                    values.first().cloned().unwrap_or_default(),
                )),
                OutputSchema::Json(_) => Ok(serde_json::json!({ "echo": last_text(request) })),
            },
        }
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate_text(&self, request: GenerationRequest) -> Result<TextGeneration> {
        let behavior = self.state.record(&request);
        let mut generation = Self::answer_text(behavior, &request)?;
        generation.usage = self.state.usage();
        Ok(generation)
    }

    async fn stream_text(&self, request: GenerationRequest) -> Result<EventStream> {
        let behavior = self.state.record(&request);
        let generation = Self::answer_text(behavior, &request)?;

        let mut events: Vec<Result<StreamEvent>> = Vec::new();
        if let Some(reasoning) = generation.reasoning {
            events.push(Ok(StreamEvent::Reasoning(reasoning)));
        }
        for chunk in split_in_two(&generation.text) {
            events.push(Ok(StreamEvent::Text(chunk)));
        }
        if let Some(usage) = self.state.usage() {
            events.push(Ok(StreamEvent::Usage(usage)));
        }
        events.push(Ok(StreamEvent::Done));
        Ok(Box::pin(futures::stream::iter(events)))
    }

    async fn generate_object(
        &self,
        request: GenerationRequest,
        schema: &OutputSchema,
    ) -> Result<ObjectGeneration> {
        let behavior = self.state.record_with_schema(&request, schema);
        let object = Self::answer_object(behavior, &request, schema)?;
        Ok(ObjectGeneration {
            object,
            usage: self.state.usage(),
        })
    }

    async fn stream_object(
        &self,
        request: GenerationRequest,
        schema: &OutputSchema,
    ) -> Result<EventStream> {
        let behavior = self.state.record_with_schema(&request, schema);
        let object = Self::answer_object(behavior, &request, schema)?;

        let mut events: Vec<Result<StreamEvent>> = split_in_two(&object.to_string())
            .into_iter()
            .map(|chunk| Ok(StreamEvent::Text(chunk)))
            .collect();
        if let Some(usage) = self.state.usage() {
            events.push(Ok(StreamEvent::Usage(usage)));
        }
        events.push(Ok(StreamEvent::Done));
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

fn last_text(request: &GenerationRequest) -> String {
    request
        .messages
        .last()
        .map(|m| m.content.text())
        .unwrap_or_default()
}

/// Split at a char boundary near the middle so streaming paths see more
/// than one delta.
fn split_in_two(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let mid = text
        .char_indices()
        .nth(text.chars().count() / 2)
        .map(|(i, _)| i)
        .unwrap_or(0);
    if mid == 0 {
        return vec![text.to_string()];
    }
    vec![text[..mid].to_string(), text[mid..].to_string()]
}
