use crate::api::ModelSpec;
use crate::error::{ClientError, Result};
use crate::message::{ContentPart, ImageSource, Message, MessageContent, Role};
use crate::provider::remote_common::{
    RemoteProviderBase, check_http_status, map_transport_error, resolve_api_key, resolve_base_url,
    unwrap_choice,
};
use crate::provider::sse::{SseResponseExt, SseStream};
use crate::stream::{EventStream, StreamEvent};
use crate::traits::{
    ChatProvider, GenerationRequest, LanguageModel, ObjectGeneration, OutputSchema,
    ProviderCapabilities, ProviderHealth, TextGeneration, TokenUsage,
};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Arc;

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";
// The messages API rejects requests without max_tokens.
const DEFAULT_MAX_TOKENS: u64 = 1024;
const STRUCTURED_TOOL: &str = "structured_output";

/// Provider for the [Anthropic messages API](https://docs.anthropic.com/en/api/messages).
///
/// Requires the `ANTHROPIC_API_KEY` environment variable (or a custom env var
/// name via the `api_key_env` option, or an explicit key on the spec).
/// Structured output is obtained by forcing a single tool call whose input
/// schema is the requested schema.
pub struct AnthropicProvider {
    base: RemoteProviderBase,
}

impl Default for AnthropicProvider {
    fn default() -> Self {
        Self {
            base: RemoteProviderBase::new(),
        }
    }
}

impl AnthropicProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn provider_id(&self) -> &'static str {
        "anthropic"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::full()
    }

    async fn connect(&self, spec: &ModelSpec) -> Result<Arc<dyn LanguageModel>> {
        let api_key = resolve_api_key(spec, "ANTHROPIC_API_KEY")?;
        let base_url = resolve_base_url(spec, ANTHROPIC_API_BASE);
        let version = spec
            .options
            .get("anthropic_version")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_ANTHROPIC_VERSION)
            .to_string();
        let default_max_tokens = spec
            .options
            .get("max_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        Ok(Arc::new(AnthropicChatModel {
            client: self.base.client.clone(),
            model_id: spec.model_id.clone(),
            api_key,
            base_url,
            version,
            default_max_tokens,
        }))
    }

    async fn health(&self) -> ProviderHealth {
        ProviderHealth::Healthy
    }
}

/// Chat model bound to one Anthropic model ID.
struct AnthropicChatModel {
    client: Client,
    model_id: String,
    api_key: String,
    base_url: String,
    version: String,
    default_max_tokens: u64,
}

impl AnthropicChatModel {
    async fn post(&self, payload: &Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.version)
            .json(payload)
            .send()
            .await
            .map_err(|e| map_transport_error("Anthropic", e))?;
        check_http_status("Anthropic", response)
    }
}

#[async_trait]
impl LanguageModel for AnthropicChatModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate_text(&self, request: GenerationRequest) -> Result<TextGeneration> {
        let payload = build_chat_payload(&self.model_id, &request, self.default_max_tokens, false);
        let body: Value = self
            .post(&payload)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Api(e.to_string()))?;
        Ok(parse_text_response(&body))
    }

    async fn stream_text(&self, request: GenerationRequest) -> Result<EventStream> {
        let payload = build_chat_payload(&self.model_id, &request, self.default_max_tokens, true);
        let response = self.post(&payload).await?;
        Ok(decode_event_stream(response.sse_data("Anthropic")))
    }

    async fn generate_object(
        &self,
        request: GenerationRequest,
        schema: &OutputSchema,
    ) -> Result<ObjectGeneration> {
        let mut payload =
            build_chat_payload(&self.model_id, &request, self.default_max_tokens, false);
        attach_structured_tool(&mut payload, schema);
        let body: Value = self
            .post(&payload)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Api(e.to_string()))?;
        parse_object_response(&body, schema)
    }

    async fn stream_object(
        &self,
        request: GenerationRequest,
        schema: &OutputSchema,
    ) -> Result<EventStream> {
        let mut payload =
            build_chat_payload(&self.model_id, &request, self.default_max_tokens, true);
        attach_structured_tool(&mut payload, schema);
        let response = self.post(&payload).await?;
        // Tool input arrives as input_json_delta fragments, surfaced as text
        // events carrying raw JSON.
        Ok(decode_event_stream(response.sse_data("Anthropic")))
    }
}

// ---------------------------------------------------------------------------
// Payload construction
// ---------------------------------------------------------------------------

/// System messages move to the top-level `system` field; the `messages` array
/// only carries user and assistant turns.
fn build_messages_payload(messages: &[Message]) -> (Option<String>, Vec<Value>) {
    let mut system_parts = Vec::new();
    let mut turns = Vec::new();

    for message in messages {
        if message.role == Role::System {
            system_parts.push(message.content.text());
            continue;
        }
        let role = match message.role {
            Role::Assistant => "assistant",
            _ => "user",
        };
        let content = match &message.content {
            MessageContent::Text(text) => json!(text),
            MessageContent::Parts(parts) => Value::Array(parts.iter().map(part_to_block).collect()),
        };
        turns.push(json!({ "role": role, "content": content }));
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system, turns)
}

fn part_to_block(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text { text } => json!({ "type": "text", "text": text }),
        ContentPart::Image {
            source: ImageSource::Bytes { data, media_type },
        } => json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": media_type.as_deref().unwrap_or("image/png"),
                "data": STANDARD.encode(data),
            }
        }),
        ContentPart::Image {
            source: ImageSource::Url { url },
        } => json!({
            "type": "image",
            "source": { "type": "url", "url": url }
        }),
        ContentPart::File { data, media_type } => json!({
            "type": "document",
            "source": {
                "type": "base64",
                "media_type": media_type,
                "data": STANDARD.encode(data),
            }
        }),
    }
}

fn build_chat_payload(
    model_id: &str,
    request: &GenerationRequest,
    default_max_tokens: u64,
    stream: bool,
) -> Value {
    let (system, messages) = build_messages_payload(&request.messages);
    let max_tokens = request
        .options
        .max_tokens
        .map(|m| m as u64)
        .unwrap_or(default_max_tokens);

    let mut payload = json!({
        "model": model_id,
        "max_tokens": max_tokens,
        "messages": messages,
    });
    if let Some(system) = system {
        payload["system"] = json!(system);
    }
    if let Some(temperature) = request.options.temperature {
        payload["temperature"] = json!(temperature);
    }
    if let Some(top_p) = request.options.top_p {
        payload["top_p"] = json!(top_p);
    }
    if stream {
        payload["stream"] = json!(true);
    }
    payload
}

fn attach_structured_tool(payload: &mut Value, schema: &OutputSchema) {
    // Tool inputs must be objects, so a choice is carried in a single
    // "value" property and unwrapped on decode.
    let input_schema = match schema {
        OutputSchema::Json(schema) => schema.clone(),
        OutputSchema::Choice(values) => json!({
            "type": "object",
            "properties": { "value": { "type": "string", "enum": values } },
            "required": ["value"]
        }),
    };
    payload["tools"] = json!([{
        "name": STRUCTURED_TOOL,
        "description": "Record the structured answer.",
        "input_schema": input_schema
    }]);
    payload["tool_choice"] = json!({ "type": "tool", "name": STRUCTURED_TOOL });
}

// ---------------------------------------------------------------------------
// Response decoding
// ---------------------------------------------------------------------------

fn parse_text_response(body: &Value) -> TextGeneration {
    let mut text = String::new();
    let mut reasoning = String::new();
    if let Some(blocks) = body["content"].as_array() {
        for block in blocks {
            match block["type"].as_str() {
                Some("text") => text.push_str(block["text"].as_str().unwrap_or("")),
                Some("thinking") => reasoning.push_str(block["thinking"].as_str().unwrap_or("")),
                _ => {}
            }
        }
    }

    let reasoning = if reasoning.is_empty() {
        None
    } else {
        Some(reasoning)
    };
    TextGeneration {
        text,
        reasoning,
        usage: parse_usage(body.get("usage")),
    }
}

fn parse_object_response(body: &Value, schema: &OutputSchema) -> Result<ObjectGeneration> {
    let blocks = body["content"]
        .as_array()
        .ok_or_else(|| ClientError::Decode("response has no content blocks".to_string()))?;
    let input = blocks
        .iter()
        .find(|b| b["type"] == "tool_use" && b["name"] == STRUCTURED_TOOL)
        .map(|b| b["input"].clone())
        .ok_or_else(|| ClientError::Decode("response has no structured tool call".to_string()))?;

    Ok(ObjectGeneration {
        object: unwrap_choice(input, schema)?,
        usage: parse_usage(body.get("usage")),
    })
}

fn parse_usage(usage: Option<&Value>) -> Option<TokenUsage> {
    let u = usage?;
    if u.is_null() {
        return None;
    }
    let prompt = u["input_tokens"].as_u64().unwrap_or(0) as usize;
    let completion = u["output_tokens"].as_u64().unwrap_or(0) as usize;
    Some(TokenUsage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: prompt + completion,
    })
}

/// Decode Anthropic stream events. Prompt tokens arrive in `message_start`
/// and completion tokens in `message_delta`; the combined usage event is
/// emitted once the latter is seen.
fn decode_event_stream(payloads: SseStream) -> EventStream {
    struct DecodeState {
        payloads: SseStream,
        pending: VecDeque<Result<StreamEvent>>,
        prompt_tokens: usize,
        ended: bool,
    }

    let state = DecodeState {
        payloads,
        pending: VecDeque::new(),
        prompt_tokens: 0,
        ended: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }
            if state.ended {
                return None;
            }
            match state.payloads.next().await {
                Some(Ok(data)) => match serde_json::from_str::<Value>(&data) {
                    Ok(chunk) => decode_chunk(&chunk, &mut state.prompt_tokens, &mut state.pending),
                    Err(e) => {
                        state.ended = true;
                        state.pending.push_back(Err(ClientError::Decode(format!(
                            "malformed stream chunk: {e}"
                        ))));
                    }
                },
                Some(Err(e)) => {
                    state.ended = true;
                    state.pending.push_back(Err(e));
                }
                None => {
                    state.ended = true;
                    state.pending.push_back(Ok(StreamEvent::Done));
                }
            }
        }
    }))
}

fn decode_chunk(chunk: &Value, prompt_tokens: &mut usize, out: &mut VecDeque<Result<StreamEvent>>) {
    match chunk["type"].as_str() {
        Some("message_start") => {
            *prompt_tokens = chunk["message"]["usage"]["input_tokens"]
                .as_u64()
                .unwrap_or(0) as usize;
        }
        Some("content_block_delta") => {
            let delta = &chunk["delta"];
            match delta["type"].as_str() {
                Some("text_delta") => {
                    if let Some(text) = delta["text"].as_str()
                        && !text.is_empty()
                    {
                        out.push_back(Ok(StreamEvent::Text(text.to_string())));
                    }
                }
                Some("thinking_delta") => {
                    if let Some(thinking) = delta["thinking"].as_str()
                        && !thinking.is_empty()
                    {
                        out.push_back(Ok(StreamEvent::Reasoning(thinking.to_string())));
                    }
                }
                Some("input_json_delta") => {
                    if let Some(fragment) = delta["partial_json"].as_str()
                        && !fragment.is_empty()
                    {
                        out.push_back(Ok(StreamEvent::Text(fragment.to_string())));
                    }
                }
                _ => {}
            }
        }
        Some("message_delta") => {
            let completion = chunk["usage"]["output_tokens"].as_u64().unwrap_or(0) as usize;
            out.push_back(Ok(StreamEvent::Usage(TokenUsage {
                prompt_tokens: *prompt_tokens,
                completion_tokens: completion,
                total_tokens: *prompt_tokens + completion,
            })));
        }
        Some("error") => {
            let detail = chunk["error"]["message"]
                .as_str()
                .unwrap_or("stream error")
                .to_string();
            out.push_back(Err(ClientError::Api(detail)));
        }
        // message_stop, content_block_start/stop, ping: nothing to surface.
        _ => {}
    }
}
