use crate::api::ModelSpec;
use crate::error::{ClientError, Result};
use crate::message::{ContentPart, ImageSource, Message, MessageContent, Role};
use crate::provider::reasoning::{TagScanner, split_tagged};
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

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_REASONING_TAG: &str = "think";

/// Provider for the [OpenAI chat completions API](https://platform.openai.com/docs/api-reference/chat)
/// and any OpenAI-compatible backend reachable via the `base_url` option.
///
/// Requires the `OPENAI_API_KEY` environment variable (or a custom env var
/// name via the `api_key_env` option, or an explicit key on the spec).
pub struct OpenAiProvider {
    base: RemoteProviderBase,
}

impl Default for OpenAiProvider {
    fn default() -> Self {
        Self {
            base: RemoteProviderBase::new(),
        }
    }
}

impl OpenAiProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn provider_id(&self) -> &'static str {
        "openai"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::full()
    }

    async fn connect(&self, spec: &ModelSpec) -> Result<Arc<dyn LanguageModel>> {
        let api_key = resolve_api_key(spec, "OPENAI_API_KEY")?;
        let base_url = resolve_base_url(spec, OPENAI_API_BASE);
        let organization = spec
            .options
            .get("organization")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let reasoning_tag = spec
            .options
            .get("reasoning_tag")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_REASONING_TAG)
            .to_string();

        Ok(Arc::new(OpenAiChatModel {
            client: self.base.client.clone(),
            model_id: spec.model_id.clone(),
            api_key,
            base_url,
            organization,
            reasoning_tag,
        }))
    }

    async fn health(&self) -> ProviderHealth {
        ProviderHealth::Healthy
    }
}

/// Chat model bound to one OpenAI model ID.
struct OpenAiChatModel {
    client: Client,
    model_id: String,
    api_key: String,
    base_url: String,
    organization: Option<String>,
    reasoning_tag: String,
}

impl OpenAiChatModel {
    async fn post(&self, payload: &Value) -> Result<reqwest::Response> {
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key));
        if let Some(org) = &self.organization {
            request = request.header("OpenAI-Organization", org);
        }
        let response = request
            .json(payload)
            .send()
            .await
            .map_err(|e| map_transport_error("OpenAI", e))?;
        check_http_status("OpenAI", response)
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate_text(&self, request: GenerationRequest) -> Result<TextGeneration> {
        let payload = build_chat_payload(&self.model_id, &request, false);
        let body: Value = self
            .post(&payload)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Api(e.to_string()))?;
        Ok(parse_text_response(&body, &self.reasoning_tag))
    }

    async fn stream_text(&self, request: GenerationRequest) -> Result<EventStream> {
        let payload = build_chat_payload(&self.model_id, &request, true);
        let response = self.post(&payload).await?;
        Ok(decode_event_stream(
            response.sse_data("OpenAI"),
            Some(TagScanner::new(&self.reasoning_tag)),
        ))
    }

    async fn generate_object(
        &self,
        request: GenerationRequest,
        schema: &OutputSchema,
    ) -> Result<ObjectGeneration> {
        let mut payload = build_chat_payload(&self.model_id, &request, false);
        payload["response_format"] = response_format_for(schema);
        let body: Value = self
            .post(&payload)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Api(e.to_string()))?;

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ClientError::Decode("response has no message content".to_string()))?;
        Ok(ObjectGeneration {
            object: decode_object(content, schema)?,
            usage: parse_usage(body.get("usage")),
        })
    }

    async fn stream_object(
        &self,
        request: GenerationRequest,
        schema: &OutputSchema,
    ) -> Result<EventStream> {
        let mut payload = build_chat_payload(&self.model_id, &request, true);
        payload["response_format"] = response_format_for(schema);
        let response = self.post(&payload).await?;
        // No tag scanning in object mode: the text channel carries raw JSON.
        Ok(decode_event_stream(response.sse_data("OpenAI"), None))
    }
}

// ---------------------------------------------------------------------------
// Payload construction
// ---------------------------------------------------------------------------

fn build_chat_payload(model_id: &str, request: &GenerationRequest, stream: bool) -> Value {
    let messages: Vec<Value> = request.messages.iter().map(message_to_value).collect();
    let mut payload = json!({
        "model": model_id,
        "messages": messages,
    });

    if let Some(max_tokens) = request.options.max_tokens {
        payload["max_tokens"] = json!(max_tokens);
    }
    if let Some(temperature) = request.options.temperature {
        payload["temperature"] = json!(temperature);
    }
    if let Some(top_p) = request.options.top_p {
        payload["top_p"] = json!(top_p);
    }
    if stream {
        payload["stream"] = json!(true);
        payload["stream_options"] = json!({ "include_usage": true });
    }
    payload
}

fn message_to_value(message: &Message) -> Value {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    let content = match &message.content {
        MessageContent::Text(text) => json!(text),
        MessageContent::Parts(parts) => Value::Array(parts.iter().map(part_to_value).collect()),
    };
    json!({ "role": role, "content": content })
}

fn part_to_value(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text { text } => json!({ "type": "text", "text": text }),
        ContentPart::Image {
            source: ImageSource::Url { url },
        } => json!({
            "type": "image_url",
            "image_url": { "url": url }
        }),
        ContentPart::Image {
            source: ImageSource::Bytes { data, media_type },
        } => {
            let media_type = media_type.as_deref().unwrap_or("image/png");
            json!({
                "type": "image_url",
                "image_url": { "url": data_url(media_type, data) }
            })
        }
        ContentPart::File { data, media_type } => json!({
            "type": "file",
            "file": {
                "filename": attachment_filename(media_type),
                "file_data": data_url(media_type, data),
            }
        }),
    }
}

fn data_url(media_type: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", media_type, STANDARD.encode(data))
}

/// The file part requires a filename; attachments arrive as bare bytes, so
/// one is synthesized from the media type.
fn attachment_filename(media_type: &str) -> String {
    let ext = match media_type {
        "application/pdf" => "pdf",
        "text/plain" => "txt",
        "text/markdown" => "md",
        "text/csv" => "csv",
        "text/html" => "html",
        "application/json" => "json",
        "application/xml" => "xml",
        _ => "bin",
    };
    format!("attachment.{ext}")
}

fn response_format_for(schema: &OutputSchema) -> Value {
    let schema_value = match schema {
        OutputSchema::Json(schema) => schema.clone(),
        // Strict mode requires an object at the schema root, so a choice is
        // carried in a single "value" property and unwrapped on decode.
        OutputSchema::Choice(values) => json!({
            "type": "object",
            "properties": { "value": { "type": "string", "enum": values } },
            "required": ["value"],
            "additionalProperties": false
        }),
    };
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "structured_output",
            "strict": true,
            "schema": schema_value
        }
    })
}

// ---------------------------------------------------------------------------
// Response decoding
// ---------------------------------------------------------------------------

fn parse_text_response(body: &Value, reasoning_tag: &str) -> TextGeneration {
    let message = &body["choices"][0]["message"];
    let content = message["content"].as_str().unwrap_or("").to_string();
    let native_reasoning = message["reasoning_content"]
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string);

    let (text, reasoning) = match native_reasoning {
        Some(reasoning) => (content, Some(reasoning)),
        None => split_tagged(&content, reasoning_tag),
    };

    TextGeneration {
        text,
        reasoning,
        usage: parse_usage(body.get("usage")),
    }
}

fn parse_usage(usage: Option<&Value>) -> Option<TokenUsage> {
    let u = usage?;
    if u.is_null() {
        return None;
    }
    Some(TokenUsage {
        prompt_tokens: u["prompt_tokens"].as_u64().unwrap_or(0) as usize,
        completion_tokens: u["completion_tokens"].as_u64().unwrap_or(0) as usize,
        total_tokens: u["total_tokens"].as_u64().unwrap_or(0) as usize,
    })
}

fn decode_object(content: &str, schema: &OutputSchema) -> Result<Value> {
    let value: Value = serde_json::from_str(content.trim())
        .map_err(|e| ClientError::Decode(format!("structured output is not valid JSON: {e}")))?;
    unwrap_choice(value, schema)
}

/// Decode OpenAI stream chunks into [`StreamEvent`]s. With a scanner, content
/// deltas pass through inline-reasoning extraction; without one they are
/// forwarded verbatim (object mode).
fn decode_event_stream(payloads: SseStream, scanner: Option<TagScanner>) -> EventStream {
    struct DecodeState {
        payloads: SseStream,
        scanner: Option<TagScanner>,
        pending: VecDeque<Result<StreamEvent>>,
        ended: bool,
    }

    let state = DecodeState {
        payloads,
        scanner,
        pending: VecDeque::new(),
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
                    Ok(chunk) => decode_chunk(&chunk, &mut state.scanner, &mut state.pending),
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
                    if let Some(scanner) = &mut state.scanner {
                        for event in scanner.finish() {
                            state.pending.push_back(Ok(event));
                        }
                    }
                    state.pending.push_back(Ok(StreamEvent::Done));
                }
            }
        }
    }))
}

fn decode_chunk(
    chunk: &Value,
    scanner: &mut Option<TagScanner>,
    out: &mut VecDeque<Result<StreamEvent>>,
) {
    if let Some(error) = chunk.get("error")
        && !error.is_null()
    {
        let detail = error["message"].as_str().unwrap_or("stream error").to_string();
        out.push_back(Err(ClientError::Api(detail)));
        return;
    }

    let delta = &chunk["choices"][0]["delta"];
    if let Some(reasoning) = delta["reasoning_content"].as_str()
        && !reasoning.is_empty()
    {
        out.push_back(Ok(StreamEvent::Reasoning(reasoning.to_string())));
    }
    if let Some(content) = delta["content"].as_str()
        && !content.is_empty()
    {
        match scanner {
            Some(scanner) => {
                for event in scanner.feed(content) {
                    out.push_back(Ok(event));
                }
            }
            None => out.push_back(Ok(StreamEvent::Text(content.to_string()))),
        }
    }
    if let Some(usage) = parse_usage(chunk.get("usage")) {
        out.push_back(Ok(StreamEvent::Usage(usage)));
    }
}
