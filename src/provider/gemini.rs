use crate::api::ModelSpec;
use crate::error::{ClientError, Result};
use crate::message::{ContentPart, ImageSource, MessageContent, Role, media_type_for_path};
use crate::provider::remote_common::{
    RemoteProviderBase, check_http_status, map_transport_error, resolve_api_key, resolve_base_url,
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

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Provider for the [Google Gemini API](https://ai.google.dev/api)
/// (`generateContent` and `streamGenerateContent`).
///
/// Requires the `GEMINI_API_KEY` environment variable (or a custom env var
/// name via the `api_key_env` option, or an explicit key on the spec).
pub struct GeminiProvider {
    base: RemoteProviderBase,
}

impl Default for GeminiProvider {
    fn default() -> Self {
        Self {
            base: RemoteProviderBase::new(),
        }
    }
}

impl GeminiProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn provider_id(&self) -> &'static str {
        "gemini"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::full()
    }

    async fn connect(&self, spec: &ModelSpec) -> Result<Arc<dyn LanguageModel>> {
        let api_key = resolve_api_key(spec, "GEMINI_API_KEY")?;
        let base_url = resolve_base_url(spec, GEMINI_API_BASE);

        Ok(Arc::new(GeminiChatModel {
            client: self.base.client.clone(),
            model_id: spec.model_id.clone(),
            api_key,
            base_url,
        }))
    }

    async fn health(&self) -> ProviderHealth {
        ProviderHealth::Healthy
    }
}

/// Chat model bound to one Gemini model ID.
struct GeminiChatModel {
    client: Client,
    model_id: String,
    api_key: String,
    base_url: String,
}

impl GeminiChatModel {
    async fn post(&self, method: &str, payload: &Value) -> Result<reqwest::Response> {
        let url = format!(
            "{}/models/{}:{}?key={}",
            self.base_url, self.model_id, method, self.api_key
        );
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| map_transport_error("Gemini", e))?;
        check_http_status("Gemini", response)
    }

    async fn post_stream(&self, payload: &Value) -> Result<reqwest::Response> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, self.model_id, self.api_key
        );
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| map_transport_error("Gemini", e))?;
        check_http_status("Gemini", response)
    }
}

#[async_trait]
impl LanguageModel for GeminiChatModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate_text(&self, request: GenerationRequest) -> Result<TextGeneration> {
        let payload = build_generate_payload(&request, None);
        let body: Value = self
            .post("generateContent", &payload)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Api(e.to_string()))?;
        parse_text_response(&body)
    }

    async fn stream_text(&self, request: GenerationRequest) -> Result<EventStream> {
        let payload = build_generate_payload(&request, None);
        let response = self.post_stream(&payload).await?;
        Ok(decode_event_stream(response.sse_data("Gemini")))
    }

    async fn generate_object(
        &self,
        request: GenerationRequest,
        schema: &OutputSchema,
    ) -> Result<ObjectGeneration> {
        let payload = build_generate_payload(&request, Some(schema));
        let body: Value = self
            .post("generateContent", &payload)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Api(e.to_string()))?;

        let generation = parse_text_response(&body)?;
        Ok(ObjectGeneration {
            object: decode_object(&generation.text, schema)?,
            usage: generation.usage,
        })
    }

    async fn stream_object(
        &self,
        request: GenerationRequest,
        schema: &OutputSchema,
    ) -> Result<EventStream> {
        let payload = build_generate_payload(&request, Some(schema));
        let response = self.post_stream(&payload).await?;
        Ok(decode_event_stream(response.sse_data("Gemini")))
    }
}

// ---------------------------------------------------------------------------
// Payload construction
// ---------------------------------------------------------------------------

/// System messages move to `systemInstruction`; the rest become `contents`
/// with roles `"user"` and `"model"`.
fn build_generate_payload(request: &GenerationRequest, schema: Option<&OutputSchema>) -> Value {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();

    for message in &request.messages {
        if message.role == Role::System {
            system_parts.push(json!({ "text": message.content.text() }));
            continue;
        }
        let role = match message.role {
            Role::Assistant => "model",
            _ => "user",
        };
        let parts: Vec<Value> = match &message.content {
            MessageContent::Text(text) => vec![json!({ "text": text })],
            MessageContent::Parts(parts) => parts.iter().map(part_to_value).collect(),
        };
        contents.push(json!({ "role": role, "parts": parts }));
    }

    let mut payload = serde_json::Map::new();
    payload.insert("contents".to_string(), json!(contents));
    if !system_parts.is_empty() {
        payload.insert(
            "systemInstruction".to_string(),
            json!({ "parts": system_parts }),
        );
    }

    let mut generation_config = serde_json::Map::new();
    let options = &request.options;
    if let Some(temperature) = options.temperature {
        generation_config.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(top_p) = options.top_p {
        generation_config.insert("topP".to_string(), json!(top_p));
    }
    if let Some(max_tokens) = options.max_tokens {
        generation_config.insert("maxOutputTokens".to_string(), json!(max_tokens));
    }
    match schema {
        Some(OutputSchema::Json(schema)) => {
            generation_config.insert("responseMimeType".to_string(), json!("application/json"));
            generation_config.insert("responseSchema".to_string(), schema.clone());
        }
        Some(OutputSchema::Choice(values)) => {
            generation_config.insert("responseMimeType".to_string(), json!("text/x.enum"));
            generation_config.insert(
                "responseSchema".to_string(),
                json!({ "type": "STRING", "enum": values }),
            );
        }
        None => {}
    }
    if !generation_config.is_empty() {
        payload.insert(
            "generationConfig".to_string(),
            Value::Object(generation_config),
        );
    }

    Value::Object(payload)
}

fn part_to_value(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text { text } => json!({ "text": text }),
        ContentPart::Image {
            source: ImageSource::Bytes { data, media_type },
        } => json!({
            "inlineData": {
                "mimeType": media_type.as_deref().unwrap_or("image/png"),
                "data": STANDARD.encode(data),
            }
        }),
        ContentPart::Image {
            source: ImageSource::Url { url },
        } => {
            let mut file_data = serde_json::Map::new();
            if let Some(media_type) = media_type_for_path(url) {
                file_data.insert("mimeType".to_string(), json!(media_type));
            }
            file_data.insert("fileUri".to_string(), json!(url));
            json!({ "fileData": file_data })
        }
        ContentPart::File { data, media_type } => json!({
            "inlineData": {
                "mimeType": media_type,
                "data": STANDARD.encode(data),
            }
        }),
    }
}

// ---------------------------------------------------------------------------
// Response decoding
// ---------------------------------------------------------------------------

fn parse_text_response(body: &Value) -> Result<TextGeneration> {
    let candidates = body
        .get("candidates")
        .and_then(|v| v.as_array())
        .ok_or_else(|| ClientError::Api("No candidates returned".to_string()))?;
    let first = candidates
        .first()
        .ok_or_else(|| ClientError::Api("Empty candidates".to_string()))?;

    let mut text = String::new();
    let mut reasoning = String::new();
    if let Some(parts) = first["content"]["parts"].as_array() {
        for part in parts {
            let piece = part["text"].as_str().unwrap_or("");
            if part["thought"].as_bool().unwrap_or(false) {
                reasoning.push_str(piece);
            } else {
                text.push_str(piece);
            }
        }
    }

    let reasoning = if reasoning.is_empty() {
        None
    } else {
        Some(reasoning)
    };
    Ok(TextGeneration {
        text,
        reasoning,
        usage: parse_usage(body.get("usageMetadata")),
    })
}

fn parse_usage(meta: Option<&Value>) -> Option<TokenUsage> {
    let m = meta?;
    if m.is_null() {
        return None;
    }
    let prompt = m["promptTokenCount"].as_u64().unwrap_or(0) as usize;
    let completion = m["candidatesTokenCount"].as_u64().unwrap_or(0) as usize;
    let total = m["totalTokenCount"]
        .as_u64()
        .map(|t| t as usize)
        .unwrap_or(prompt + completion);
    Some(TokenUsage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: total,
    })
}

fn decode_object(text: &str, schema: &OutputSchema) -> Result<Value> {
    match schema {
        // Enum mode returns the bare category string as plain text.
        OutputSchema::Choice(_) => Ok(Value::String(text.trim().to_string())),
        OutputSchema::Json(_) => serde_json::from_str(text.trim())
            .map_err(|e| ClientError::Decode(format!("structured output is not valid JSON: {e}"))),
    }
}

/// Decode Gemini stream chunks. Each SSE payload is a full
/// `GenerateContentResponse`; usage metadata repeats across chunks, so the
/// latest value is emitted once at end of stream.
fn decode_event_stream(payloads: SseStream) -> EventStream {
    struct DecodeState {
        payloads: SseStream,
        pending: VecDeque<Result<StreamEvent>>,
        usage: Option<TokenUsage>,
        ended: bool,
    }

    let state = DecodeState {
        payloads,
        pending: VecDeque::new(),
        usage: None,
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
                    Ok(chunk) => {
                        if let Some(usage) = parse_usage(chunk.get("usageMetadata")) {
                            state.usage = Some(usage);
                        }
                        decode_chunk(&chunk, &mut state.pending);
                    }
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
                    if let Some(usage) = state.usage.take() {
                        state.pending.push_back(Ok(StreamEvent::Usage(usage)));
                    }
                    state.pending.push_back(Ok(StreamEvent::Done));
                }
            }
        }
    }))
}

fn decode_chunk(chunk: &Value, out: &mut VecDeque<Result<StreamEvent>>) {
    if let Some(error) = chunk.get("error")
        && !error.is_null()
    {
        let detail = error["message"]
            .as_str()
            .unwrap_or("stream error")
            .to_string();
        out.push_back(Err(ClientError::Api(detail)));
        return;
    }

    let Some(parts) = chunk["candidates"][0]["content"]["parts"].as_array() else {
        return;
    };
    for part in parts {
        let Some(piece) = part["text"].as_str() else {
            continue;
        };
        if piece.is_empty() {
            continue;
        }
        if part["thought"].as_bool().unwrap_or(false) {
            out.push_back(Ok(StreamEvent::Reasoning(piece.to_string())));
        } else {
            out.push_back(Ok(StreamEvent::Text(piece.to_string())));
        }
    }
}
