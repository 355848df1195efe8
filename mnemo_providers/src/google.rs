//! Google Generative Language API wire format (§4.3): `generateContent` for
//! chat, `embedContent` for embeddings. Distinct from the other two families:
//! the API key travels as a query parameter rather than a header, tool calls
//! are `functionCall` parts rather than a sibling array, and there is no
//! `assistant` role (Google calls it `model`).

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{info, warn};

use mnemo_core::error::{EngineError, EngineResult};
use mnemo_core::provider::{ChatRequest, ChatResponse, ChatRole, Embedder, LlmMessage, LlmProvider, StopReason, ToolCallRequest, TokenUsage};

use crate::retry::{is_transient, retry_with_backoff, DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES};

pub const DEFAULT_EMBED_MODEL: &str = "embedding-001";
pub const DEFAULT_EMBED_DIMENSION: usize = 768;

pub struct GoogleProvider {
    client: Client,
    api_key: String,
    base_url: String,
    embed_model: &'static str,
    embed_dimension: usize,
}

impl GoogleProvider {
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            embed_model: DEFAULT_EMBED_MODEL,
            embed_dimension: DEFAULT_EMBED_DIMENSION,
        }
    }

    fn convert_message(msg: &LlmMessage) -> Option<Value> {
        match msg.role {
            ChatRole::System => None,
            ChatRole::Tool => {
                let name = msg.tool_call_id.clone().unwrap_or_default();
                Some(json!({
                    "role": "function",
                    "parts": [{
                        "functionResponse": {
                            "name": name,
                            "response": { "content": msg.text },
                        }
                    }]
                }))
            }
            ChatRole::User | ChatRole::Assistant => {
                let mut parts = Vec::new();
                if !msg.text.is_empty() {
                    parts.push(json!({ "text": msg.text }));
                }
                for call in &msg.tool_calls {
                    parts.push(json!({
                        "functionCall": { "name": call.name, "args": call.arguments }
                    }));
                }
                let role = if msg.role == ChatRole::Assistant { "model" } else { "user" };
                Some(json!({ "role": role, "parts": parts }))
            }
        }
    }

    fn system_instruction(messages: &[LlmMessage]) -> Option<Value> {
        let text: String = messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        (!text.is_empty()).then(|| json!({ "parts": [{ "text": text }] }))
    }

    async fn handle_response(response: reqwest::Response) -> EngineResult<Value> {
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(EngineError::QuotaExceeded {
                provider: "google".to_string(),
                hint: "rate limited, retry later".to_string(),
            });
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::InvalidInput(format!("http {status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("google http error {status}: {body}");
            return Err(EngineError::Transient(format!("http {status}")));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))
    }

    async fn try_complete(&self, request: &ChatRequest) -> EngineResult<ChatResponse> {
        let contents: Vec<Value> = request.messages.iter().filter_map(Self::convert_message).collect();
        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "maxOutputTokens": request.max_tokens,
                "temperature": request.temperature,
            },
        });
        if let Some(system) = Self::system_instruction(&request.messages) {
            body["systemInstruction"] = system;
        }
        if !request.tools.is_empty() {
            let declarations: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    })
                })
                .collect();
            body["tools"] = json!([{ "functionDeclarations": declarations }]);
        }

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, request.model, self.api_key
        );
        let response = self
            .client
            .post(url)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;

        let response = Self::handle_response(response).await?;
        parse_response(&response)
    }
}

fn parse_response(response: &Value) -> EngineResult<ChatResponse> {
    let candidate = response["candidates"]
        .get(0)
        .ok_or_else(|| EngineError::Transient("no candidates in response".to_string()))?;
    let parts = candidate["content"]["parts"].as_array().cloned().unwrap_or_default();

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for (i, part) in parts.iter().enumerate() {
        if let Some(t) = part["text"].as_str() {
            text.push_str(t);
        }
        if let Some(call) = part.get("functionCall") {
            tool_calls.push(ToolCallRequest {
                id: format!("call_{i}"),
                name: call["name"].as_str().unwrap_or_default().to_string(),
                arguments: call["args"].clone(),
            });
        }
    }

    let stop_reason = match candidate["finishReason"].as_str() {
        Some("MAX_TOKENS") => StopReason::MaxTokens,
        _ if !tool_calls.is_empty() => StopReason::ToolUse,
        _ => StopReason::EndTurn,
    };

    let usage = response.get("usageMetadata").map_or_else(TokenUsage::default, |u| {
        let prompt = u["promptTokenCount"].as_u64().unwrap_or(0) as u32;
        let completion = u["candidatesTokenCount"].as_u64().unwrap_or(0) as u32;
        TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: u["totalTokenCount"].as_u64().unwrap_or(u64::from(prompt + completion)) as u32,
        }
    });

    Ok(ChatResponse {
        text,
        tool_calls,
        usage,
        stop_reason,
    })
}

#[async_trait]
impl LlmProvider for GoogleProvider {
    fn provider_id(&self) -> &str {
        "google"
    }

    async fn complete(&self, request: ChatRequest) -> EngineResult<ChatResponse> {
        info!(model = %request.model, "sending chat request to google");
        retry_with_backoff(
            || self.try_complete(&request),
            DEFAULT_MAX_RETRIES,
            DEFAULT_BASE_DELAY,
            is_transient,
        )
        .await
    }
}

#[async_trait]
impl Embedder for GoogleProvider {
    fn provider_id(&self) -> &str {
        "google"
    }

    fn dimension(&self) -> usize {
        self.embed_dimension
    }

    async fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        let op = || async {
            let url = format!(
                "{}/models/{}:embedContent?key={}",
                self.base_url, self.embed_model, self.api_key
            );
            let response = self
                .client
                .post(url)
                .json(&json!({ "content": { "parts": [{ "text": text }] } }))
                .send()
                .await
                .map_err(|e| EngineError::Transient(e.to_string()))?;
            let response = Self::handle_response(response).await?;
            let values = response["embedding"]["values"]
                .as_array()
                .ok_or_else(|| EngineError::Transient("missing embedding in response".to_string()))?;
            #[allow(clippy::cast_possible_truncation)]
            let vec: Vec<f32> = values.iter().filter_map(Value::as_f64).map(|v| v as f32).collect();
            Ok(vec)
        };
        retry_with_backoff(op, DEFAULT_MAX_RETRIES, DEFAULT_BASE_DELAY, is_transient).await
    }
}
