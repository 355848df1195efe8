//! Shared wire format for OpenAI and any OpenAI-compatible vendor (DeepSeek).
//! Grounded on `ZhipuProvider`'s message/tool conversion helpers (§4.3),
//! adapted to the uniform `ChatRequest`/`ChatResponse`/`ToolSchema` shapes and
//! to function-call arguments carried as a JSON string, the way the
//! `chat/completions` family of APIs encodes them.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{info, warn};

use mnemo_core::error::{EngineError, EngineResult};
use mnemo_core::provider::{
    ChatRequest, ChatResponse, ChatRole, Embedder, LlmMessage, LlmProvider, StopReason, ToolCallRequest, TokenUsage,
};

use crate::retry::{is_transient, retry_with_backoff, DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES};

/// An OpenAI-shaped `chat/completions` + optional `embeddings` backend.
/// `embed_model` is `None` for vendors (DeepSeek) that expose no embedding
/// endpoint; calling `embed` on such a provider is a programming error the
/// facade never wires up, but the type still needs a concrete `Embedder`
/// story when `embed_model` is absent, so `embed` returns `Fatal` instead.
pub struct OpenAiCompatProvider {
    provider_id: &'static str,
    client: Client,
    api_key: String,
    base_url: String,
    embed_model: Option<&'static str>,
    embed_dimension: usize,
}

impl OpenAiCompatProvider {
    #[must_use]
    pub fn new(provider_id: &'static str, api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            provider_id,
            client: Client::new(),
            api_key,
            base_url: base_url.into(),
            embed_model: None,
            embed_dimension: 0,
        }
    }

    #[must_use]
    pub fn with_embeddings(mut self, model: &'static str, dimension: usize) -> Self {
        self.embed_model = Some(model);
        self.embed_dimension = dimension;
        self
    }

    fn convert_message(msg: &LlmMessage) -> Value {
        if msg.role == ChatRole::Tool {
            return json!({
                "role": "tool",
                "tool_call_id": msg.tool_call_id,
                "content": msg.text,
            });
        }

        let mut out = json!({ "role": role_str(msg.role) });
        if !msg.text.is_empty() || msg.tool_calls.is_empty() {
            out["content"] = json!(msg.text);
        }
        if !msg.tool_calls.is_empty() {
            let calls: Vec<Value> = msg
                .tool_calls
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "type": "function",
                        "function": {
                            "name": c.name,
                            "arguments": serde_json::to_string(&c.arguments).unwrap_or_else(|_| "{}".to_string()),
                        }
                    })
                })
                .collect();
            out["tool_calls"] = json!(calls);
        }
        out
    }

    async fn handle_response(response: reqwest::Response) -> EngineResult<Value> {
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(EngineError::QuotaExceeded {
                provider: "openai-compatible".to_string(),
                hint: "rate limited, retry later".to_string(),
            });
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::InvalidInput(format!("http {status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("upstream http error {status}: {body}");
            return Err(EngineError::Transient(format!("http {status}")));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))
    }

    async fn try_complete(&self, request: &ChatRequest) -> EngineResult<ChatResponse> {
        let messages: Vec<Value> = request.messages.iter().map(Self::convert_message).collect();
        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(tools);
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;

        let response = Self::handle_response(response).await?;
        parse_chat_response(&response)
    }
}

fn role_str(role: ChatRole) -> &'static str {
    match role {
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::System => "system",
        ChatRole::Tool => "tool",
    }
}

fn parse_chat_response(response: &Value) -> EngineResult<ChatResponse> {
    let choice = response["choices"]
        .get(0)
        .ok_or_else(|| EngineError::Transient("no choices in response".to_string()))?;
    let message = &choice["message"];
    let text = message["content"].as_str().unwrap_or_default().to_string();

    let mut tool_calls = Vec::new();
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let id = call["id"].as_str().unwrap_or_default().to_string();
            let name = call["function"]["name"].as_str().unwrap_or_default().to_string();
            let arguments_str = call["function"]["arguments"].as_str().unwrap_or("{}");
            let arguments: Value = serde_json::from_str(arguments_str).unwrap_or_else(|_| json!({}));
            tool_calls.push(ToolCallRequest { id, name, arguments });
        }
    }

    let stop_reason = match choice["finish_reason"].as_str() {
        Some("tool_calls") => StopReason::ToolUse,
        Some("length") => StopReason::MaxTokens,
        _ if !tool_calls.is_empty() => StopReason::ToolUse,
        _ => StopReason::EndTurn,
    };

    let usage = response.get("usage").map_or_else(TokenUsage::default, |u| TokenUsage {
        prompt_tokens: u["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        completion_tokens: u["completion_tokens"].as_u64().unwrap_or(0) as u32,
        total_tokens: u["total_tokens"].as_u64().unwrap_or(0) as u32,
    });

    Ok(ChatResponse {
        text,
        tool_calls,
        usage,
        stop_reason,
    })
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn provider_id(&self) -> &str {
        self.provider_id
    }

    async fn complete(&self, request: ChatRequest) -> EngineResult<ChatResponse> {
        info!(provider = self.provider_id, model = %request.model, "sending chat request");
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
impl Embedder for OpenAiCompatProvider {
    fn provider_id(&self) -> &str {
        self.provider_id
    }

    fn dimension(&self) -> usize {
        self.embed_dimension
    }

    async fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        let Some(model) = self.embed_model else {
            return Err(EngineError::Fatal(format!(
                "{} exposes no embedding endpoint",
                self.provider_id
            )));
        };
        let op = || async {
            let response = self
                .client
                .post(format!("{}/embeddings", self.base_url))
                .bearer_auth(&self.api_key)
                .timeout(Duration::from_secs(60))
                .json(&json!({ "model": model, "input": text }))
                .send()
                .await
                .map_err(|e| EngineError::Transient(e.to_string()))?;
            let response = Self::handle_response(response).await?;
            let values = response["data"][0]["embedding"]
                .as_array()
                .ok_or_else(|| EngineError::Transient("missing embedding in response".to_string()))?;
            #[allow(clippy::cast_possible_truncation)]
            let vec: Vec<f32> = values.iter().filter_map(Value::as_f64).map(|v| v as f32).collect();
            Ok(vec)
        };
        retry_with_backoff(op, DEFAULT_MAX_RETRIES, DEFAULT_BASE_DELAY, is_transient).await
    }
}
