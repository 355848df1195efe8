//! Anthropic `/v1/messages` wire format (§4.3). Distinct from the
//! OpenAI-compatible family: the system prompt is a top-level field rather
//! than a message, auth is an `x-api-key` header plus an explicit
//! `anthropic-version`, and tool use/results are content blocks rather than a
//! separate `tool_calls` array. Anthropic exposes no embeddings endpoint, so
//! this type implements `LlmProvider` only.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{info, warn};

use mnemo_core::error::{EngineError, EngineResult};
use mnemo_core::provider::{ChatRequest, ChatResponse, ChatRole, LlmMessage, LlmProvider, StopReason, ToolCallRequest, TokenUsage};

use crate::retry::{is_transient, retry_with_backoff, DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES};

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: "https://api.anthropic.com/v1".to_string(),
        }
    }

    fn convert_message(msg: &LlmMessage) -> Option<Value> {
        match msg.role {
            ChatRole::System => None,
            ChatRole::Tool => Some(json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": msg.tool_call_id,
                    "content": msg.text,
                }]
            })),
            ChatRole::User | ChatRole::Assistant => {
                let mut blocks = Vec::new();
                if !msg.text.is_empty() {
                    blocks.push(json!({ "type": "text", "text": msg.text }));
                }
                for call in &msg.tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                }
                Some(json!({ "role": role_str(msg.role), "content": blocks }))
            }
        }
    }

    fn system_prompt(messages: &[LlmMessage]) -> String {
        messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    async fn handle_response(response: reqwest::Response) -> EngineResult<Value> {
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(EngineError::QuotaExceeded {
                provider: "anthropic".to_string(),
                hint: "rate limited, retry later".to_string(),
            });
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::InvalidInput(format!("http {status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("anthropic http error {status}: {body}");
            return Err(EngineError::Transient(format!("http {status}")));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))
    }

    async fn try_complete(&self, request: &ChatRequest) -> EngineResult<ChatResponse> {
        let messages: Vec<Value> = request.messages.iter().filter_map(Self::convert_message).collect();
        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });
        let system = Self::system_prompt(&request.messages);
        if !system.is_empty() {
            body["system"] = json!(system);
        }
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            body["tools"] = json!(tools);
        }

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;

        let response = Self::handle_response(response).await?;
        parse_response(&response)
    }
}

fn role_str(role: ChatRole) -> &'static str {
    match role {
        ChatRole::Assistant => "assistant",
        _ => "user",
    }
}

fn parse_response(response: &Value) -> EngineResult<ChatResponse> {
    let blocks = response["content"]
        .as_array()
        .ok_or_else(|| EngineError::Transient("missing content in response".to_string()))?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block["type"].as_str() {
            Some("text") => text.push_str(block["text"].as_str().unwrap_or_default()),
            Some("tool_use") => tool_calls.push(ToolCallRequest {
                id: block["id"].as_str().unwrap_or_default().to_string(),
                name: block["name"].as_str().unwrap_or_default().to_string(),
                arguments: block["input"].clone(),
            }),
            _ => {}
        }
    }

    let stop_reason = match response["stop_reason"].as_str() {
        Some("tool_use") => StopReason::ToolUse,
        Some("max_tokens") => StopReason::MaxTokens,
        _ => StopReason::EndTurn,
    };

    let usage = response.get("usage").map_or_else(TokenUsage::default, |u| {
        let prompt = u["input_tokens"].as_u64().unwrap_or(0) as u32;
        let completion = u["output_tokens"].as_u64().unwrap_or(0) as u32;
        TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
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
impl LlmProvider for AnthropicProvider {
    fn provider_id(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: ChatRequest) -> EngineResult<ChatResponse> {
        info!(model = %request.model, "sending chat request to anthropic");
        retry_with_backoff(
            || self.try_complete(&request),
            DEFAULT_MAX_RETRIES,
            DEFAULT_BASE_DELAY,
            is_transient,
        )
        .await
    }
}
