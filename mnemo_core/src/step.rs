//! The Step Loop (§4.7) and confirmation-as-continuation (§4.7.1). A bounded
//! iterative drive: persist the inbound message, assemble context, call the LLM,
//! dispatch any tool calls, persist, and loop until a termination condition fires.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::{AgentType, ConfirmationTicket, ContentBlock, Message, Role};
use crate::error::{EngineError, EngineResult};
use crate::provider::{ChatRequest, ChatResponse, LlmMessage, LlmProvider, StopReason, ToolCallRequest};
use crate::tools::{ToolContext, ToolRegistry};

/// One envelope emitted over the SSE stream (§6). `sequence` is strictly
/// increasing within a single `send_streaming_message` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepEvent {
    Start { sequence: u64, step_id: Uuid },
    Intermediate { sequence: u64, text: String },
    Tool { sequence: u64, id: String, name: String, arguments: serde_json::Value },
    ToolReturn { sequence: u64, id: String, name: String, content: String, is_error: bool },
    ConfirmationRequest { sequence: u64, ticket: ConfirmationTicket },
    MissingApiKeys { sequence: u64, provider: String, missing: Vec<String> },
    Heartbeat { sequence: u64 },
    Final { sequence: u64, text: String },
    Error { sequence: u64, message: String, kind: crate::error::ErrorKind },
    End { sequence: u64 },
}

/// Why the loop stopped (§4.7 termination conditions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCondition {
    SendMessageCalled,
    NoToolCalls,
    MaxStepsReached,
    Cancelled,
    SuspendedForConfirmation,
}

/// A paused step run: everything needed to resume once the user answers a
/// confirmation prompt, in place of holding an LLM/store connection open (§4.7.1).
#[derive(Debug, Clone)]
pub struct SuspendedStep {
    pub step_id: Uuid,
    pub agent_id: Uuid,
    pub user_id: String,
    pub messages_so_far: Vec<LlmMessage>,
    pub pending_tool_call: ToolCallRequest,
    pub ticket: ConfirmationTicket,
    pub steps_taken: u32,
}

/// Keyed by `ticket.id`; entries are removed on resume or on ticket expiry.
#[derive(Default)]
pub struct SuspendedStepTable {
    entries: DashMap<Uuid, SuspendedStep>,
}

impl SuspendedStepTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn suspend(&self, step: SuspendedStep) {
        self.entries.insert(step.ticket.id, step);
    }

    #[must_use]
    pub fn take(&self, ticket_id: Uuid) -> Option<SuspendedStep> {
        self.entries.remove(&ticket_id).map(|(_, v)| v)
    }

    /// Drops suspended steps whose ticket has expired, returning their count.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, s| !s.ticket.is_expired(now));
        before - self.entries.len()
    }
}

/// Bound on how many (LLM call, tool dispatch) round trips one `run` performs
/// before forcing a stop (§4.7 default `max_steps`).
pub const DEFAULT_MAX_STEPS: u32 = 20;

/// Dependencies the loop needs from the rest of the engine, injected by the
/// server so `mnemo_core` stays free of `mnemo_store`/`mnemo_providers`.
pub struct StepDeps {
    pub provider: Arc<dyn LlmProvider>,
    pub tools: Arc<ToolRegistry>,
}

/// Drives one agent turn to completion or suspension (§4.7).
pub struct StepLoop {
    pub agent_type: AgentType,
    pub max_steps: u32,
}

impl StepLoop {
    #[must_use]
    pub fn new(agent_type: AgentType, max_steps: u32) -> Self {
        Self { agent_type, max_steps }
    }

    /// Runs the loop, invoking `on_event` for each emitted `StepEvent` (the SSE
    /// dispatcher or the synchronous `send_message` endpoint both drive the loop
    /// this way, differing only in whether they stream intermediate events).
    ///
    /// Returns `Ok(Some(ticket))` when the loop suspended for a confirmation;
    /// `Ok(None)` when it reached a terminal condition normally.
    #[allow(clippy::too_many_arguments)]
    pub async fn run<F>(
        &self,
        deps: &StepDeps,
        ctx: ToolContext,
        model: &str,
        max_tokens: u32,
        temperature: f32,
        mut messages: Vec<LlmMessage>,
        otids: &crate::tools::OtidCache,
        cancel: &CancellationToken,
        mut on_event: F,
    ) -> EngineResult<Option<(SuspendedStep, Vec<StepEvent>)>>
    where
        F: FnMut(StepEvent),
    {
        let step_id = Uuid::now_v7();
        let mut sequence: u64 = 0;
        let mut events = Vec::new();
        let mut emit = |ev: StepEvent, events: &mut Vec<StepEvent>| {
            events.push(ev.clone());
            on_event(ev);
        };
        emit(StepEvent::Start { sequence, step_id }, &mut events);
        sequence += 1;

        let tool_schemas = deps.tools.schemas();
        let mut steps_taken: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                emit(StepEvent::Error {
                    sequence,
                    message: "cancelled".to_string(),
                    kind: crate::error::ErrorKind::Cancelled,
                }, &mut events);
                return Err(EngineError::Cancelled);
            }
            if steps_taken >= self.max_steps {
                emit(StepEvent::End { sequence }, &mut events);
                return Ok(None);
            }

            let request = ChatRequest {
                model: model.to_string(),
                messages: messages.clone(),
                tools: tool_schemas.clone(),
                max_tokens,
                temperature,
                timeout: std::time::Duration::from_secs(30),
            };

            let response: ChatResponse = deps.provider.complete(request).await?;
            steps_taken += 1;

            if !response.text.is_empty() {
                emit(StepEvent::Intermediate { sequence, text: response.text.clone() }, &mut events);
                sequence += 1;
            }

            if response.tool_calls.is_empty() || response.stop_reason == StopReason::EndTurn {
                emit(StepEvent::Final { sequence, text: response.text.clone() }, &mut events);
                sequence += 1;
                emit(StepEvent::End { sequence }, &mut events);
                return Ok(None);
            }

            messages.push(LlmMessage {
                role: crate::provider::ChatRole::Assistant,
                text: response.text.clone(),
                images: Vec::new(),
                tool_call_id: None,
                tool_calls: response.tool_calls.clone(),
            });

            for call in &response.tool_calls {
                if call.name == "send_message" {
                    let text = call
                        .arguments
                        .get("message")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    emit(StepEvent::Final { sequence, text: text.clone() }, &mut events);
                    sequence += 1;
                    emit(StepEvent::End { sequence }, &mut events);
                    return Ok(None);
                }

                if call.name == "request_confirmation" {
                    let kind = call
                        .arguments
                        .get("kind")
                        .and_then(|v| v.as_str())
                        .unwrap_or("action")
                        .to_string();
                    let details = call.arguments.clone();
                    let ticket = ConfirmationTicket::new(
                        ctx.user_id.clone(),
                        kind,
                        details,
                        chrono::Duration::minutes(5),
                    );
                    emit(StepEvent::ConfirmationRequest { sequence, ticket: ticket.clone() }, &mut events);
                    let suspended = SuspendedStep {
                        step_id,
                        agent_id: ctx.agent_id,
                        user_id: ctx.user_id.clone(),
                        messages_so_far: messages.clone(),
                        pending_tool_call: call.clone(),
                        ticket,
                        steps_taken,
                    };
                    return Ok(Some((suspended, events)));
                }

                emit(StepEvent::Tool {
                    sequence,
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                }, &mut events);
                sequence += 1;

                let result = deps.tools.dispatch(&ctx, otids, &call.name, call.arguments.clone()).await;
                emit(StepEvent::ToolReturn {
                    sequence,
                    id: call.id.clone(),
                    name: call.name.clone(),
                    content: result.content.clone(),
                    is_error: result.is_error,
                }, &mut events);
                sequence += 1;

                messages.push(LlmMessage::tool_return(call.id.clone(), result.content));
            }
        }
    }
}

/// Rebuilds the message list a suspended step should resume with, splicing in
/// the user's confirm/deny decision as a synthetic tool return for the paused
/// tool call (§4.7.1).
#[must_use]
pub fn resume_messages(suspended: &SuspendedStep, approved: bool) -> Vec<LlmMessage> {
    let mut messages = suspended.messages_so_far.clone();
    let content = if approved { "approved" } else { "denied" };
    messages.push(LlmMessage::tool_return(
        suspended.pending_tool_call.id.clone(),
        content,
    ));
    messages
}

/// Converts a persisted conversation's messages into the provider-facing wire
/// shape, rendering `ContentBlock`s back to plain text per role (§4.6).
#[must_use]
pub fn messages_to_llm(history: &[Message]) -> Vec<LlmMessage> {
    history
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => crate::provider::ChatRole::User,
                Role::Assistant => crate::provider::ChatRole::Assistant,
                Role::System => crate::provider::ChatRole::System,
                Role::Tool => crate::provider::ChatRole::Tool,
            };
            let tool_call_id = m.tool_call_id.clone();
            let tool_calls = m
                .content
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolCall { id, name, arguments } => Some(ToolCallRequest {
                        id: id.clone(),
                        name: name.clone(),
                        arguments: arguments.clone(),
                    }),
                    _ => None,
                })
                .collect();
            LlmMessage {
                role,
                text: m.text.clone(),
                images: Vec::new(),
                tool_call_id,
                tool_calls,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suspended_step_table_round_trips() {
        let table = SuspendedStepTable::new();
        let ticket = ConfirmationTicket::new(
            "u1".to_string(),
            "delete".to_string(),
            serde_json::json!({}),
            chrono::Duration::minutes(5),
        );
        let step = SuspendedStep {
            step_id: Uuid::now_v7(),
            agent_id: Uuid::now_v7(),
            user_id: "u1".to_string(),
            messages_so_far: vec![],
            pending_tool_call: ToolCallRequest {
                id: "call1".to_string(),
                name: "request_confirmation".to_string(),
                arguments: serde_json::json!({}),
            },
            ticket: ticket.clone(),
            steps_taken: 1,
        };
        table.suspend(step);
        let resumed = table.take(ticket.id);
        assert!(resumed.is_some());
        assert!(table.take(ticket.id).is_none());
    }

    #[test]
    fn evict_expired_removes_only_expired() {
        let table = SuspendedStepTable::new();
        let expired_ticket = ConfirmationTicket::new(
            "u1".to_string(),
            "delete".to_string(),
            serde_json::json!({}),
            chrono::Duration::seconds(-1),
        );
        let step = SuspendedStep {
            step_id: Uuid::now_v7(),
            agent_id: Uuid::now_v7(),
            user_id: "u1".to_string(),
            messages_so_far: vec![],
            pending_tool_call: ToolCallRequest {
                id: "call1".to_string(),
                name: "request_confirmation".to_string(),
                arguments: serde_json::json!({}),
            },
            ticket: expired_ticket,
            steps_taken: 1,
        };
        table.suspend(step);
        let evicted = table.evict_expired(Utc::now());
        assert_eq!(evicted, 1);
    }
}
