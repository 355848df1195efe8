//! Shared turn-execution machinery (§4.7, §4.6) behind `/send_message`,
//! `/send_streaming_message`, and the MCP `memory_chat` tool: resolve the
//! user and chat agent, assemble context, run the Step Loop, and persist
//! whatever it produced.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use mnemo_config::SettingsCache;
use mnemo_core::agent::{assemble_chat_context, AgentSpec, Locale};
use mnemo_core::domain::{AgentRecord, AgentType, ContentBlock, Message, Role};
use mnemo_core::error::{EngineError, EngineResult};
use mnemo_core::provider::{provider_family_for_model, LlmMessage, ToolCallRequest};
use mnemo_core::step::{messages_to_llm, resume_messages, StepDeps, StepEvent, StepLoop, SuspendedStep};
use mnemo_core::tools::{OtidCache, ToolContext, ToolRegistry};
use mnemo_providers::credentials;
use mnemo_providers::facade::build_llm_provider;
use mnemo_store::StorageEngine;

/// Number of most-recent persisted messages fed back to the model as history.
/// A stand-in for full token-budget-aware context management (§4.7): when the
/// window is wider than this, the oldest turns are simply dropped rather than
/// summarised, which is the documented degenerate case of the "summarisation
/// failures fall back to truncation" rule.
const HISTORY_LIMIT: usize = 40;

/// Characters of retrieved-memory context spliced into the chat system
/// prompt, a stand-in for "context window minus reply reserve" (§4.6).
const CONTEXT_BUDGET_CHARS: usize = 8_000;

pub struct TurnInput {
    pub user_id: String,
    pub organization_id: String,
    pub message: Option<String>,
    pub image_uris: Vec<String>,
    pub otid: Option<String>,
}

/// Everything `StepLoop::run` needs, resolved once ahead of the call so both
/// the synchronous and the streaming call sites share the exact same setup.
pub struct PreparedTurn {
    pub agent: AgentRecord,
    pub step_loop: StepLoop,
    pub deps: Arc<StepDeps>,
    pub ctx: ToolContext,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub messages: Vec<LlmMessage>,
}

/// Resolves the user, its chat agent, the LLM provider, and the message
/// history, persists the inbound user message, and assembles the system
/// prompt — everything up to (not including) calling `StepLoop::run`.
pub async fn prepare_chat_turn(
    engine: &StorageEngine,
    settings: &SettingsCache,
    tools: &ToolRegistry,
    input: &TurnInput,
) -> EngineResult<PreparedTurn> {
    prepare_turn(engine, settings, tools, AgentType::Chat, input).await
}

/// Same setup as `prepare_chat_turn` but against an arbitrary agent role
/// (the Meta agent for the memorising path, §4.7).
pub async fn prepare_turn(
    engine: &StorageEngine,
    settings: &SettingsCache,
    tools: &ToolRegistry,
    agent_type: AgentType,
    input: &TurnInput,
) -> EngineResult<PreparedTurn> {
    let user = engine
        .users()
        .get_or_create(&input.user_id, &input.user_id, "", Some(&input.organization_id))
        .await?;
    let user_settings = settings.get(&user.id).await?;
    let model = match agent_type {
        AgentType::Chat => user_settings.chat_model.clone(),
        _ => user_settings.memory_model.clone(),
    };
    let agent = engine
        .agents()
        .get_or_create_for_type(&user.id, agent_type, &model)
        .await?;

    let provider = build_llm_provider(provider_family_for_model(&agent.llm_config.model))?;

    let step_id = Uuid::now_v7();
    let mut content = Vec::new();
    if let Some(text) = &input.message {
        if !text.is_empty() {
            content.push(ContentBlock::text(text.clone()));
        }
    }
    for uri in &input.image_uris {
        content.push(ContentBlock::ImageReference { uri: uri.clone() });
    }
    if !content.is_empty() {
        let message = Message::new(agent.id, user.id.clone(), Role::User, step_id, content);
        engine.messages().insert(&message).await?;
    }

    let history = engine.messages().list_for_agent(agent.id, HISTORY_LIMIT).await?;
    let llm_history = messages_to_llm(&history);

    let system_prompt = assemble_chat_context(
        engine,
        &user.id,
        &user.organization_id,
        &agent.system_prompt,
        input.message.as_deref().unwrap_or_default(),
        CONTEXT_BUDGET_CHARS,
        Locale::English,
    )
    .await?;

    let mut messages = vec![LlmMessage::system(system_prompt)];
    messages.extend(llm_history);

    let spec = AgentSpec::default_for(agent_type, &agent.llm_config.model);
    let scoped_tools = Arc::new(tools.subset(&spec.tool_allowlist));

    let ctx = ToolContext {
        user_id: user.id.clone(),
        organization_id: user.organization_id.clone(),
        agent_id: agent.id,
        otid: input.otid.clone(),
    };

    Ok(PreparedTurn {
        step_loop: StepLoop::new(agent_type, spec.max_steps),
        deps: Arc::new(StepDeps { provider, tools: scoped_tools }),
        ctx,
        model: agent.llm_config.model.clone(),
        max_tokens: agent.llm_config.max_tokens,
        temperature: agent.llm_config.temperature,
        messages,
        agent,
    })
}

/// Resolves which model/provider-family a turn would use without persisting
/// anything, so the Streaming Dispatcher's credential short-circuit (§4.8)
/// can run strictly before the user message is written: `prepare_turn` itself
/// always persists, so it can't be reused for this precheck.
pub async fn resolve_model_for_agent_type(
    engine: &StorageEngine,
    settings: &SettingsCache,
    user_id: &str,
    organization_id: &str,
    agent_type: AgentType,
) -> EngineResult<(String, String)> {
    let user = engine
        .users()
        .get_or_create(user_id, user_id, "", Some(organization_id))
        .await?;
    let user_settings = settings.get(&user.id).await?;
    let model = match agent_type {
        AgentType::Chat => user_settings.chat_model,
        _ => user_settings.memory_model,
    };
    let provider = provider_family_for_model(&model).to_string();
    Ok((model, provider))
}

/// Checks the credential for `provider` without constructing a full client,
/// returning the exact `(provider, missing_vars)` pair the dispatcher needs
/// for a `missing_api_keys` event (§4.8, §6 `POST /send_streaming_message`).
pub fn missing_credential(provider: &str) -> Option<(String, Vec<String>)> {
    match credentials::resolve(provider) {
        Ok(_) => None,
        Err(EngineError::MissingCredential { provider, missing }) => Some((provider, missing)),
        Err(_) => None,
    }
}

/// Rebuilds everything `StepLoop::run` needs to resume a suspended step
/// (§4.7.1): the agent/provider/tools are re-resolved from `suspended.agent_id`
/// since `SuspendedStep` itself only carries the message list and the pending
/// ticket, not a live `StepDeps`.
pub async fn resume_turn(
    engine: &StorageEngine,
    tools: &ToolRegistry,
    suspended: &SuspendedStep,
    approved: bool,
) -> EngineResult<PreparedTurn> {
    let agent = engine.agents().get(suspended.agent_id).await?;
    let user = engine.users().get(&suspended.user_id).await?;
    let provider = build_llm_provider(provider_family_for_model(&agent.llm_config.model))?;
    let spec = AgentSpec::default_for(agent.agent_type, &agent.llm_config.model);
    let scoped_tools = Arc::new(tools.subset(&spec.tool_allowlist));

    let ctx = ToolContext {
        user_id: user.id.clone(),
        organization_id: user.organization_id.clone(),
        agent_id: agent.id,
        otid: None,
    };

    Ok(PreparedTurn {
        step_loop: StepLoop::new(agent.agent_type, spec.max_steps.saturating_sub(suspended.steps_taken)),
        deps: Arc::new(StepDeps { provider, tools: scoped_tools }),
        ctx,
        model: agent.llm_config.model.clone(),
        max_tokens: agent.llm_config.max_tokens,
        temperature: agent.llm_config.temperature,
        messages: resume_messages(suspended, approved),
        agent,
    })
}

/// Runs a prepared turn to completion synchronously, collecting every event
/// into a `Vec` since `StepLoop::run` only hands that back itself on the
/// confirmation-suspend branch (§4.7.1).
pub async fn run_turn_blocking(
    turn: &PreparedTurn,
    otids: &OtidCache,
    cancel: &CancellationToken,
) -> EngineResult<(Option<mnemo_core::step::SuspendedStep>, Vec<StepEvent>)> {
    let mut events = Vec::new();
    let outcome = turn
        .step_loop
        .run(
            &turn.deps,
            turn.ctx.clone(),
            &turn.model,
            turn.max_tokens,
            turn.temperature,
            turn.messages.clone(),
            otids,
            cancel,
            |ev| events.push(ev),
        )
        .await?;
    match outcome {
        Some((suspended, suspended_events)) => Ok((Some(suspended), suspended_events)),
        None => Ok((None, events)),
    }
}

/// Scans a completed run's events for the final assistant-visible reply text.
/// `None` when the loop ended without reaching `Final` (e.g. `max_steps`
/// exhausted) — callers treat that the same as an internal failure.
#[must_use]
pub fn final_text(events: &[StepEvent]) -> Option<String> {
    events.iter().rev().find_map(|ev| match ev {
        StepEvent::Final { text, .. } => Some(text.clone()),
        _ => None,
    })
}

/// Reconstructs persisted assistant/tool messages from a completed step's
/// event list (§8 property 5: "persisted message count == 1 + sum(assistant +
/// tool_returns)"). `StepLoop::run` itself performs no persistence; an
/// iteration's assistant text and tool calls are buffered until the next
/// `Intermediate` (a new iteration started) or a terminal event flushes them.
pub async fn persist_step_events(
    engine: &StorageEngine,
    agent_id: Uuid,
    user_id: &str,
    step_id: Uuid,
    events: &[StepEvent],
) -> EngineResult<()> {
    let mut text = String::new();
    let mut calls: Vec<ToolCallRequest> = Vec::new();
    let mut returns: Vec<ContentBlock> = Vec::new();

    for ev in events {
        match ev {
            StepEvent::Intermediate { text: t, .. } => {
                if !text.is_empty() || !calls.is_empty() || !returns.is_empty() {
                    flush_iteration(engine, agent_id, user_id, step_id, &mut text, &mut calls, &mut returns).await?;
                }
                text = t.clone();
            }
            StepEvent::Tool { id, name, arguments, .. } => {
                calls.push(ToolCallRequest {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: arguments.clone(),
                });
            }
            StepEvent::ToolReturn { id, content, is_error, .. } => {
                returns.push(ContentBlock::ToolReturn {
                    id: id.clone(),
                    content: content.clone(),
                    is_error: *is_error,
                });
            }
            StepEvent::Final { .. } | StepEvent::End { .. } | StepEvent::ConfirmationRequest { .. } | StepEvent::Error { .. } => {
                if !text.is_empty() || !calls.is_empty() || !returns.is_empty() {
                    flush_iteration(engine, agent_id, user_id, step_id, &mut text, &mut calls, &mut returns).await?;
                }
            }
            StepEvent::Start { .. } | StepEvent::MissingApiKeys { .. } | StepEvent::Heartbeat { .. } => {}
        }
    }
    Ok(())
}

async fn flush_iteration(
    engine: &StorageEngine,
    agent_id: Uuid,
    user_id: &str,
    step_id: Uuid,
    text: &mut String,
    calls: &mut Vec<ToolCallRequest>,
    returns: &mut Vec<ContentBlock>,
) -> EngineResult<()> {
    let mut content: Vec<ContentBlock> = Vec::new();
    if !text.is_empty() {
        content.push(ContentBlock::text(text.clone()));
    }
    for call in calls.iter() {
        content.push(ContentBlock::ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        });
    }
    if !content.is_empty() {
        let message = Message::new(agent_id, user_id, Role::Assistant, step_id, content);
        engine.messages().insert(&message).await?;
    }

    for block in returns.drain(..) {
        if let ContentBlock::ToolReturn { id, .. } = &block {
            let mut message = Message::new(agent_id, user_id, Role::Tool, step_id, vec![block.clone()]);
            message.tool_call_id = Some(id.clone());
            engine.messages().insert(&message).await?;
        }
    }

    text.clear();
    calls.clear();
    Ok(())
}

/// Forks the memorising path (§4.7): re-runs the exchange through the Meta
/// agent so it can classify and dispatch writes into the six memory classes.
/// Spawned so it never delays the user-visible reply; failures are logged
/// and never surface back to the caller.
pub fn spawn_memorizing_task(
    engine: Arc<StorageEngine>,
    settings: Arc<SettingsCache>,
    tools: Arc<ToolRegistry>,
    otids: Arc<OtidCache>,
    user_id: String,
    organization_id: String,
    user_message: Option<String>,
    assistant_reply: String,
) {
    tokio::spawn(async move {
        let prompt = format!(
            "Classify and record relevant information from this exchange.\nUser: {}\nAssistant: {}",
            user_message.as_deref().unwrap_or(""),
            assistant_reply
        );
        let input = TurnInput {
            user_id: user_id.clone(),
            organization_id,
            message: Some(prompt),
            image_uris: Vec::new(),
            otid: None,
        };
        let prepared = match prepare_turn(&engine, &settings, &tools, AgentType::Meta, &input).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "memorising turn setup failed");
                return;
            }
        };
        let cancel = CancellationToken::new();
        let (suspended, events) = match run_turn_blocking(&prepared, &otids, &cancel).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "memorising step loop failed");
                return;
            }
        };
        if suspended.is_some() {
            tracing::warn!(user_id = %user_id, "memorising turn unexpectedly requested confirmation, discarding");
            return;
        }
        if let Err(e) = persist_step_events(&engine, prepared.agent.id, &user_id, Uuid::now_v7(), &events).await {
            tracing::warn!(user_id = %user_id, error = %e, "failed to persist memorising turn messages");
        }
    });
}

/// Bound applied to the MCP `memory_chat` tool's inner turn (§4.9): shorter
/// than the HTTP chat timeout since this runs inline inside a single tool call.
pub const MCP_CHAT_TIMEOUT: Duration = Duration::from_secs(15);

#[must_use]
pub fn missing_credential_message(provider: &str, missing: &[String]) -> String {
    format!(
        "missing credential for provider {provider}: set {}",
        missing.join(", ")
    )
}

pub fn now_step_id() -> Uuid {
    Uuid::now_v7()
}

pub fn current_timestamp() -> chrono::DateTime<Utc> {
    Utc::now()
}
