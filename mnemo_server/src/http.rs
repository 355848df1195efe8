//! The plain HTTP surface (§4.8, §6): request/response endpoints plus the
//! `send_streaming_message` SSE route. Every handler resolves `user_id` from
//! the body (falling back to [`crate::state::DEFAULT_USER_ID`]) since this
//! deployment has no session/auth layer of its own.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine as _;
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use mnemo_core::domain::AgentType;
use mnemo_core::error::EngineError;
use mnemo_core::memory::{MemoryClass, SearchMethod, SearchParams};
use mnemo_core::step::StepEvent;
use mnemo_store::DEFAULT_ORGANIZATION_ID;

use crate::state::{AppState, DEFAULT_USER_ID};
use crate::turn::{self, TurnInput};

/// Sentinel the dispatcher returns in place of a reply when the step loop
/// failed internally (§6): callers treat this string, not the HTTP status, as
/// the failure signal.
const ERROR_RESPONSE_FAILED: &str = "ERROR_RESPONSE_FAILED";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/send_message", post(send_message))
        .route("/send_streaming_message", post(send_streaming_message))
        .route("/memories/{class}/search", post(search_memories))
        .route("/documents/upload", post(upload_document))
        .route("/confirmation/respond", post(confirmation_respond))
        .route("/screenshot_setting", get(get_screenshot_setting))
        .route("/screenshot_setting/set", post(set_screenshot_setting))
        .route("/models/current", get(current_model))
        .route("/conversation/clear", post(conversation_clear))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "timestamp": chrono::Utc::now() }))
}

#[derive(Debug, Deserialize)]
struct ChatRequestBody {
    message: Option<String>,
    #[serde(default)]
    image_uris: Vec<String>,
    #[serde(default)]
    memorizing: bool,
    #[serde(default)]
    is_screen_monitoring: bool,
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatResponseBody {
    response: String,
    status: &'static str,
}

fn resolve_user(user_id: &Option<String>) -> String {
    user_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_USER_ID)
        .to_string()
}

/// `POST /send_message` (§6): synchronous chat turn. An internal failure
/// still answers `200` with the `ERROR_RESPONSE_FAILED` sentinel rather than
/// an HTTP error, matching the documented contract.
async fn send_message(State(state): State<AppState>, Json(body): Json<ChatRequestBody>) -> Json<ChatResponseBody> {
    let user_id = resolve_user(&body.user_id);
    let _ = body.is_screen_monitoring;

    let (_, provider) = match turn::resolve_model_for_agent_type(
        &state.engine,
        &state.settings,
        &user_id,
        DEFAULT_ORGANIZATION_ID,
        AgentType::Chat,
    )
    .await
    {
        Ok(pair) => pair,
        Err(_) => {
            return Json(ChatResponseBody {
                response: ERROR_RESPONSE_FAILED.to_string(),
                status: "success",
            })
        }
    };
    if turn::missing_credential(&provider).is_some() {
        return Json(ChatResponseBody {
            response: ERROR_RESPONSE_FAILED.to_string(),
            status: "success",
        });
    }

    let input = TurnInput {
        user_id: user_id.clone(),
        organization_id: DEFAULT_ORGANIZATION_ID.to_string(),
        message: body.message.clone(),
        image_uris: body.image_uris.clone(),
        otid: None,
    };

    let prepared = match turn::prepare_chat_turn(&state.engine, &state.settings, &state.tools, &input).await {
        Ok(p) => p,
        Err(_) => {
            return Json(ChatResponseBody {
                response: ERROR_RESPONSE_FAILED.to_string(),
                status: "success",
            })
        }
    };

    let cancel = CancellationToken::new();
    let agent_id = prepared.agent.id;
    let outcome = turn::run_turn_blocking(&prepared, &state.otids, &cancel).await;

    let (suspended, events) = match outcome {
        Ok(r) => r,
        Err(_) => {
            return Json(ChatResponseBody {
                response: ERROR_RESPONSE_FAILED.to_string(),
                status: "success",
            })
        }
    };

    let step_id = turn::now_step_id();
    if let Err(e) = turn::persist_step_events(&state.engine, agent_id, &user_id, step_id, &events).await {
        tracing::warn!(error = %e, "failed to persist send_message turn");
    }

    if let Some(suspended) = suspended {
        state.suspended.suspend(suspended.clone());
        return Json(ChatResponseBody {
            response: format!(
                "confirmation required: {} (ticket {})",
                suspended.ticket.kind, suspended.ticket.id
            ),
            status: "success",
        });
    }

    let Some(reply) = turn::final_text(&events) else {
        return Json(ChatResponseBody {
            response: ERROR_RESPONSE_FAILED.to_string(),
            status: "success",
        });
    };

    if body.memorizing {
        turn::spawn_memorizing_task(
            state.engine.clone(),
            state.settings.clone(),
            state.tools.clone(),
            state.otids.clone(),
            user_id,
            DEFAULT_ORGANIZATION_ID.to_string(),
            body.message.clone(),
            reply.clone(),
        );
    }

    Json(ChatResponseBody { response: reply, status: "success" })
}

/// The sequence field every `StepEvent` variant carries, used to keep our own
/// synthetic heartbeats monotonically ordered with the step loop's events
/// (§4.8, §8 property 7).
const fn event_sequence(ev: &StepEvent) -> u64 {
    match ev {
        StepEvent::Start { sequence, .. }
        | StepEvent::Intermediate { sequence, .. }
        | StepEvent::Tool { sequence, .. }
        | StepEvent::ToolReturn { sequence, .. }
        | StepEvent::ConfirmationRequest { sequence, .. }
        | StepEvent::MissingApiKeys { sequence, .. }
        | StepEvent::Heartbeat { sequence }
        | StepEvent::Final { sequence, .. }
        | StepEvent::Error { sequence, .. }
        | StepEvent::End { sequence } => *sequence,
    }
}

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// `POST /send_streaming_message` (§4.8, §6): the SSE dispatcher. Credentials
/// are checked before anything is persisted so the `missing_api_keys`
/// short-circuit leaves no trace in the Store (§8 scenario S4).
async fn send_streaming_message(
    State(state): State<AppState>,
    Json(body): Json<ChatRequestBody>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let user_id = resolve_user(&body.user_id);

    let precheck = turn::resolve_model_for_agent_type(
        &state.engine,
        &state.settings,
        &user_id,
        DEFAULT_ORGANIZATION_ID,
        AgentType::Chat,
    )
    .await;

    let missing = match precheck {
        Ok((_, provider)) => turn::missing_credential(&provider),
        Err(EngineError::MissingCredential { provider, missing }) => Some((provider, missing)),
        Err(_) => None,
    };

    if let Some((provider, missing_vars)) = missing {
        let event = StepEvent::MissingApiKeys { sequence: 0, provider, missing: missing_vars };
        let stream = async_stream::stream! {
            yield Ok(to_sse_event(&event));
        };
        return Sse::new(Box::pin(stream) as std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>)
            .keep_alive(KeepAlive::new().interval(HEARTBEAT_INTERVAL));
    }

    let input = TurnInput {
        user_id: user_id.clone(),
        organization_id: DEFAULT_ORGANIZATION_ID.to_string(),
        message: body.message.clone(),
        image_uris: body.image_uris.clone(),
        otid: None,
    };

    let prepared = match turn::prepare_chat_turn(&state.engine, &state.settings, &state.tools, &input).await {
        Ok(p) => p,
        Err(e) => {
            let event = StepEvent::Error { sequence: 0, message: e.to_string(), kind: e.kind() };
            let stream = async_stream::stream! {
                yield Ok(to_sse_event(&event));
            };
            return Sse::new(Box::pin(stream) as std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>)
                .keep_alive(KeepAlive::new().interval(HEARTBEAT_INTERVAL));
        }
    };

    let agent_id = prepared.agent.id;
    let cancel = CancellationToken::new();
    let cancel_guard = cancel.clone();

    let mut bridge = crate::sse_bridge::spawn(
        prepared.step_loop,
        prepared.deps,
        prepared.ctx,
        prepared.model,
        prepared.max_tokens,
        prepared.temperature,
        prepared.messages,
        state.otids.clone(),
        cancel,
    );

    let engine = state.engine.clone();
    let settings = state.settings.clone();
    let tools = state.tools.clone();
    let otids = state.otids.clone();
    let suspended_table = state.suspended.clone();
    let memorizing = body.memorizing;
    let original_message = body.message.clone();
    let org_id = DEFAULT_ORGANIZATION_ID.to_string();

    let stream = async_stream::stream! {
        // Cancels the step loop if the SSE connection is dropped before it
        // reaches a terminal event (§5: "within one queue-slot").
        let _drop_guard = CancelOnDrop(cancel_guard);

        let mut last_seq: u64 = 0;
        let mut all_events: Vec<StepEvent> = Vec::new();
        loop {
            tokio::select! {
                ev = bridge.next_event() => {
                    let Some(ev) = ev else { break };
                    last_seq = event_sequence(&ev);
                    all_events.push(ev.clone());
                    yield Ok(to_sse_event(&ev));
                }
                () = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                    last_seq += 1;
                    yield Ok(to_sse_event(&StepEvent::Heartbeat { sequence: last_seq }));
                }
            }
        }

        let step_id = turn::now_step_id();
        if let Err(e) = turn::persist_step_events(&engine, agent_id, &user_id, step_id, &all_events).await {
            tracing::warn!(error = %e, "failed to persist streaming turn");
        }

        match bridge.outcome().await {
            Ok(Some((suspended, _))) => {
                suspended_table.suspend(suspended);
            }
            Ok(None) => {
                if memorizing {
                    if let Some(reply) = turn::final_text(&all_events) {
                        turn::spawn_memorizing_task(
                            engine, settings, tools, otids, user_id, org_id, original_message, reply,
                        );
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "streaming step loop ended with an error");
            }
        }
    };

    Sse::new(Box::pin(stream) as std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>)
        .keep_alive(KeepAlive::new().interval(HEARTBEAT_INTERVAL))
}

/// Drops-to-cancel guard: firing the token when the SSE stream itself is
/// dropped (client disconnect) propagates into the step loop's
/// `cancel.is_cancelled()` checks without any extra polling.
struct CancelOnDrop(CancellationToken);
impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

fn to_sse_event(ev: &StepEvent) -> Event {
    Event::default().json_data(ev).unwrap_or_else(|_| Event::default().data("serialization error"))
}

#[derive(Debug, Deserialize)]
struct SearchRequestBody {
    query: String,
    #[serde(default = "default_search_method")]
    search_method: String,
    search_field: Option<String>,
    #[serde(default = "default_search_limit")]
    limit: usize,
    #[serde(default = "default_similarity_threshold")]
    similarity_threshold: f64,
    user_id: Option<String>,
}

const fn default_search_limit() -> usize {
    10
}
const fn default_similarity_threshold() -> f64 {
    0.7
}
fn default_search_method() -> String {
    "hybrid".to_string()
}

fn parse_search_method(s: &str) -> SearchMethod {
    match s {
        "embedding" | "vector" => SearchMethod::Embedding,
        "bm25" | "lexical" => SearchMethod::Bm25,
        _ => SearchMethod::Hybrid,
    }
}

/// `POST /memories/<class>/search` (§6). `class == "credentials"` is a
/// diagnostic escape hatch reporting which providers have a resolvable
/// credential, never the credential value itself.
async fn search_memories(
    State(state): State<AppState>,
    Path(class): Path<String>,
    Json(body): Json<SearchRequestBody>,
) -> Json<serde_json::Value> {
    let user_id = resolve_user(&body.user_id);
    let _ = &body.search_field;

    if class == "credentials" {
        let providers = ["openai", "anthropic", "google", "deepseek"];
        let results: Vec<_> = providers
            .iter()
            .map(|p| json!({ "provider": p, "configured": mnemo_providers::credentials::resolve(p).is_ok() }))
            .collect();
        return Json(json!({ "results": results }));
    }

    let class: MemoryClass = match class.parse() {
        Ok(c) => c,
        Err(e) => return Json(json!({ "error": e.to_string() })),
    };

    let params = SearchParams {
        method: parse_search_method(&body.search_method),
        query: body.query,
        limit: body.limit,
        threshold: body.similarity_threshold,
        cutoff: None,
    };

    match state.engine.search_class(&user_id, class, &params).await {
        Ok(snippets) => Json(json!({ "results": snippets })),
        Err(e) => Json(json!({ "error": e.to_string() })),
    }
}

#[derive(Debug, Deserialize)]
struct UploadRequestBody {
    file_name: String,
    #[serde(default)]
    file_type: String,
    content: String,
    user_id: String,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct UploadResponseBody {
    success: bool,
    document_id: Option<Uuid>,
    processed_content: Option<String>,
}

/// `POST /documents/upload` (§6). The decoded bytes are treated as
/// already-extracted text (no OCR/parsing front-end, §1) and forwarded into
/// the memorising path exactly like a chat message.
async fn upload_document(State(state): State<AppState>, Json(body): Json<UploadRequestBody>) -> Json<UploadResponseBody> {
    let bytes = match base64::engine::general_purpose::STANDARD.decode(&body.content) {
        Ok(b) => b,
        Err(_) => return Json(UploadResponseBody { success: false, document_id: None, processed_content: None }),
    };
    let text = match String::from_utf8(bytes) {
        Ok(t) => t,
        Err(_) => return Json(UploadResponseBody { success: false, document_id: None, processed_content: None }),
    };

    let message = match &body.description {
        Some(desc) => format!("Document '{}' ({}): {desc}\n\n{text}", body.file_name, body.file_type),
        None => format!("Document '{}' ({}):\n\n{text}", body.file_name, body.file_type),
    };

    let input = TurnInput {
        user_id: body.user_id.clone(),
        organization_id: DEFAULT_ORGANIZATION_ID.to_string(),
        message: Some(message),
        image_uris: Vec::new(),
        otid: None,
    };

    let prepared = match turn::prepare_turn(&state.engine, &state.settings, &state.tools, AgentType::Meta, &input).await {
        Ok(p) => p,
        Err(_) => return Json(UploadResponseBody { success: false, document_id: None, processed_content: None }),
    };

    let cancel = CancellationToken::new();
    let agent_id = prepared.agent.id;
    let (suspended, events) = match turn::run_turn_blocking(&prepared, &state.otids, &cancel).await {
        Ok(r) => r,
        Err(_) => return Json(UploadResponseBody { success: false, document_id: None, processed_content: None }),
    };
    if suspended.is_some() {
        tracing::warn!("document-upload turn unexpectedly requested confirmation, discarding");
    }
    let step_id = turn::now_step_id();
    if let Err(e) = turn::persist_step_events(&state.engine, agent_id, &body.user_id, step_id, &events).await {
        tracing::warn!(error = %e, "failed to persist document upload turn");
    }

    Json(UploadResponseBody { success: true, document_id: Some(Uuid::now_v7()), processed_content: Some(text) })
}

#[derive(Debug, Deserialize)]
struct ConfirmationRequestBody {
    confirmation_id: Uuid,
    confirmed: bool,
}

#[derive(Debug, Serialize)]
struct SuccessBody {
    success: bool,
}

/// `POST /confirmation/respond` (§4.7.1, §6). Resolves a suspended step by
/// re-entering the Step Loop with a synthetic tool-return for the pending
/// confirmation call.
async fn confirmation_respond(
    State(state): State<AppState>,
    Json(body): Json<ConfirmationRequestBody>,
) -> Json<SuccessBody> {
    let Some(suspended) = state.suspended.take(body.confirmation_id) else {
        return Json(SuccessBody { success: false });
    };

    let user_id = suspended.user_id.clone();
    let resumed = match turn::resume_turn(&state.engine, &state.tools, &suspended, body.confirmed).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "failed to resume suspended step");
            return Json(SuccessBody { success: false });
        }
    };

    let cancel = CancellationToken::new();
    let agent_id = resumed.agent.id;
    let (next_suspended, events) = match turn::run_turn_blocking(&resumed, &state.otids, &cancel).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "resumed step loop failed");
            return Json(SuccessBody { success: false });
        }
    };

    let step_id = turn::now_step_id();
    if let Err(e) = turn::persist_step_events(&state.engine, agent_id, &user_id, step_id, &events).await {
        tracing::warn!(error = %e, "failed to persist resumed step");
    }

    if let Some(next) = next_suspended {
        state.suspended.suspend(next);
    }

    Json(SuccessBody { success: true })
}

#[derive(Debug, Deserialize)]
struct UserIdQuery {
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ScreenshotSettingBody {
    enabled: bool,
}

async fn get_screenshot_setting(
    State(state): State<AppState>,
    axum::extract::Query(q): axum::extract::Query<UserIdQuery>,
) -> Json<ScreenshotSettingBody> {
    let user_id = resolve_user(&q.user_id);
    let settings = state.settings.get(&user_id).await.ok();
    let enabled = settings
        .and_then(|s| s.custom_settings.get("screenshot_enabled").and_then(serde_json::Value::as_bool))
        .unwrap_or(false);
    Json(ScreenshotSettingBody { enabled })
}

#[derive(Debug, Deserialize)]
struct SetScreenshotSettingBody {
    enabled: bool,
    user_id: Option<String>,
}

async fn set_screenshot_setting(
    State(state): State<AppState>,
    Json(body): Json<SetScreenshotSettingBody>,
) -> Json<SuccessBody> {
    let user_id = resolve_user(&body.user_id);
    let result = state
        .settings
        .update(&user_id, |mut s| {
            let mut custom = s.custom_settings.as_object().cloned().unwrap_or_default();
            custom.insert("screenshot_enabled".to_string(), json!(body.enabled));
            s.custom_settings = serde_json::Value::Object(custom);
            s
        })
        .await;
    Json(SuccessBody { success: result.is_ok() })
}

#[derive(Debug, Serialize)]
struct CurrentModelBody {
    model: String,
}

async fn current_model(
    State(state): State<AppState>,
    axum::extract::Query(q): axum::extract::Query<UserIdQuery>,
) -> Json<CurrentModelBody> {
    let user_id = resolve_user(&q.user_id);
    let model = state
        .settings
        .get(&user_id)
        .await
        .map(|s| s.chat_model)
        .unwrap_or_else(|_| state.config.defaults.chat_model.clone());
    Json(CurrentModelBody { model })
}

#[derive(Debug, Deserialize)]
struct ConversationClearBody {
    user_id: Option<String>,
}

/// `POST /conversation/clear` (§6): soft-deletes the user's chat-agent
/// conversation; memory items are untouched.
async fn conversation_clear(
    State(state): State<AppState>,
    Json(body): Json<ConversationClearBody>,
) -> Json<SuccessBody> {
    let user_id = resolve_user(&body.user_id);
    let Ok(user) = state
        .engine
        .users()
        .get_or_create(&user_id, &user_id, "", Some(DEFAULT_ORGANIZATION_ID))
        .await
    else {
        return Json(SuccessBody { success: false });
    };
    let settings = match state.settings.get(&user.id).await {
        Ok(s) => s,
        Err(_) => return Json(SuccessBody { success: false }),
    };
    let Ok(agent) = state
        .engine
        .agents()
        .get_or_create_for_type(&user.id, AgentType::Chat, &settings.chat_model)
        .await
    else {
        return Json(SuccessBody { success: false });
    };
    let result = state.engine.messages().soft_delete_for_user(&user_id, agent.id).await;
    Json(SuccessBody { success: result.is_ok() })
}
