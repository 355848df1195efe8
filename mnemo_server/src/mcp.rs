//! The MCP adapter (§4.9): four tools over the SSE transport at `mcp_path`.
//! Every call is routed to [`crate::state::DEFAULT_USER_ID`] rather than a
//! per-call `user_id` — this deployment has exactly one MCP-facing identity,
//! so there is no connection-level identity to route by (documented in
//! DESIGN.md).

use std::future::Future;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::tool::Parameters;
use rmcp::model::{
    Annotated, CallToolResult, ErrorCode, ErrorData as McpError, RawContent, RawResource,
    RawResourceContents, RawTextContent, ReadResourceResult, ServerCapabilities, ServerInfo,
};
use rmcp::transport::sse_server::{SseServer, SseServerConfig};
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use schemars::JsonSchema;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use mnemo_core::domain::AgentType;
use mnemo_core::error::EngineError;
use mnemo_core::memory::{MemoryClass, MemoryOrchestrator, SearchParams};
use mnemo_store::DEFAULT_ORGANIZATION_ID;

use crate::state::{AppState, DEFAULT_USER_ID};
use crate::turn::{self, TurnInput};

/// Cap applied to non-resource tool replies (§6 "response reshaping").
const RESPONSE_CAP: usize = 200;
/// Cap applied to resource reads and `memory_get_profile` (§6).
const RESOURCE_CAP: usize = 1000;
const DEFAULT_SEARCH_LIMIT: usize = 8;
const DEFAULT_SEARCH_THRESHOLD: f64 = 0.7;

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect::<String>() + "…"
    }
}

fn text_content(text: String) -> Annotated<RawContent> {
    Annotated::new(RawContent::Text(RawTextContent { text }), None)
}

fn internal_error(e: impl std::fmt::Display) -> McpError {
    McpError::new(ErrorCode::INTERNAL_ERROR, e.to_string(), None)
}

#[derive(Debug, Deserialize, JsonSchema)]
struct MemoryAddRequest {
    content: String,
    #[serde(default = "default_memory_type")]
    memory_type: String,
    context: Option<String>,
}

fn default_memory_type() -> String {
    "episodic".to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
struct MemorySearchRequest {
    query: String,
    memory_type: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct MemoryChatRequest {
    message: String,
}

#[derive(Clone)]
pub struct McpService {
    state: AppState,
    tool_router: ToolRouter<Self>,
}

impl McpService {
    #[must_use]
    pub fn new(state: AppState) -> Self {
        Self { state, tool_router: Self::tool_router() }
    }
}

#[tool_router]
impl McpService {
    #[tool(
        name = "memory_add",
        description = "Store a fact, preference, or event in long-term memory. memory_type selects the class: core, episodic, semantic, procedural, resource, or knowledge_vault (default episodic)."
    )]
    async fn memory_add(
        &self,
        Parameters(MemoryAddRequest { content, memory_type, context }): Parameters<MemoryAddRequest>,
    ) -> Result<CallToolResult, McpError> {
        if content.trim().is_empty() {
            return Err(McpError::new(ErrorCode::INVALID_PARAMS, "content must not be empty", None));
        }
        let prompt = context.map_or_else(
            || format!("Record this as {memory_type} memory: {content}"),
            |ctx| format!("Record this as {memory_type} memory: {content}\ncontext: {ctx}"),
        );

        let input = TurnInput {
            user_id: DEFAULT_USER_ID.to_string(),
            organization_id: DEFAULT_ORGANIZATION_ID.to_string(),
            message: Some(prompt),
            image_uris: Vec::new(),
            otid: None,
        };
        let prepared = turn::prepare_turn(
            &self.state.engine,
            &self.state.settings,
            &self.state.tools,
            AgentType::Meta,
            &input,
        )
        .await
        .map_err(internal_error)?;

        let agent_id = prepared.agent.id;
        let cancel = CancellationToken::new();
        let (suspended, events) = turn::run_turn_blocking(&prepared, &self.state.otids, &cancel)
            .await
            .map_err(internal_error)?;
        if suspended.is_some() {
            return Err(McpError::new(
                ErrorCode::INTERNAL_ERROR,
                "memory_add unexpectedly required confirmation",
                None,
            ));
        }

        let step_id = turn::now_step_id();
        turn::persist_step_events(&self.state.engine, agent_id, DEFAULT_USER_ID, step_id, &events)
            .await
            .map_err(internal_error)?;

        let reply = turn::final_text(&events).unwrap_or_else(|| "stored".to_string());
        Ok(CallToolResult::success(vec![text_content(truncate(&reply, RESPONSE_CAP))]))
    }

    #[tool(
        name = "memory_search",
        description = "Search stored memories by natural-language query. memory_type optionally scopes the search to one class (core, episodic, semantic, procedural, resource, knowledge_vault); omit or pass \"all\" to search every class."
    )]
    async fn memory_search(
        &self,
        Parameters(MemorySearchRequest { query, memory_type, limit }): Parameters<MemorySearchRequest>,
    ) -> Result<CallToolResult, McpError> {
        let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT);

        let snippets = match memory_type.as_deref() {
            None | Some("all") => self
                .state
                .engine
                .search_all_classes(DEFAULT_USER_ID, &query, limit, DEFAULT_SEARCH_THRESHOLD)
                .await
                .map_err(internal_error)?,
            Some(class_name) => {
                let class: MemoryClass = class_name
                    .parse()
                    .map_err(|e: EngineError| McpError::new(ErrorCode::INVALID_PARAMS, e.to_string(), None))?;
                let params = SearchParams::hybrid(query.clone(), limit, DEFAULT_SEARCH_THRESHOLD);
                self.state
                    .engine
                    .search_class(DEFAULT_USER_ID, class, &params)
                    .await
                    .map_err(internal_error)?
            }
        };

        let snippets: Vec<_> = snippets.into_iter().filter(|s| s.score >= DEFAULT_SEARCH_THRESHOLD).collect();

        if snippets.is_empty() {
            return Ok(CallToolResult::success(vec![text_content("no matching memories".to_string())]));
        }

        let text = snippets
            .iter()
            .map(|s| {
                let cap = if s.class == MemoryClass::Resource { RESOURCE_CAP } else { RESPONSE_CAP };
                format!("[{}] {}", s.class.as_str(), truncate(&s.body, cap))
            })
            .collect::<Vec<_>>()
            .join("\n");

        Ok(CallToolResult::success(vec![text_content(text)]))
    }

    #[tool(
        name = "memory_chat",
        description = "Send a short message to the memory-aware chat agent and get a reply grounded in the user's stored context. Messages and replies are capped to 200 characters."
    )]
    async fn memory_chat(
        &self,
        Parameters(MemoryChatRequest { message }): Parameters<MemoryChatRequest>,
    ) -> Result<CallToolResult, McpError> {
        let message = truncate(&message, RESPONSE_CAP);

        let (_, provider) = turn::resolve_model_for_agent_type(
            &self.state.engine,
            &self.state.settings,
            DEFAULT_USER_ID,
            DEFAULT_ORGANIZATION_ID,
            AgentType::Chat,
        )
        .await
        .map_err(internal_error)?;

        if let Some((provider, missing)) = turn::missing_credential(&provider) {
            return Ok(CallToolResult::success(vec![text_content(turn::missing_credential_message(
                &provider, &missing,
            ))]));
        }

        let input = TurnInput {
            user_id: DEFAULT_USER_ID.to_string(),
            organization_id: DEFAULT_ORGANIZATION_ID.to_string(),
            message: Some(message),
            image_uris: Vec::new(),
            otid: None,
        };

        let run = self.run_chat_turn(input);
        match tokio::time::timeout(turn::MCP_CHAT_TIMEOUT, run).await {
            Ok(Ok(reply)) => Ok(CallToolResult::success(vec![text_content(truncate(&reply, RESPONSE_CAP))])),
            Ok(Err(e)) => Ok(CallToolResult::success(vec![text_content(format!("chat failed: {e}"))])),
            Err(_) => Ok(CallToolResult::success(vec![text_content(
                "the chat agent took too long to reply, try a shorter message".to_string(),
            )])),
        }
    }

    #[tool(
        name = "memory_get_profile",
        description = "Return the user's Core Memory (persona and human blocks) plus an item count for every other memory class."
    )]
    async fn memory_get_profile(&self) -> Result<CallToolResult, McpError> {
        let core = self
            .state
            .engine
            .core_memory(DEFAULT_USER_ID, DEFAULT_ORGANIZATION_ID)
            .await
            .map_err(internal_error)?;
        let counts = self.state.engine.class_summary(DEFAULT_USER_ID).await.map_err(internal_error)?;

        let mut text = format!("persona: {}\nhuman: {}\n", core.persona, core.human);
        for (class, count) in counts {
            text.push_str(&format!("{}: {count}\n", class.as_str()));
        }

        Ok(CallToolResult::success(vec![text_content(truncate(&text, RESOURCE_CAP))]))
    }
}

impl McpService {
    fn run_chat_turn(&self, input: TurnInput) -> impl Future<Output = Result<String, EngineError>> + '_ {
        async move {
            let prepared =
                turn::prepare_chat_turn(&self.state.engine, &self.state.settings, &self.state.tools, &input).await?;
            let agent_id = prepared.agent.id;
            let cancel = CancellationToken::new();
            let (suspended, events) = turn::run_turn_blocking(&prepared, &self.state.otids, &cancel).await?;

            let step_id = turn::now_step_id();
            turn::persist_step_events(&self.state.engine, agent_id, DEFAULT_USER_ID, step_id, &events).await?;

            if suspended.is_some() {
                return Ok("this action requires confirmation; use the HTTP confirmation endpoint".to_string());
            }
            Ok(turn::final_text(&events).unwrap_or_else(|| "no reply".to_string()))
        }
    }
}

const STATUS_URI: &str = "mirix://status";
const STATS_URI: &str = "mirix://memory/stats";

#[tool_handler]
impl ServerHandler for McpService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "A memory-orchestration engine: store and retrieve facts across six memory classes, or chat with a memory-aware agent.".into(),
            ),
            capabilities: ServerCapabilities::builder()
                .enable_prompts()
                .enable_resources()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }

    async fn list_resources(
        &self,
        _request: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<rmcp::model::ListResourcesResult, McpError> {
        Ok(rmcp::model::ListResourcesResult {
            resources: vec![
                RawResource::new(STATUS_URI, "status").no_annotation(),
                RawResource::new(STATS_URI, "memory_stats").no_annotation(),
            ],
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        request: rmcp::model::ReadResourceRequestParam,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let text = match request.uri.as_str() {
            STATUS_URI => {
                let provider_ready =
                    mnemo_providers::credentials::resolve(mnemo_core::provider::provider_family_for_model(
                        &self
                            .state
                            .settings
                            .get(DEFAULT_USER_ID)
                            .await
                            .map_err(internal_error)?
                            .chat_model,
                    ))
                    .is_ok();
                format!("engine: running\nchat provider configured: {provider_ready}")
            }
            STATS_URI => {
                let counts = self.state.engine.class_summary(DEFAULT_USER_ID).await.map_err(internal_error)?;
                counts.iter().map(|(class, count)| format!("{}: {count}", class.as_str())).collect::<Vec<_>>().join("\n")
            }
            other => {
                return Err(McpError::new(ErrorCode::INVALID_PARAMS, format!("unknown resource {other}"), None));
            }
        };

        Ok(ReadResourceResult {
            contents: vec![RawResourceContents::text(truncate(&text, RESOURCE_CAP), request.uri).no_annotation()],
        })
    }
}

/// Mounts the MCP SSE transport at `mcp_path` (`/sse` by default, §6), handing
/// each new connection its own [`McpService`] over the shared [`AppState`].
#[must_use]
pub fn router(state: AppState, mcp_path: &str) -> axum::Router {
    let config = SseServerConfig {
        bind: "0.0.0.0:0".parse().expect("static bind address parses"),
        sse_path: mcp_path.to_string(),
        post_path: format!("{mcp_path}/message"),
        ct: CancellationToken::new(),
        sse_keep_alive: Some(std::time::Duration::from_secs(30)),
    };
    let (server, router) = SseServer::new(config);
    server.with_service(move || McpService::new(state.clone()));
    router
}
