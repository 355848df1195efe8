//! Tool Registry & Sandbox (§4.4): a catalog of callable tools keyed by name, each
//! with a JSON-schema argument check ahead of its handler, plus an `otid` dedup table.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

/// Context a tool handler executes under: whose turn it is, which agent invoked
/// it, and whether the call carried a caller-provided `otid` for idempotence.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub user_id: String,
    pub organization_id: String,
    pub agent_id: Uuid,
    pub otid: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    #[must_use]
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    #[must_use]
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// One callable tool (§4.4): name, argument schema, a side-effect flag, and an
/// async handler. `side_effecting` tools participate in the `otid` dedup table.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn args_schema(&self) -> serde_json::Value;
    fn side_effecting(&self) -> bool {
        true
    }
    async fn call(&self, ctx: &ToolContext, args: serde_json::Value) -> EngineResult<ToolResult>;
}

/// LRU-ish TTL table for `(agent_id, otid)` -> prior result, enforcing §8 property 8
/// (idempotence within 60 s) and §4.4's duplicate-`otid` collapse rule.
pub struct OtidCache {
    entries: DashMap<(Uuid, String), (ToolResult2, Instant)>,
    ttl: Duration,
}

/// `ToolResult` isn't `Clone`-friendly enough to dedupe by value easily if it grew
/// extra fields later; kept as a thin clone wrapper so the cache doesn't borrow.
#[derive(Debug, Clone)]
pub struct ToolResult2 {
    pub content: String,
    pub is_error: bool,
}

impl From<&ToolResult> for ToolResult2 {
    fn from(r: &ToolResult) -> Self {
        Self {
            content: r.content.clone(),
            is_error: r.is_error,
        }
    }
}

impl From<ToolResult2> for ToolResult {
    fn from(r: ToolResult2) -> Self {
        Self {
            content: r.content,
            is_error: r.is_error,
        }
    }
}

impl OtidCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    #[must_use]
    pub fn get(&self, agent_id: Uuid, otid: &str) -> Option<ToolResult> {
        let key = (agent_id, otid.to_string());
        let hit = self.entries.get(&key)?;
        let (result, inserted_at) = hit.value().clone();
        if inserted_at.elapsed() > self.ttl {
            drop(hit);
            self.entries.remove(&key);
            return None;
        }
        Some(result.into())
    }

    pub fn put(&self, agent_id: Uuid, otid: &str, result: &ToolResult) {
        self.entries.insert(
            (agent_id, otid.to_string()),
            (result.into(), Instant::now()),
        );
    }

    /// Drops every entry older than the TTL; call periodically from a sweep task.
    pub fn sweep(&self) {
        self.entries
            .retain(|_, (_, inserted_at)| inserted_at.elapsed() <= self.ttl);
    }
}

impl Default for OtidCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

/// Catalog of callable tools, keyed by name (§4.4).
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// Builds a registry containing only the named tools, preserving their
    /// relative order, for an agent's `tool_allowlist` (§4.6).
    #[must_use]
    pub fn subset(&self, names: &[String]) -> Self {
        let tools = self
            .tools
            .iter()
            .filter(|t| names.iter().any(|n| n == t.name()))
            .cloned()
            .collect();
        Self { tools }
    }

    #[must_use]
    pub fn schemas(&self) -> Vec<crate::provider::ToolSchema> {
        self.tools
            .iter()
            .map(|t| crate::provider::ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.args_schema(),
            })
            .collect()
    }

    /// Executes one tool call against the registry and the `otid` dedup table.
    /// An unknown tool or one whose arguments don't validate against its own
    /// schema's required fields fails with `InvalidInput` without invoking the
    /// handler (§4.4).
    pub async fn dispatch(
        &self,
        ctx: &ToolContext,
        otids: &OtidCache,
        name: &str,
        args: serde_json::Value,
    ) -> ToolResult {
        let Some(tool) = self.get(name) else {
            return ToolResult::error(format!("unknown tool: {name}"));
        };

        if let Err(e) = validate_required(&tool.args_schema(), &args) {
            return ToolResult::error(e.to_string());
        }

        if tool.side_effecting() {
            if let Some(otid) = &ctx.otid {
                if let Some(cached) = otids.get(ctx.agent_id, otid) {
                    return cached;
                }
            }
        }

        let result = match tool.call(ctx, args).await {
            Ok(r) => r,
            Err(e) => ToolResult::error(e.to_string()),
        };

        if tool.side_effecting() {
            if let Some(otid) = &ctx.otid {
                otids.put(ctx.agent_id, otid, &result);
            }
        }

        result
    }
}

/// Minimal JSON-schema `required` validation: every name listed in the schema's
/// top-level `required` array must be present in `args`. Deep schema validation
/// is left to the handler; this only enforces the `InvalidInput`-before-handler
/// contract of §4.4.
fn validate_required(schema: &serde_json::Value, args: &serde_json::Value) -> EngineResult<()> {
    let Some(required) = schema.get("required").and_then(|v| v.as_array()) else {
        return Ok(());
    };
    for field in required {
        let Some(field) = field.as_str() else {
            continue;
        };
        if args.get(field).is_none() {
            return Err(EngineError::InvalidInput(format!(
                "missing required argument: {field}"
            )));
        }
    }
    Ok(())
}
