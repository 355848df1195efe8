//! `archival_search` (§4.4): the chat agent's on-demand counterpart to the
//! automatic context assembly in `mnemo_core::agent` — same hybrid search,
//! invoked explicitly against one class or all of them.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use mnemo_core::error::{EngineError, EngineResult};
use mnemo_core::memory::{MemoryClass, MemoryOrchestrator, SearchParams};
use mnemo_core::tools::{Tool, ToolContext, ToolResult};
use mnemo_store::StorageEngine;

pub struct ArchivalSearchTool {
    engine: Arc<StorageEngine>,
}

impl ArchivalSearchTool {
    #[must_use]
    pub const fn new(engine: Arc<StorageEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for ArchivalSearchTool {
    fn name(&self) -> &str {
        "archival_search"
    }

    fn description(&self) -> &str {
        "Searches long-term memory by hybrid (vector + keyword) relevance, one class or all six."
    }

    fn side_effecting(&self) -> bool {
        false
    }

    fn args_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "class": {
                    "type": "string",
                    "enum": ["core", "episodic", "semantic", "procedural", "resource", "knowledge_vault", "all"]
                },
                "limit": {"type": "integer"}
            },
            "required": ["query"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: serde_json::Value) -> EngineResult<ToolResult> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| EngineError::InvalidInput("missing required argument: query".to_string()))?;
        let limit = args
            .get("limit")
            .and_then(serde_json::Value::as_u64)
            .map_or(8, |n| n as usize);
        let class = args.get("class").and_then(|v| v.as_str()).unwrap_or("all");

        let snippets = if class == "all" {
            self.engine.search_all_classes(&ctx.user_id, query, limit, 0.7).await?
        } else {
            let class: MemoryClass = class.parse()?;
            self.engine
                .search_class(&ctx.user_id, class, &SearchParams::hybrid(query, limit, 0.7))
                .await?
        };

        if snippets.is_empty() {
            return Ok(ToolResult::success("no matching memories found"));
        }

        let body = snippets
            .iter()
            .map(|s| format!("[{}] (score {:.2}) {}", s.class.as_str(), s.score, s.body))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ToolResult::success(body))
    }
}
