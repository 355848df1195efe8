//! Memory mutator tools (§4.4): one per memory class, each delegating straight
//! to its Memory Manager on the shared `StorageEngine`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use mnemo_core::error::{EngineError, EngineResult};
use mnemo_core::memory::{
    CoreBlock, CoreMemoryRepo, EpisodicItem, EpisodicRepo, KnowledgeVaultItem, KnowledgeVaultRepo, MemoryHeader,
    ProceduralItem, ProceduralRepo, ResourceItem, ResourceRepo, SemanticItem, SemanticRepo, DEFAULT_SEMANTIC_MERGE_THRESHOLD,
};
use mnemo_core::tools::{Tool, ToolContext, ToolResult};
use mnemo_store::StorageEngine;

fn new_header(user_id: &str, organization_id: &str) -> MemoryHeader {
    let now = chrono::Utc::now();
    MemoryHeader {
        id: uuid::Uuid::now_v7(),
        user_id: user_id.to_string(),
        organization_id: organization_id.to_string(),
        created_at: now,
        updated_at: now,
        is_deleted: false,
        metadata: json!({}),
        content_hash: String::new(),
        reinforcement_count: 0,
        user_dimension: None,
    }
}

fn required_str(args: &serde_json::Value, field: &str) -> EngineResult<String> {
    args.get(field)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| EngineError::InvalidInput(format!("missing required argument: {field}")))
}

pub struct CoreMemoryAppendTool {
    engine: Arc<StorageEngine>,
}

impl CoreMemoryAppendTool {
    #[must_use]
    pub const fn new(engine: Arc<StorageEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for CoreMemoryAppendTool {
    fn name(&self) -> &str {
        "core_memory_append"
    }

    fn description(&self) -> &str {
        "Appends text to a Core Memory block (human or persona)."
    }

    fn args_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "block": {"type": "string", "enum": ["human", "persona"]},
                "text": {"type": "string"}
            },
            "required": ["block", "text"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: serde_json::Value) -> EngineResult<ToolResult> {
        let block: CoreBlock = required_str(&args, "block")?.parse()?;
        let text = required_str(&args, "text")?;
        self.engine.core_memory_repo().append(&ctx.user_id, block, &text).await?;
        Ok(ToolResult::success("core memory block updated"))
    }
}

pub struct CoreMemoryReplaceTool {
    engine: Arc<StorageEngine>,
}

impl CoreMemoryReplaceTool {
    #[must_use]
    pub const fn new(engine: Arc<StorageEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for CoreMemoryReplaceTool {
    fn name(&self) -> &str {
        "core_memory_replace"
    }

    fn description(&self) -> &str {
        "Replaces the full contents of a Core Memory block."
    }

    fn args_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "block": {"type": "string", "enum": ["human", "persona"]},
                "text": {"type": "string"}
            },
            "required": ["block", "text"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: serde_json::Value) -> EngineResult<ToolResult> {
        let block: CoreBlock = required_str(&args, "block")?.parse()?;
        let text = required_str(&args, "text")?;
        self.engine.core_memory_repo().replace(&ctx.user_id, block, &text).await?;
        Ok(ToolResult::success("core memory block replaced"))
    }
}

pub struct EpisodicInsertTool {
    engine: Arc<StorageEngine>,
}

impl EpisodicInsertTool {
    #[must_use]
    pub const fn new(engine: Arc<StorageEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for EpisodicInsertTool {
    fn name(&self) -> &str {
        "episodic_insert"
    }

    fn description(&self) -> &str {
        "Records a new episodic memory from the conversation."
    }

    fn args_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "content": {"type": "string"},
                "importance": {"type": "number"}
            },
            "required": ["content"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: serde_json::Value) -> EngineResult<ToolResult> {
        let content = required_str(&args, "content")?;
        let importance = args.get("importance").and_then(serde_json::Value::as_f64).unwrap_or(0.5);
        let item = EpisodicItem {
            header: new_header(&ctx.user_id, &ctx.organization_id),
            content,
            timestamp: chrono::Utc::now(),
            importance,
            details_embedding: None,
        };
        let saved = self.engine.episodic_repo().create(item).await?;
        Ok(ToolResult::success(format!("episodic item {} recorded", saved.header.id)))
    }
}

pub struct SemanticUpsertTool {
    engine: Arc<StorageEngine>,
}

impl SemanticUpsertTool {
    #[must_use]
    pub const fn new(engine: Arc<StorageEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for SemanticUpsertTool {
    fn name(&self) -> &str {
        "semantic_upsert"
    }

    fn description(&self) -> &str {
        "Creates or reinforces a semantic concept memory, merging relations on conflict."
    }

    fn args_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "concept": {"type": "string"},
                "details": {"type": "string"},
                "category": {"type": "string"},
                "relations": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["concept", "details"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: serde_json::Value) -> EngineResult<ToolResult> {
        let concept = required_str(&args, "concept")?;
        let details = required_str(&args, "details")?;
        let category = args.get("category").and_then(|v| v.as_str()).map(str::to_string);
        let relations = args
            .get("relations")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let item = SemanticItem {
            header: new_header(&ctx.user_id, &ctx.organization_id),
            concept,
            details,
            category,
            relations,
            details_embedding: None,
        };
        let saved = self
            .engine
            .semantic_repo()
            .upsert(item, DEFAULT_SEMANTIC_MERGE_THRESHOLD)
            .await?;
        Ok(ToolResult::success(format!("semantic item {} upserted", saved.header.id)))
    }
}

pub struct ProceduralUpsertTool {
    engine: Arc<StorageEngine>,
}

impl ProceduralUpsertTool {
    #[must_use]
    pub const fn new(engine: Arc<StorageEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for ProceduralUpsertTool {
    fn name(&self) -> &str {
        "procedural_upsert"
    }

    fn description(&self) -> &str {
        "Records a step-by-step procedure."
    }

    fn args_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "summary": {"type": "string"},
                "steps": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["summary", "steps"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: serde_json::Value) -> EngineResult<ToolResult> {
        let summary = required_str(&args, "summary")?;
        let steps: Vec<String> = args
            .get("steps")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        if steps.is_empty() {
            return Err(EngineError::InvalidInput("missing required argument: steps".to_string()));
        }
        let item = ProceduralItem {
            header: new_header(&ctx.user_id, &ctx.organization_id),
            summary,
            steps,
            summary_embedding: None,
        };
        let saved = self.engine.procedural_repo().create(item).await?;
        Ok(ToolResult::success(format!("procedural item {} recorded", saved.header.id)))
    }
}

pub struct ResourceInsertTool {
    engine: Arc<StorageEngine>,
}

impl ResourceInsertTool {
    #[must_use]
    pub const fn new(engine: Arc<StorageEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for ResourceInsertTool {
    fn name(&self) -> &str {
        "resource_insert"
    }

    fn description(&self) -> &str {
        "Files a document or resource under a tree path."
    }

    fn args_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "content": {"type": "string"},
                "summary": {"type": "string"},
                "tree_path": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["name", "content", "summary"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: serde_json::Value) -> EngineResult<ToolResult> {
        let name = required_str(&args, "name")?;
        let content = required_str(&args, "content")?;
        let summary = required_str(&args, "summary")?;
        let tree_path = args
            .get("tree_path")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let item = ResourceItem {
            header: new_header(&ctx.user_id, &ctx.organization_id),
            name,
            content,
            summary,
            tree_path,
            summary_embedding: None,
        };
        let saved = self.engine.resource_repo().create(item).await?;
        Ok(ToolResult::success(format!("resource {} filed", saved.header.id)))
    }
}

pub struct KnowledgeVaultInsertTool {
    engine: Arc<StorageEngine>,
}

impl KnowledgeVaultInsertTool {
    #[must_use]
    pub const fn new(engine: Arc<StorageEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for KnowledgeVaultInsertTool {
    fn name(&self) -> &str {
        "knowledge_vault_insert"
    }

    fn description(&self) -> &str {
        "Stores a structured knowledge-vault entry (e.g. a credential or account fact)."
    }

    fn args_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "caption": {"type": "string"},
                "payload": {"type": "object"}
            },
            "required": ["caption", "payload"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: serde_json::Value) -> EngineResult<ToolResult> {
        let caption = required_str(&args, "caption")?;
        let payload = args
            .get("payload")
            .cloned()
            .ok_or_else(|| EngineError::InvalidInput("missing required argument: payload".to_string()))?;
        let item = KnowledgeVaultItem {
            header: new_header(&ctx.user_id, &ctx.organization_id),
            caption,
            payload,
        };
        let saved = self.engine.knowledge_vault_repo().create(item).await?;
        Ok(ToolResult::success(format!("knowledge vault entry {} stored", saved.header.id)))
    }
}
