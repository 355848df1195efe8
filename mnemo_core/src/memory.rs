//! The six typed memory classes (§3), their shared search vocabulary (§4.5), and
//! the per-class repository capability traits that `mnemo_store` implements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineResult;

/// One of the six long-term memory categories (§9 design notes: "replace duck-typed
/// class names with a sum type").
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MemoryClass {
    Core,
    Episodic,
    Semantic,
    Procedural,
    Resource,
    KnowledgeVault,
}

impl MemoryClass {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Episodic => "episodic",
            Self::Semantic => "semantic",
            Self::Procedural => "procedural",
            Self::Resource => "resource",
            Self::KnowledgeVault => "knowledge_vault",
        }
    }

    #[must_use]
    pub const fn is_vector_searchable(self) -> bool {
        !matches!(self, Self::Core | Self::KnowledgeVault)
    }
}

impl std::str::FromStr for MemoryClass {
    type Err = crate::error::EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "core" => Ok(Self::Core),
            "episodic" => Ok(Self::Episodic),
            "semantic" => Ok(Self::Semantic),
            "procedural" => Ok(Self::Procedural),
            "resource" => Ok(Self::Resource),
            "knowledge_vault" | "knowledge-vault" => Ok(Self::KnowledgeVault),
            other => Err(crate::error::EngineError::InvalidInput(format!(
                "unknown memory class: {other}"
            ))),
        }
    }
}

/// Fields shared by every memory-item row (§3, §3.1). `user_dimension` records the
/// `D_model` the item's embedding was written at, per the §9 dimension-drift invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryHeader {
    pub id: Uuid,
    pub user_id: String,
    pub organization_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub metadata: serde_json::Value,
    pub content_hash: String,
    pub reinforcement_count: i32,
    pub user_dimension: Option<i32>,
}

/// Core Memory (§3): exactly one row per user, two bounded text blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreMemory {
    pub header: MemoryHeader,
    pub human: String,
    pub persona: String,
    pub char_limit: usize,
}

impl CoreMemory {
    #[must_use]
    pub fn block(&self, name: CoreBlock) -> &str {
        match name {
            CoreBlock::Human => &self.human,
            CoreBlock::Persona => &self.persona,
        }
    }

    /// Returns `InvalidInput` if the append would exceed `char_limit` (§8 property 4).
    pub fn append(&mut self, block: CoreBlock, text: &str) -> EngineResult<()> {
        let current = self.block(block);
        let candidate_len = current.len() + 1 + text.len();
        if candidate_len > self.char_limit {
            return Err(crate::error::EngineError::InvalidInput(format!(
                "core memory block {block:?} would exceed {} char limit",
                self.char_limit
            )));
        }
        let joined = if current.is_empty() {
            text.to_string()
        } else {
            format!("{current}\n{text}")
        };
        match block {
            CoreBlock::Human => self.human = joined,
            CoreBlock::Persona => self.persona = joined,
        }
        Ok(())
    }

    pub fn replace(&mut self, block: CoreBlock, text: &str) -> EngineResult<()> {
        if text.len() > self.char_limit {
            return Err(crate::error::EngineError::InvalidInput(format!(
                "core memory block {block:?} would exceed {} char limit",
                self.char_limit
            )));
        }
        match block {
            CoreBlock::Human => self.human = text.to_string(),
            CoreBlock::Persona => self.persona = text.to_string(),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CoreBlock {
    Human,
    Persona,
}

impl std::str::FromStr for CoreBlock {
    type Err = crate::error::EngineError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(Self::Human),
            "persona" => Ok(Self::Persona),
            other => Err(crate::error::EngineError::InvalidInput(format!(
                "unknown core memory block: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicItem {
    pub header: MemoryHeader,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub importance: f64,
    pub details_embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticItem {
    pub header: MemoryHeader,
    pub concept: String,
    pub details: String,
    pub category: Option<String>,
    pub relations: Vec<String>,
    pub details_embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProceduralItem {
    pub header: MemoryHeader,
    pub summary: String,
    pub steps: Vec<String>,
    pub summary_embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceItem {
    pub header: MemoryHeader,
    pub name: String,
    pub content: String,
    pub summary: String,
    pub tree_path: Vec<String>,
    pub summary_embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeVaultItem {
    pub header: MemoryHeader,
    pub caption: String,
    pub payload: serde_json::Value,
}

/// `search`'s retrieval method (§4.5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    Embedding,
    Bm25,
    Hybrid,
}

/// Post-hybrid-merge cutoff strategy (§4.5.1): a pluggable rule deciding how many
/// of a descending-sorted score list survive after the vector+BM25 merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalCutoff {
    AbsoluteThreshold(f64),
    RelativeThreshold(f64),
    ScoreCliff { min_gap: f64 },
    Elbow,
    Combined(Vec<RetrievalCutoff>),
}

impl RetrievalCutoff {
    /// Applies the strategy to a descending-sorted score list, returning the
    /// surviving prefix length.
    #[must_use]
    pub fn cutoff_len(&self, scores: &[f64]) -> usize {
        if scores.is_empty() {
            return 0;
        }
        match self {
            Self::AbsoluteThreshold(t) => scores.iter().take_while(|s| **s >= *t).count(),
            Self::RelativeThreshold(frac) => {
                let max = scores[0];
                scores.iter().take_while(|s| **s >= frac * max).count()
            }
            Self::ScoreCliff { min_gap } => {
                for i in 1..scores.len() {
                    if scores[i - 1] - scores[i] > *min_gap {
                        return i;
                    }
                }
                scores.len()
            }
            Self::Elbow => elbow_cutoff(scores),
            Self::Combined(strategies) => strategies
                .iter()
                .map(|s| s.cutoff_len(scores))
                .min()
                .unwrap_or(scores.len()),
        }
    }
}

/// Kneedle-style maximum-curvature cutoff: the index maximizing the perpendicular
/// distance from the chord between the first and last point of the sorted curve.
fn elbow_cutoff(scores: &[f64]) -> usize {
    if scores.len() < 3 {
        return scores.len();
    }
    let n = scores.len() as f64;
    let (x1, y1) = (0.0_f64, scores[0]);
    let (x2, y2) = (n - 1.0, scores[scores.len() - 1]);
    let line_len = ((x2 - x1).powi(2) + (y2 - y1).powi(2)).sqrt();
    if line_len < f64::EPSILON {
        return scores.len();
    }
    let mut best_idx = 0;
    let mut best_dist = -1.0_f64;
    for (i, &y) in scores.iter().enumerate() {
        let x = i as f64;
        let dist = ((x2 - x1) * (y1 - y) - (x1 - x) * (y2 - y1)).abs() / line_len;
        if dist > best_dist {
            best_dist = dist;
            best_idx = i;
        }
    }
    (best_idx + 1).max(1)
}

#[derive(Debug, Clone)]
pub struct SearchParams {
    pub method: SearchMethod,
    pub query: String,
    pub limit: usize,
    pub threshold: f64,
    pub cutoff: Option<RetrievalCutoff>,
}

impl SearchParams {
    #[must_use]
    pub fn hybrid(query: impl Into<String>, limit: usize, threshold: f64) -> Self {
        Self {
            method: SearchMethod::Hybrid,
            query: query.into(),
            limit,
            threshold,
            cutoff: None,
        }
    }
}

/// A search hit with the computed relevance score, used uniformly across classes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scored<T> {
    pub item: T,
    pub score: f64,
}

pub const DEFAULT_VECTOR_WEIGHT: f64 = 0.7;
pub const DEFAULT_BM25_WEIGHT: f64 = 0.3;
pub const DEFAULT_CORE_MATCH_SIMILARITY: f64 = 0.8;
pub const DEFAULT_SEMANTIC_MERGE_THRESHOLD: f64 = 0.92;

#[async_trait]
pub trait CoreMemoryRepo: Send + Sync {
    async fn get_or_create(&self, user_id: &str, organization_id: &str) -> EngineResult<CoreMemory>;
    async fn append(&self, user_id: &str, block: CoreBlock, text: &str) -> EngineResult<CoreMemory>;
    async fn replace(&self, user_id: &str, block: CoreBlock, text: &str) -> EngineResult<CoreMemory>;
}

#[async_trait]
pub trait EpisodicRepo: Send + Sync {
    async fn create(&self, item: EpisodicItem) -> EngineResult<EpisodicItem>;
    async fn soft_delete(&self, user_id: &str, id: Uuid) -> EngineResult<()>;
    async fn list(&self, user_id: &str, limit: usize, offset: usize) -> EngineResult<Vec<EpisodicItem>>;
    async fn search(&self, user_id: &str, params: &SearchParams) -> EngineResult<Vec<Scored<EpisodicItem>>>;
    async fn decay_importance(&self, user_id: &str, factor: f64, floor: f64) -> EngineResult<usize>;
}

#[async_trait]
pub trait SemanticRepo: Send + Sync {
    async fn create(&self, item: SemanticItem) -> EngineResult<SemanticItem>;
    async fn upsert(&self, item: SemanticItem, merge_threshold: f64) -> EngineResult<SemanticItem>;
    async fn soft_delete(&self, user_id: &str, id: Uuid) -> EngineResult<()>;
    async fn list(&self, user_id: &str, limit: usize, offset: usize) -> EngineResult<Vec<SemanticItem>>;
    async fn search(&self, user_id: &str, params: &SearchParams) -> EngineResult<Vec<Scored<SemanticItem>>>;
}

#[async_trait]
pub trait ProceduralRepo: Send + Sync {
    async fn create(&self, item: ProceduralItem) -> EngineResult<ProceduralItem>;
    async fn soft_delete(&self, user_id: &str, id: Uuid) -> EngineResult<()>;
    async fn list(&self, user_id: &str, limit: usize, offset: usize) -> EngineResult<Vec<ProceduralItem>>;
    async fn search(&self, user_id: &str, params: &SearchParams) -> EngineResult<Vec<Scored<ProceduralItem>>>;
}

#[async_trait]
pub trait ResourceRepo: Send + Sync {
    async fn create(&self, item: ResourceItem) -> EngineResult<ResourceItem>;
    async fn soft_delete(&self, user_id: &str, id: Uuid) -> EngineResult<()>;
    async fn list(&self, user_id: &str, limit: usize, offset: usize) -> EngineResult<Vec<ResourceItem>>;
    async fn search(&self, user_id: &str, params: &SearchParams) -> EngineResult<Vec<Scored<ResourceItem>>>;
}

#[async_trait]
pub trait KnowledgeVaultRepo: Send + Sync {
    async fn create(&self, item: KnowledgeVaultItem) -> EngineResult<KnowledgeVaultItem>;
    async fn soft_delete(&self, user_id: &str, id: Uuid) -> EngineResult<()>;
    async fn list(&self, user_id: &str, limit: usize, offset: usize) -> EngineResult<Vec<KnowledgeVaultItem>>;
    async fn search(&self, user_id: &str, query: &str, limit: usize) -> EngineResult<Vec<Scored<KnowledgeVaultItem>>>;
}

/// One rendered snippet ready to be spliced into an agent's system prompt (§4.6),
/// or returned from `archival_search`/MCP `memory_search` (§4.9) after field mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySnippet {
    pub class: MemoryClass,
    pub id: Uuid,
    pub score: f64,
    pub happened_at: DateTime<Utc>,
    pub body: String,
}

/// Aggregates hybrid search across the five non-Core classes and Core's
/// substring match, used by the chat-agent context assembler (§4.6), the
/// `archival_search` tool (§4.4), and the MCP adapter (§4.9). Implemented by
/// `mnemo_store`'s `StorageEngine`.
#[async_trait]
pub trait MemoryOrchestrator: Send + Sync {
    async fn search_class(
        &self,
        user_id: &str,
        class: MemoryClass,
        params: &SearchParams,
    ) -> EngineResult<Vec<MemorySnippet>>;

    /// Runs hybrid search over every non-Core class plus Core's substring match,
    /// returning up to `limit` snippets per class, per §4.6 step 2.
    async fn search_all_classes(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
        threshold: f64,
    ) -> EngineResult<Vec<MemorySnippet>>;

    async fn core_memory(&self, user_id: &str, organization_id: &str) -> EngineResult<CoreMemory>;

    /// A one-line-per-class count summary for `memory_get_profile` (§4.9).
    async fn class_summary(&self, user_id: &str) -> EngineResult<Vec<(MemoryClass, usize)>>;
}
