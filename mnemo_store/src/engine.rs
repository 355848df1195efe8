//! `StorageEngine`: the `MemoryOrchestrator` implementation (§4.6 context
//! assembly, §4.4 `archival_search`, §4.9 MCP `memory_search`/`memory_get_profile`)
//! composing the six per-class managers behind one facade.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::DatabaseConnection;

use mnemo_core::error::EngineResult;
use mnemo_core::memory::{
    CoreBlock, CoreMemory, CoreMemoryRepo, EpisodicRepo, KnowledgeVaultRepo, MemoryClass, MemoryOrchestrator,
    MemorySnippet, ProceduralRepo, ResourceRepo, SearchParams, SemanticRepo, DEFAULT_CORE_MATCH_SIMILARITY,
};
use mnemo_core::provider::Embedder;

use crate::agents::AgentManager;
use crate::core_memory::CoreMemoryManager;
use crate::dimension::DimensionRegistry;
use crate::episodic::EpisodicManager;
use crate::knowledge_vault::KnowledgeVaultManager;
use crate::lexical::LexicalIndex;
use crate::locks::CoreMemoryLocks;
use crate::messages::MessageManager;
use crate::procedural::ProceduralManager;
use crate::resource::ResourceManager;
use crate::semantic::SemanticManager;
use crate::settings::SettingsManager;
use crate::users::UserManager;

pub const DEFAULT_D_PAD: usize = 4096;

pub struct StorageEngine {
    core: CoreMemoryManager,
    episodic: EpisodicManager,
    semantic: SemanticManager,
    procedural: ProceduralManager,
    resource: ResourceManager,
    knowledge_vault: KnowledgeVaultManager,
    users: UserManager,
    agents: AgentManager,
    messages: MessageManager,
    settings: SettingsManager,
}

impl StorageEngine {
    #[must_use]
    pub fn new(db: DatabaseConnection, embedder: Arc<dyn Embedder>, pad_width: usize) -> Self {
        let lexical = Arc::new(LexicalIndex::new().expect("in-memory tantivy index must construct"));
        let dimensions = Arc::new(DimensionRegistry::new());
        let locks = Arc::new(CoreMemoryLocks::new());

        Self {
            core: CoreMemoryManager::new(db.clone(), locks),
            episodic: EpisodicManager::new(db.clone(), embedder.clone(), lexical.clone(), dimensions.clone(), pad_width),
            semantic: SemanticManager::new(db.clone(), embedder.clone(), lexical.clone(), dimensions.clone(), pad_width),
            procedural: ProceduralManager::new(db.clone(), embedder.clone(), lexical.clone(), dimensions.clone(), pad_width),
            resource: ResourceManager::new(db.clone(), embedder, lexical.clone(), dimensions, pad_width),
            knowledge_vault: KnowledgeVaultManager::new(db.clone(), lexical),
            users: UserManager::new(db.clone()),
            agents: AgentManager::new(db.clone()),
            messages: MessageManager::new(db.clone()),
            settings: SettingsManager::new(db),
        }
    }

    #[must_use]
    pub const fn core_memory_repo(&self) -> &CoreMemoryManager {
        &self.core
    }

    #[must_use]
    pub const fn episodic_repo(&self) -> &EpisodicManager {
        &self.episodic
    }

    #[must_use]
    pub const fn semantic_repo(&self) -> &SemanticManager {
        &self.semantic
    }

    #[must_use]
    pub const fn procedural_repo(&self) -> &ProceduralManager {
        &self.procedural
    }

    #[must_use]
    pub const fn resource_repo(&self) -> &ResourceManager {
        &self.resource
    }

    #[must_use]
    pub const fn knowledge_vault_repo(&self) -> &KnowledgeVaultManager {
        &self.knowledge_vault
    }

    #[must_use]
    pub const fn users(&self) -> &UserManager {
        &self.users
    }

    #[must_use]
    pub const fn agents(&self) -> &AgentManager {
        &self.agents
    }

    #[must_use]
    pub const fn messages(&self) -> &MessageManager {
        &self.messages
    }

    #[must_use]
    pub const fn settings(&self) -> &SettingsManager {
        &self.settings
    }

    fn core_snippets(core: &CoreMemory, query: &str) -> Vec<MemorySnippet> {
        let needle = query.to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let mut hits = Vec::new();
        for (block, text) in [(CoreBlock::Human, &core.human), (CoreBlock::Persona, &core.persona)] {
            if text.to_lowercase().contains(&needle) {
                hits.push(MemorySnippet {
                    class: MemoryClass::Core,
                    id: core.header.id,
                    score: DEFAULT_CORE_MATCH_SIMILARITY,
                    happened_at: core.header.updated_at,
                    body: format!("{block:?}: {text}"),
                });
            }
        }
        hits
    }
}

#[async_trait]
impl MemoryOrchestrator for StorageEngine {
    async fn search_class(
        &self,
        user_id: &str,
        class: MemoryClass,
        params: &SearchParams,
    ) -> EngineResult<Vec<MemorySnippet>> {
        let snippets = match class {
            MemoryClass::Core => {
                let core = self.core.get_or_create(user_id, "").await?;
                Self::core_snippets(&core, &params.query)
            }
            MemoryClass::Episodic => self
                .episodic
                .search(user_id, params)
                .await?
                .into_iter()
                .map(|s| MemorySnippet {
                    class: MemoryClass::Episodic,
                    id: s.item.header.id,
                    score: s.score,
                    happened_at: s.item.timestamp,
                    body: s.item.content,
                })
                .collect(),
            MemoryClass::Semantic => self
                .semantic
                .search(user_id, params)
                .await?
                .into_iter()
                .map(|s| MemorySnippet {
                    class: MemoryClass::Semantic,
                    id: s.item.header.id,
                    score: s.score,
                    happened_at: s.item.header.updated_at,
                    body: format!("{}: {}", s.item.concept, s.item.details),
                })
                .collect(),
            MemoryClass::Procedural => self
                .procedural
                .search(user_id, params)
                .await?
                .into_iter()
                .map(|s| MemorySnippet {
                    class: MemoryClass::Procedural,
                    id: s.item.header.id,
                    score: s.score,
                    happened_at: s.item.header.updated_at,
                    body: format!("{}\n{}", s.item.summary, s.item.steps.join("\n")),
                })
                .collect(),
            MemoryClass::Resource => self
                .resource
                .search(user_id, params)
                .await?
                .into_iter()
                .map(|s| MemorySnippet {
                    class: MemoryClass::Resource,
                    id: s.item.header.id,
                    score: s.score,
                    happened_at: s.item.header.updated_at,
                    body: s.item.content,
                })
                .collect(),
            MemoryClass::KnowledgeVault => self
                .knowledge_vault
                .search(user_id, &params.query, params.limit)
                .await?
                .into_iter()
                .map(|s| MemorySnippet {
                    class: MemoryClass::KnowledgeVault,
                    id: s.item.header.id,
                    score: s.score,
                    happened_at: s.item.header.updated_at,
                    body: format!("{}: {}", s.item.caption, s.item.payload),
                })
                .collect(),
        };
        Ok(snippets)
    }

    async fn search_all_classes(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
        threshold: f64,
    ) -> EngineResult<Vec<MemorySnippet>> {
        let params = SearchParams::hybrid(query, limit, threshold);
        let mut all = Vec::new();
        for class in [
            MemoryClass::Episodic,
            MemoryClass::Semantic,
            MemoryClass::Procedural,
            MemoryClass::Resource,
            MemoryClass::KnowledgeVault,
            MemoryClass::Core,
        ] {
            all.extend(self.search_class(user_id, class, &params).await?);
        }
        Ok(all)
    }

    async fn core_memory(&self, user_id: &str, organization_id: &str) -> EngineResult<CoreMemory> {
        self.core.get_or_create(user_id, organization_id).await
    }

    async fn class_summary(&self, user_id: &str) -> EngineResult<Vec<(MemoryClass, usize)>> {
        let episodic = self.episodic.list(user_id, usize::MAX, 0).await?.len();
        let semantic = self.semantic.list(user_id, usize::MAX, 0).await?.len();
        let procedural = self.procedural.list(user_id, usize::MAX, 0).await?.len();
        let resource = self.resource.list(user_id, usize::MAX, 0).await?.len();
        let knowledge_vault = self.knowledge_vault.list(user_id, usize::MAX, 0).await?.len();
        Ok(vec![
            (MemoryClass::Core, 1),
            (MemoryClass::Episodic, episodic),
            (MemoryClass::Semantic, semantic),
            (MemoryClass::Procedural, procedural),
            (MemoryClass::Resource, resource),
            (MemoryClass::KnowledgeVault, knowledge_vault),
        ])
    }
}
