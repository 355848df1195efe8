//! Knowledge Vault manager (§3, §4.5). Not vector-searchable (credentials and
//! similar opaque payloads have no meaningful embedding); lexical field
//! `caption` only, return body `caption`+`payload`.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use uuid::Uuid;

use mnemo_core::error::{EngineError, EngineResult};
use mnemo_core::memory::{KnowledgeVaultItem, KnowledgeVaultRepo, MemoryHeader, Scored};
use mnemo_core::util::content_hash;
use mnemo_entities::knowledge_vault::{ActiveModel, Column, Entity, Model};

use crate::lexical::LexicalIndex;

pub const CLASS: &str = "knowledge_vault";
pub const LEXICAL_FIELD: &str = "caption";

pub struct KnowledgeVaultManager {
    db: DatabaseConnection,
    lexical: Arc<LexicalIndex>,
}

impl KnowledgeVaultManager {
    #[must_use]
    pub fn new(db: DatabaseConnection, lexical: Arc<LexicalIndex>) -> Self {
        Self { db, lexical }
    }

    async fn rows_for_user(&self, user_id: &str) -> EngineResult<Vec<Model>> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::IsDeleted.eq(false))
            .all(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))
    }
}

fn row_to_domain(model: Model) -> KnowledgeVaultItem {
    KnowledgeVaultItem {
        header: MemoryHeader {
            id: model.id,
            user_id: model.user_id,
            organization_id: model.organization_id,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
            is_deleted: model.is_deleted,
            metadata: model.metadata,
            content_hash: model.content_hash,
            reinforcement_count: model.reinforcement_count,
            user_dimension: model.user_dimension,
        },
        caption: model.caption,
        payload: model.payload,
    }
}

#[async_trait]
impl KnowledgeVaultRepo for KnowledgeVaultManager {
    async fn create(&self, item: KnowledgeVaultItem) -> EngineResult<KnowledgeVaultItem> {
        let id = Uuid::now_v7();
        let now = Utc::now();
        let row = ActiveModel {
            id: Set(id),
            user_id: Set(item.header.user_id.clone()),
            organization_id: Set(item.header.organization_id.clone()),
            caption: Set(item.caption.clone()),
            payload: Set(item.payload.clone()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            is_deleted: Set(false),
            metadata: Set(item.header.metadata.clone()),
            content_hash: Set(content_hash(CLASS, &item.caption)),
            reinforcement_count: Set(0),
            user_dimension: Set(None),
        };
        let saved = row
            .insert(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        self.lexical
            .upsert(&item.header.user_id, CLASS, id, LEXICAL_FIELD, &item.caption)?;
        self.lexical.commit()?;
        Ok(row_to_domain(saved))
    }

    async fn soft_delete(&self, user_id: &str, id: Uuid) -> EngineResult<()> {
        let row = Entity::find_by_id(id)
            .filter(Column::UserId.eq(user_id))
            .one(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?
            .ok_or_else(|| EngineError::NotFound(format!("knowledge vault item {id} not found for user")))?;
        let mut active: ActiveModel = row.into();
        active.is_deleted = Set(true);
        active.updated_at = Set(Utc::now().into());
        active
            .update(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        self.lexical.remove(CLASS, id, &[LEXICAL_FIELD])?;
        self.lexical.commit()?;
        Ok(())
    }

    async fn list(&self, user_id: &str, limit: usize, offset: usize) -> EngineResult<Vec<KnowledgeVaultItem>> {
        let mut rows = self.rows_for_user(user_id).await?;
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(row_to_domain)
            .collect())
    }

    async fn search(&self, user_id: &str, query: &str, limit: usize) -> EngineResult<Vec<Scored<KnowledgeVaultItem>>> {
        let hits = self.lexical.search(user_id, CLASS, LEXICAL_FIELD, query, limit)?;
        let rows = self.rows_for_user(user_id).await?;
        let by_id: std::collections::HashMap<Uuid, Model> = rows.into_iter().map(|r| (r.id, r)).collect();
        Ok(hits
            .into_iter()
            .filter_map(|(id, score)| by_id.get(&id).cloned().map(|m| Scored { item: row_to_domain(m), score }))
            .collect())
    }
}
