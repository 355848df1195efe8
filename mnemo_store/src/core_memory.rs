//! Core Memory (§3, §4.5): one row per user, two bounded text blocks,
//! read-modify-write serialised per user via [`CoreMemoryLocks`] (§5, §9).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use mnemo_core::error::{EngineError, EngineResult};
use mnemo_core::memory::{CoreBlock, CoreMemory, CoreMemoryRepo, MemoryHeader};
use mnemo_core::util::content_hash;
use mnemo_entities::core_memory::{ActiveModel, Column, Entity, Model};

use crate::locks::CoreMemoryLocks;

pub const DEFAULT_CHAR_LIMIT: usize = 2000;

pub struct CoreMemoryManager {
    db: DatabaseConnection,
    locks: Arc<CoreMemoryLocks>,
    char_limit: usize,
}

impl CoreMemoryManager {
    #[must_use]
    pub fn new(db: DatabaseConnection, locks: Arc<CoreMemoryLocks>) -> Self {
        Self {
            db,
            locks,
            char_limit: DEFAULT_CHAR_LIMIT,
        }
    }

    async fn find_or_create_row(&self, user_id: &str, organization_id: &str) -> EngineResult<Model> {
        if let Some(existing) = Entity::find()
            .filter(Column::UserId.eq(user_id))
            .one(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?
        {
            return Ok(existing);
        }
        let now = Utc::now().into();
        let row = ActiveModel {
            id: Set(Uuid::now_v7()),
            user_id: Set(user_id.to_string()),
            organization_id: Set(organization_id.to_string()),
            human: Set(String::new()),
            persona: Set(String::new()),
            char_limit: Set(i32::try_from(self.char_limit).unwrap_or(i32::MAX)),
            created_at: Set(now),
            updated_at: Set(now),
            is_deleted: Set(false),
            metadata: Set(serde_json::json!({})),
            content_hash: Set(content_hash("core", user_id)),
            reinforcement_count: Set(0),
            user_dimension: Set(None),
        };
        row.insert(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))
    }
}

fn row_to_domain(model: Model) -> CoreMemory {
    CoreMemory {
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
        human: model.human,
        persona: model.persona,
        #[allow(clippy::cast_sign_loss)]
        char_limit: model.char_limit as usize,
    }
}

#[async_trait]
impl CoreMemoryRepo for CoreMemoryManager {
    async fn get_or_create(&self, user_id: &str, organization_id: &str) -> EngineResult<CoreMemory> {
        let lock = self.locks.get(user_id);
        let _guard = lock.lock().await;
        let row = self.find_or_create_row(user_id, organization_id).await?;
        Ok(row_to_domain(row))
    }

    async fn append(&self, user_id: &str, block: CoreBlock, text: &str) -> EngineResult<CoreMemory> {
        let lock = self.locks.get(user_id);
        let _guard = lock.lock().await;
        let row = self.find_or_create_row(user_id, "").await?;
        let mut domain = row_to_domain(row.clone());
        domain.append(block, text)?;

        let mut active: ActiveModel = row.into();
        active.human = Set(domain.human.clone());
        active.persona = Set(domain.persona.clone());
        active.updated_at = Set(Utc::now().into());
        let saved = active
            .update(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        Ok(row_to_domain(saved))
    }

    async fn replace(&self, user_id: &str, block: CoreBlock, text: &str) -> EngineResult<CoreMemory> {
        let lock = self.locks.get(user_id);
        let _guard = lock.lock().await;
        let row = self.find_or_create_row(user_id, "").await?;
        let mut domain = row_to_domain(row.clone());
        domain.replace(block, text)?;

        let mut active: ActiveModel = row.into();
        active.human = Set(domain.human.clone());
        active.persona = Set(domain.persona.clone());
        active.updated_at = Set(Utc::now().into());
        let saved = active
            .update(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        Ok(row_to_domain(saved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_char_limit_matches_spec() {
        assert_eq!(DEFAULT_CHAR_LIMIT, 2000);
    }
}
