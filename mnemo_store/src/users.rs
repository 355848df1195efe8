//! Users and Organizations (§3): identity rows every other table scopes its
//! queries by. `get_or_create` lazily provisions both the user and its
//! organization row the first time an unfamiliar `user_id` is seen, matching
//! the rest of the engine's lazy-provisioning convention (Core Memory,
//! `UserSettings`).

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use mnemo_core::domain::{Organization, User};
use mnemo_core::error::{EngineError, EngineResult};
use mnemo_entities::organizations;
use mnemo_entities::users::{ActiveModel, Column, Entity, Model};

pub const DEFAULT_ORGANIZATION_ID: &str = "default";

pub struct UserManager {
    db: DatabaseConnection,
}

fn row_to_domain(model: Model) -> User {
    User {
        id: model.id,
        name: model.name,
        email: model.email,
        organization_id: model.organization_id,
        created_at: model.created_at.into(),
        updated_at: model.updated_at.into(),
        is_deleted: model.is_deleted,
    }
}

impl UserManager {
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn ensure_organization(&self, organization_id: &str) -> EngineResult<()> {
        let existing = organizations::Entity::find_by_id(organization_id.to_string())
            .one(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        if existing.is_some() {
            return Ok(());
        }
        let row = organizations::ActiveModel {
            id: Set(organization_id.to_string()),
            name: Set(organization_id.to_string()),
            created_at: Set(Utc::now().into()),
        };
        row.insert(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        Ok(())
    }

    pub async fn get(&self, user_id: &str) -> EngineResult<User> {
        Entity::find_by_id(user_id.to_string())
            .filter(Column::IsDeleted.eq(false))
            .one(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?
            .map(row_to_domain)
            .ok_or_else(|| EngineError::NotFound(format!("user {user_id} not found")))
    }

    /// Returns the existing user or lazily provisions one, along with its
    /// organization row, under `DEFAULT_ORGANIZATION_ID` unless `organization_id`
    /// is given.
    pub async fn get_or_create(
        &self,
        user_id: &str,
        name: &str,
        email: &str,
        organization_id: Option<&str>,
    ) -> EngineResult<User> {
        if let Some(existing) = Entity::find_by_id(user_id.to_string())
            .one(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?
        {
            return Ok(row_to_domain(existing));
        }
        let organization_id = organization_id.unwrap_or(DEFAULT_ORGANIZATION_ID);
        self.ensure_organization(organization_id).await?;
        let now = Utc::now();
        let row = ActiveModel {
            id: Set(user_id.to_string()),
            name: Set(name.to_string()),
            email: Set(email.to_string()),
            organization_id: Set(organization_id.to_string()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            is_deleted: Set(false),
        };
        let saved = row
            .insert(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        Ok(row_to_domain(saved))
    }

    /// All non-deleted users, for background maintenance that must sweep
    /// every user (§4.5 importance decay).
    pub async fn list_active(&self) -> EngineResult<Vec<User>> {
        Entity::find()
            .filter(Column::IsDeleted.eq(false))
            .all(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))
            .map(|rows| rows.into_iter().map(row_to_domain).collect())
    }

    pub async fn soft_delete(&self, user_id: &str) -> EngineResult<()> {
        let row = Entity::find_by_id(user_id.to_string())
            .one(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?
            .ok_or_else(|| EngineError::NotFound(format!("user {user_id} not found")))?;
        let mut active: ActiveModel = row.into();
        active.is_deleted = Set(true);
        active.updated_at = Set(Utc::now().into());
        active
            .update(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        Ok(())
    }
}

#[must_use]
pub fn organization_from_row(model: organizations::Model) -> Organization {
    Organization {
        id: model.id,
        name: model.name,
        created_at: model.created_at.into(),
    }
}
