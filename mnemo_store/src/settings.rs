//! `UserSettings` persistence (§4.10). Pure read/write against the Store; the
//! per-user TTL cache sitting in front of this lives in `mnemo_config`.

use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};

use mnemo_core::domain::UserSettings;
use mnemo_core::error::{EngineError, EngineResult};
use mnemo_entities::user_settings::{ActiveModel, Entity, Model};

pub struct SettingsManager {
    db: DatabaseConnection,
}

fn row_to_domain(model: Model) -> UserSettings {
    UserSettings {
        user_id: model.user_id,
        chat_model: model.chat_model,
        memory_model: model.memory_model,
        timezone: model.timezone,
        persona: model.persona,
        persona_text: model.persona_text,
        ui_preferences: model.ui_preferences,
        custom_settings: model.custom_settings,
    }
}

fn domain_to_active(settings: &UserSettings) -> ActiveModel {
    ActiveModel {
        user_id: Set(settings.user_id.clone()),
        chat_model: Set(settings.chat_model.clone()),
        memory_model: Set(settings.memory_model.clone()),
        timezone: Set(settings.timezone.clone()),
        persona: Set(settings.persona.clone()),
        persona_text: Set(settings.persona_text.clone()),
        ui_preferences: Set(settings.ui_preferences.clone()),
        custom_settings: Set(settings.custom_settings.clone()),
    }
}

impl SettingsManager {
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Returns the persisted row, lazily writing `defaults` on first read.
    pub async fn get_or_create(&self, user_id: &str, defaults: &UserSettings) -> EngineResult<UserSettings> {
        if let Some(existing) = Entity::find_by_id(user_id.to_string())
            .one(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?
        {
            return Ok(row_to_domain(existing));
        }
        let row = domain_to_active(defaults);
        let saved = row
            .insert(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        Ok(row_to_domain(saved))
    }

    /// Upserts the full settings row. Callers apply their patch to a
    /// previously read value and pass the merged result here.
    pub async fn put(&self, settings: &UserSettings) -> EngineResult<()> {
        let existing = Entity::find_by_id(settings.user_id.clone())
            .one(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;

        match existing {
            Some(row) => {
                let mut active: ActiveModel = row.into();
                active.chat_model = Set(settings.chat_model.clone());
                active.memory_model = Set(settings.memory_model.clone());
                active.timezone = Set(settings.timezone.clone());
                active.persona = Set(settings.persona.clone());
                active.persona_text = Set(settings.persona_text.clone());
                active.ui_preferences = Set(settings.ui_preferences.clone());
                active.custom_settings = Set(settings.custom_settings.clone());
                active
                    .update(&self.db)
                    .await
                    .map_err(|e| EngineError::Transient(e.to_string()))?;
            }
            None => {
                domain_to_active(settings)
                    .insert(&self.db)
                    .await
                    .map_err(|e| EngineError::Transient(e.to_string()))?;
            }
        }
        Ok(())
    }
}
