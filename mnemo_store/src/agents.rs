//! Agent records (§3): one `chat` agent and one of each specialist type per
//! user. `get_or_create_for_type` is the provisioning path the Step Loop's
//! callers use so a fresh user gets its full agent roster lazily rather than
//! through an admin bootstrap step.

use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use mnemo_core::domain::{AgentRecord, AgentType, LlmConfig, MemoryConfig};
use mnemo_core::error::{EngineError, EngineResult};
use mnemo_entities::agents::{ActiveModel, Column, Entity, Model};

pub struct AgentManager {
    db: DatabaseConnection,
}

fn row_to_domain(model: Model) -> EngineResult<AgentRecord> {
    let agent_type: AgentType = model.agent_type.parse()?;
    let llm_config: LlmConfig = serde_json::from_value(model.llm_config)?;
    let memory_config: MemoryConfig = serde_json::from_value(model.memory_config)?;
    Ok(AgentRecord {
        id: model.id,
        user_id: model.user_id,
        name: model.name,
        agent_type,
        llm_config,
        memory_config,
        system_prompt: model.system_prompt,
        persona: model.persona,
        is_active: model.is_active,
    })
}

impl AgentManager {
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn get(&self, agent_id: Uuid) -> EngineResult<AgentRecord> {
        let row = Entity::find_by_id(agent_id)
            .one(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?
            .ok_or_else(|| EngineError::NotFound(format!("agent {agent_id} not found")))?;
        row_to_domain(row)
    }

    pub async fn list_for_user(&self, user_id: &str) -> EngineResult<Vec<AgentRecord>> {
        let rows = Entity::find()
            .filter(Column::UserId.eq(user_id))
            .all(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        rows.into_iter().map(row_to_domain).collect()
    }

    /// Returns the user's agent of `agent_type`, provisioning one from the
    /// role's default spec (§4.6) on first use.
    pub async fn get_or_create_for_type(
        &self,
        user_id: &str,
        agent_type: AgentType,
        default_model: &str,
    ) -> EngineResult<AgentRecord> {
        if let Some(existing) = Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::AgentType.eq(agent_type.as_str()))
            .one(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?
        {
            return row_to_domain(existing);
        }

        let spec = mnemo_core::agent::AgentSpec::default_for(agent_type, default_model);
        let row = ActiveModel {
            id: Set(Uuid::now_v7()),
            user_id: Set(user_id.to_string()),
            name: Set(format!("{user_id}-{}", agent_type.as_str())),
            agent_type: Set(agent_type.as_str().to_string()),
            llm_config: Set(serde_json::to_value(&spec.llm_config)?),
            memory_config: Set(serde_json::to_value(MemoryConfig::default())?),
            system_prompt: Set(spec.system_prompt_template),
            persona: Set(None),
            is_active: Set(true),
        };
        let saved = row
            .insert(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        row_to_domain(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_type_round_trips_through_its_string_form() {
        for t in [
            AgentType::Chat,
            AgentType::CoreMemory,
            AgentType::EpisodicMemory,
            AgentType::SemanticMemory,
            AgentType::ProceduralMemory,
            AgentType::ResourceMemory,
            AgentType::KnowledgeVault,
            AgentType::Meta,
            AgentType::Reflexion,
            AgentType::Background,
        ] {
            let parsed: AgentType = t.as_str().parse().unwrap();
            assert_eq!(parsed, t);
        }
    }
}
