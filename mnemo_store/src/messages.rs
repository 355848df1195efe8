//! Conversation transcript (§3, §6). Append-only except for the soft-delete
//! path backing `POST /conversation/clear`.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use mnemo_core::domain::{ContentBlock, Message, Role};
use mnemo_core::error::{EngineError, EngineResult};
use mnemo_entities::messages::{ActiveModel, Column, Entity, Model};

pub struct MessageManager {
    db: DatabaseConnection,
}

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
        Role::Tool => "tool",
    }
}

fn str_to_role(s: &str) -> EngineResult<Role> {
    match s {
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        "system" => Ok(Role::System),
        "tool" => Ok(Role::Tool),
        other => Err(EngineError::InvalidInput(format!("unknown role: {other}"))),
    }
}

fn row_to_domain(model: Model) -> EngineResult<Message> {
    let content: Vec<ContentBlock> = serde_json::from_value(model.content)?;
    Ok(Message {
        id: model.id,
        agent_id: model.agent_id,
        user_id: model.user_id,
        role: str_to_role(&model.role)?,
        text: model.text,
        content,
        model: model.model,
        tool_call_id: model.tool_call_id,
        step_id: model.step_id,
        group_id: model.group_id,
        sender_id: model.sender_id,
        created_at: model.created_at.into(),
    })
}

impl MessageManager {
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn insert(&self, message: &Message) -> EngineResult<()> {
        let row = ActiveModel {
            id: Set(message.id),
            agent_id: Set(message.agent_id),
            user_id: Set(message.user_id.clone()),
            role: Set(role_to_str(message.role).to_string()),
            text: Set(message.text.clone()),
            content: Set(serde_json::to_value(&message.content)?),
            model: Set(message.model.clone()),
            tool_call_id: Set(message.tool_call_id.clone()),
            step_id: Set(message.step_id),
            group_id: Set(message.group_id),
            sender_id: Set(message.sender_id.clone()),
            created_at: Set(message.created_at.into()),
            is_deleted: Set(false),
        };
        row.insert(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        Ok(())
    }

    /// Last `limit` non-deleted messages for `agent_id`, oldest first, ready to
    /// feed straight into a provider's chat-turn list.
    pub async fn list_for_agent(&self, agent_id: Uuid, limit: usize) -> EngineResult<Vec<Message>> {
        let rows = Entity::find()
            .filter(Column::AgentId.eq(agent_id))
            .filter(Column::IsDeleted.eq(false))
            .order_by_desc(Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        let mut messages: Vec<Message> = rows
            .into_iter()
            .take(limit)
            .map(row_to_domain)
            .collect::<EngineResult<_>>()?;
        messages.reverse();
        Ok(messages)
    }

    /// Soft-deletes every message belonging to `user_id` on `agent_id` — the
    /// `/conversation/clear` endpoint's mutation (§6). History stays in the
    /// table for audit, just excluded from future reads.
    pub async fn soft_delete_for_user(&self, user_id: &str, agent_id: Uuid) -> EngineResult<u64> {
        let rows = Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::AgentId.eq(agent_id))
            .filter(Column::IsDeleted.eq(false))
            .all(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        let count = rows.len() as u64;
        for row in rows {
            let mut active: ActiveModel = row.into();
            active.is_deleted = Set(true);
            active
                .update(&self.db)
                .await
                .map_err(|e| EngineError::Transient(e.to_string()))?;
        }
        Ok(count)
    }
}
