//! Identity, agent, and message types shared across the workspace (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub organization_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

/// One of the ten agent roles in the system (§3). One `Chat` agent and one of each
/// memory-specialist type exists per user; `Meta`, `Reflexion`, and `Background` are
/// process-wide utility roles invoked on behalf of a user but not user-configurable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Chat,
    CoreMemory,
    EpisodicMemory,
    SemanticMemory,
    ProceduralMemory,
    ResourceMemory,
    KnowledgeVault,
    Meta,
    Reflexion,
    Background,
}

impl AgentType {
    /// The memory class a specialist agent owns, if any.
    #[must_use]
    pub const fn owned_class(self) -> Option<crate::memory::MemoryClass> {
        use crate::memory::MemoryClass;
        match self {
            Self::CoreMemory => Some(MemoryClass::Core),
            Self::EpisodicMemory => Some(MemoryClass::Episodic),
            Self::SemanticMemory => Some(MemoryClass::Semantic),
            Self::ProceduralMemory => Some(MemoryClass::Procedural),
            Self::ResourceMemory => Some(MemoryClass::Resource),
            Self::KnowledgeVault => Some(MemoryClass::KnowledgeVault),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::CoreMemory => "core_memory",
            Self::EpisodicMemory => "episodic_memory",
            Self::SemanticMemory => "semantic_memory",
            Self::ProceduralMemory => "procedural_memory",
            Self::ResourceMemory => "resource_memory",
            Self::KnowledgeVault => "knowledge_vault",
            Self::Meta => "meta",
            Self::Reflexion => "reflexion",
            Self::Background => "background",
        }
    }
}

impl std::str::FromStr for AgentType {
    type Err = crate::error::EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Self::Chat),
            "core_memory" => Ok(Self::CoreMemory),
            "episodic_memory" => Ok(Self::EpisodicMemory),
            "semantic_memory" => Ok(Self::SemanticMemory),
            "procedural_memory" => Ok(Self::ProceduralMemory),
            "resource_memory" => Ok(Self::ResourceMemory),
            "knowledge_vault" => Ok(Self::KnowledgeVault),
            "meta" => Ok(Self::Meta),
            "reflexion" => Ok(Self::Reflexion),
            "background" => Ok(Self::Background),
            other => Err(crate::error::EngineError::InvalidInput(format!(
                "unknown agent type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub agent_type: AgentType,
    pub llm_config: LlmConfig,
    pub memory_config: MemoryConfig,
    pub system_prompt: String,
    pub persona: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub per_class_limit: usize,
    pub similarity_threshold: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            per_class_limit: 8,
            similarity_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// One part of a message's ordered `content` (§3). A plain-text chat message is a
/// single `Text` block; a tool-calling turn appends `ToolCall`/`ToolReturn` blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ImageReference { uri: String },
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    ToolReturn {
        id: String,
        content: String,
        is_error: bool,
    },
}

impl ContentBlock {
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text { text: s.into() }
    }

    /// Concatenate every `Text` block; used to build the legacy flat `text` field
    /// and for contexts (prompt assembly, logging) that only want plain prose.
    #[must_use]
    pub fn render_text(blocks: &[Self]) -> String {
        blocks
            .iter()
            .filter_map(|b| match b {
                Self::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// An append-only record ordered by `(agent_id, created_at, id)` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub user_id: String,
    pub role: Role,
    pub text: String,
    pub content: Vec<ContentBlock>,
    pub model: Option<String>,
    pub tool_call_id: Option<String>,
    pub step_id: Uuid,
    pub group_id: Option<Uuid>,
    pub sender_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    #[must_use]
    pub fn new(agent_id: Uuid, user_id: impl Into<String>, role: Role, step_id: Uuid, content: Vec<ContentBlock>) -> Self {
        let text = ContentBlock::render_text(&content);
        Self {
            id: Uuid::now_v7(),
            agent_id,
            user_id: user_id.into(),
            role,
            text,
            content,
            model: None,
            tool_call_id: None,
            step_id,
            group_id: None,
            sender_id: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    pub user_id: String,
    pub chat_model: String,
    pub memory_model: String,
    pub timezone: String,
    pub persona: String,
    pub persona_text: Option<String>,
    pub ui_preferences: serde_json::Value,
    pub custom_settings: serde_json::Value,
}

impl UserSettings {
    #[must_use]
    pub fn default_for(user_id: impl Into<String>, default_model: &str, default_persona: &str) -> Self {
        Self {
            user_id: user_id.into(),
            chat_model: default_model.to_string(),
            memory_model: default_model.to_string(),
            timezone: "UTC".to_string(),
            persona: default_persona.to_string(),
            persona_text: None,
            ui_preferences: serde_json::json!({}),
            custom_settings: serde_json::json!({}),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Pending,
    Approved,
    Denied,
    Expired,
}

/// Ephemeral handle created by `request_confirmation` (§4.4, §4.7.1). Lives only in
/// the in-memory suspended-step table, never in the Store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationTicket {
    pub id: Uuid,
    pub user_id: String,
    pub kind: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: ConfirmationStatus,
}

impl ConfirmationTicket {
    #[must_use]
    pub fn new(user_id: impl Into<String>, kind: impl Into<String>, details: serde_json::Value, ttl: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            user_id: user_id.into(),
            kind: kind.into(),
            details,
            created_at: now,
            expires_at: now + ttl,
            status: ConfirmationStatus::Pending,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == ConfirmationStatus::Pending && now >= self.expires_at
    }
}
