//! Agent definitions and the chat-agent context assembler (§4.6). Grounded on the
//! reference `AgentLoop::build_system_prompt`, generalized from a single combined
//! memory list to one hybrid search per non-Core class, interleaved by score.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AgentType, LlmConfig};
use crate::error::EngineResult;
use crate::memory::{MemoryOrchestrator, MemorySnippet};

/// A named configuration of (system prompt template, tool allowlist, LLM config)
/// used for one role in the system (GLOSSARY: Agent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub agent_type: AgentType,
    pub system_prompt_template: String,
    pub tool_allowlist: Vec<String>,
    pub llm_config: LlmConfig,
    pub max_steps: u32,
}

impl AgentSpec {
    /// Every agent role's default tool allowlist and step bound (§4.6, §4.7).
    #[must_use]
    pub fn default_for(agent_type: AgentType, default_model: &str) -> Self {
        let llm_config = LlmConfig {
            provider: crate::provider::provider_family_for_model(default_model).to_string(),
            model: default_model.to_string(),
            max_tokens: 4096,
            temperature: 0.7,
        };
        let (system_prompt_template, tool_allowlist, max_steps) = match agent_type {
            AgentType::Chat => (
                crate::util::DEFAULT_SYSTEM_PROMPT_WITH_MEMORY.to_string(),
                vec![
                    "archival_search".to_string(),
                    "send_message".to_string(),
                    "request_confirmation".to_string(),
                ],
                20,
            ),
            AgentType::CoreMemory => (
                "You maintain the user's Core Memory blocks.".to_string(),
                vec![
                    "core_memory_append".to_string(),
                    "core_memory_replace".to_string(),
                    "send_message".to_string(),
                ],
                20,
            ),
            AgentType::EpisodicMemory => (
                "You record episodic memories from conversation.".to_string(),
                vec!["episodic_insert".to_string(), "send_message".to_string()],
                20,
            ),
            AgentType::SemanticMemory => (
                "You maintain semantic concept memories.".to_string(),
                vec!["semantic_upsert".to_string(), "send_message".to_string()],
                20,
            ),
            AgentType::ProceduralMemory => (
                "You record step-by-step procedures.".to_string(),
                vec!["procedural_upsert".to_string(), "send_message".to_string()],
                20,
            ),
            AgentType::ResourceMemory => (
                "You file documents and resources.".to_string(),
                vec!["resource_insert".to_string(), "send_message".to_string()],
                20,
            ),
            AgentType::KnowledgeVault => (
                "You store structured knowledge-vault entries.".to_string(),
                vec![
                    "knowledge_vault_insert".to_string(),
                    "send_message".to_string(),
                ],
                20,
            ),
            AgentType::Meta => (
                "You classify ingestion text into memory classes and dispatch mutators.".to_string(),
                vec![
                    "core_memory_append".to_string(),
                    "episodic_insert".to_string(),
                    "semantic_upsert".to_string(),
                    "procedural_upsert".to_string(),
                    "resource_insert".to_string(),
                    "knowledge_vault_insert".to_string(),
                    "summarise".to_string(),
                    "send_message".to_string(),
                ],
                20,
            ),
            AgentType::Reflexion => (
                "Given the just-completed transcript, capture any generalizable lessons.".to_string(),
                vec![
                    "semantic_upsert".to_string(),
                    "procedural_upsert".to_string(),
                    "send_message".to_string(),
                ],
                3,
            ),
            AgentType::Background => (
                "You perform background maintenance tasks.".to_string(),
                vec!["send_message".to_string()],
                5,
            ),
        };
        Self {
            agent_type,
            system_prompt_template,
            tool_allowlist,
            llm_config,
            max_steps,
        }
    }
}

/// Locale for the "time ago" phrasing prefixed to retrieved snippets (§4.6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Locale {
    #[default]
    English,
    Chinese,
}

#[must_use]
pub fn time_ago(timestamp: DateTime<Utc>, locale: Locale) -> String {
    let duration = Utc::now().signed_duration_since(timestamp);
    match locale {
        Locale::Chinese => {
            if duration.num_days() > 0 {
                format!("{}天前", duration.num_days())
            } else if duration.num_hours() > 0 {
                format!("{}小时前", duration.num_hours())
            } else if duration.num_minutes() > 0 {
                format!("{}分钟前", duration.num_minutes())
            } else {
                "刚刚".to_string()
            }
        }
        Locale::English => {
            if duration.num_days() > 0 {
                format!("{} days ago", duration.num_days())
            } else if duration.num_hours() > 0 {
                format!("{} hours ago", duration.num_hours())
            } else if duration.num_minutes() > 0 {
                format!("{} minutes ago", duration.num_minutes())
            } else {
                "just now".to_string()
            }
        }
    }
}

/// Default per-class retrieval limit/threshold for context assembly (§4.6).
pub const CONTEXT_PER_CLASS_LIMIT: usize = 8;
pub const CONTEXT_SIMILARITY_THRESHOLD: f64 = 0.7;

/// Builds the chat agent's system prompt: Core Memory verbatim, then a bounded,
/// score-interleaved slice of hybrid-search snippets across the other classes,
/// trimmed to `budget_chars` (a stand-in for "context window minus reply reserve").
pub async fn assemble_chat_context(
    orchestrator: &dyn MemoryOrchestrator,
    user_id: &str,
    organization_id: &str,
    template: &str,
    user_message: &str,
    budget_chars: usize,
    locale: Locale,
) -> EngineResult<String> {
    let core = orchestrator.core_memory(user_id, organization_id).await?;
    let mut snippets = orchestrator
        .search_all_classes(
            user_id,
            user_message,
            CONTEXT_PER_CLASS_LIMIT,
            CONTEXT_SIMILARITY_THRESHOLD,
        )
        .await?;
    snippets.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut prompt = String::new();
    prompt.push_str(template);
    prompt.push_str("\n\n# Core Memory\n");
    prompt.push_str(&format!("## Human\n{}\n", core.human));
    prompt.push_str(&format!("## Persona\n{}\n", core.persona));

    let mut body = String::new();
    body.push_str("\n# Relevant Memories\n");
    let mut used = prompt.len() + body.len();
    for s in &snippets {
        let line = format_snippet(s, locale);
        if used + line.len() > budget_chars {
            break;
        }
        used += line.len();
        body.push_str(&line);
    }
    prompt.push_str(&body);
    Ok(prompt)
}

fn format_snippet(s: &MemorySnippet, locale: Locale) -> String {
    format!(
        "- [{}] ({}) {}\n",
        time_ago(s.happened_at, locale),
        s.class.as_str(),
        s.body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_locale_recent() {
        let s = time_ago(Utc::now(), Locale::English);
        assert_eq!(s, "just now");
    }

    #[test]
    fn default_chat_spec_has_send_message() {
        let spec = AgentSpec::default_for(AgentType::Chat, "deepseek-chat");
        assert!(spec.tool_allowlist.contains(&"send_message".to_string()));
    }
}
