#![deny(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

pub mod agent;
pub mod domain;
pub mod error;
pub mod memory;
pub mod provider;
pub mod step;
pub mod tools;
pub mod util;

pub use agent::{AgentSpec, Locale};
pub use domain::{
    AgentRecord, AgentType, ConfirmationStatus, ConfirmationTicket, ContentBlock, LlmConfig,
    MemoryConfig, Message, Organization, Role, User, UserSettings,
};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use memory::{
    CoreBlock, CoreMemory, CoreMemoryRepo, EpisodicItem, EpisodicRepo, KnowledgeVaultItem,
    KnowledgeVaultRepo, MemoryClass, MemoryHeader, MemoryOrchestrator, MemorySnippet,
    ProceduralItem, ProceduralRepo, ResourceItem, ResourceRepo, RetrievalCutoff, Scored,
    SearchMethod, SearchParams, SemanticItem, SemanticRepo,
};
pub use provider::{
    ChatRequest, ChatResponse, Embedder, ImagePart, LlmMessage, LlmProvider, StopReason,
    TokenUsage, ToolCallRequest, ToolSchema,
};
pub use step::{resume_messages, messages_to_llm, StepDeps, StepEvent, StepLoop, StopCondition, SuspendedStep, SuspendedStepTable};
pub use tools::{OtidCache, Tool, ToolContext, ToolRegistry, ToolResult};
