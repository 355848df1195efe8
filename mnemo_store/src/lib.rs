#![warn(
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
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation
)]

mod agents;
mod bootstrap;
mod convert;
mod core_memory;
mod dedup;
mod dimension;
mod engine;
mod episodic;
mod hybrid;
mod knowledge_vault;
mod lexical;
mod locks;
mod messages;
mod procedural;
mod resource;
mod scoring;
mod semantic;
mod settings;
mod users;

pub use agents::AgentManager;
pub use bootstrap::ensure_schema;
pub use convert::{embedding_to_json, json_to_embedding, json_to_strings, strings_to_json};
pub use core_memory::CoreMemoryManager;
pub use dedup::content_hash;
pub use dimension::DimensionRegistry;
pub use engine::{StorageEngine, DEFAULT_D_PAD};
pub use episodic::EpisodicManager;
pub use hybrid::{default_weights, merge_weighted, normalize_bm25};
pub use knowledge_vault::KnowledgeVaultManager;
pub use lexical::LexicalIndex;
pub use locks::CoreMemoryLocks;
pub use messages::MessageManager;
pub use procedural::ProceduralManager;
pub use resource::ResourceManager;
pub use scoring::{compute_salience, cosine_similarity};
pub use semantic::SemanticManager;
pub use settings::SettingsManager;
pub use users::{organization_from_row, UserManager, DEFAULT_ORGANIZATION_ID};
