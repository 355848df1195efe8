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
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation
)]

//! The concrete `Tool` catalog (§4.4): memory mutators, `archival_search`, the
//! two step-loop-intercepted tools (`send_message`, `request_confirmation`),
//! the meta-agent's `summarise` fallback, and an external MCP passthrough shape.

mod archival_search;
mod external_proxy;
mod memory_tools;
mod send_message;
mod summarise;

pub use archival_search::ArchivalSearchTool;
pub use external_proxy::ExternalToolProxy;
pub use memory_tools::{
    CoreMemoryAppendTool, CoreMemoryReplaceTool, EpisodicInsertTool, KnowledgeVaultInsertTool,
    ProceduralUpsertTool, ResourceInsertTool, SemanticUpsertTool,
};
pub use send_message::{RequestConfirmationTool, SendMessageTool};
pub use summarise::SummariseTool;

use std::sync::Arc;

use mnemo_core::tools::{Tool, ToolRegistry};
use mnemo_store::StorageEngine;

/// Registers every built-in tool against a shared `StorageEngine`, in the
/// order a fresh user sees them listed in `tools.schemas()`.
#[must_use]
pub fn build_default_registry(engine: Arc<StorageEngine>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(CoreMemoryAppendTool::new(engine.clone())),
        Arc::new(CoreMemoryReplaceTool::new(engine.clone())),
        Arc::new(EpisodicInsertTool::new(engine.clone())),
        Arc::new(SemanticUpsertTool::new(engine.clone())),
        Arc::new(ProceduralUpsertTool::new(engine.clone())),
        Arc::new(ResourceInsertTool::new(engine.clone())),
        Arc::new(KnowledgeVaultInsertTool::new(engine.clone())),
        Arc::new(ArchivalSearchTool::new(engine)),
        Arc::new(SendMessageTool),
        Arc::new(RequestConfirmationTool),
        Arc::new(SummariseTool),
    ];
    for tool in tools {
        registry.register(tool);
    }
    registry
}
