//! External MCP passthrough (§4.4): a tool whose schema is mirrored from a
//! tool an externally-connected MCP server advertises, so the chat agent can
//! call it like any built-in. This crate only carries the `rmcp` server-side
//! features (§2.1); wiring an outbound MCP client transport is left to the
//! hosting process, so the handler reports that clearly rather than faking a
//! call.

use async_trait::async_trait;

use mnemo_core::error::EngineResult;
use mnemo_core::tools::{Tool, ToolContext, ToolResult};

pub struct ExternalToolProxy {
    name: String,
    description: String,
    schema: serde_json::Value,
    server_name: String,
}

impl ExternalToolProxy {
    #[must_use]
    pub const fn new(name: String, description: String, schema: serde_json::Value, server_name: String) -> Self {
        Self { name, description, schema, server_name }
    }
}

#[async_trait]
impl Tool for ExternalToolProxy {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn args_schema(&self) -> serde_json::Value {
        self.schema.clone()
    }

    async fn call(&self, _ctx: &ToolContext, _args: serde_json::Value) -> EngineResult<ToolResult> {
        Ok(ToolResult::error(format!(
            "external MCP server '{}' is not connected in this deployment",
            self.server_name
        )))
    }
}
