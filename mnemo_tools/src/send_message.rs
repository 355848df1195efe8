//! `send_message` and `request_confirmation` (§4.4, §4.7): both names are
//! intercepted by `mnemo_core::step::StepLoop::run` before a tool call ever
//! reaches the registry, so these handlers only exist to publish a schema the
//! LLM can target through normal tool-calling. Their `call` bodies are dead
//! code in practice; they return a result only if something dispatches them
//! directly (e.g. a unit test exercising the registry in isolation).

use async_trait::async_trait;
use serde_json::json;

use mnemo_core::error::EngineResult;
use mnemo_core::tools::{Tool, ToolContext, ToolResult};

pub struct SendMessageTool;

#[async_trait]
impl Tool for SendMessageTool {
    fn name(&self) -> &str {
        "send_message"
    }

    fn description(&self) -> &str {
        "Sends a final reply to the user and ends the current turn."
    }

    fn side_effecting(&self) -> bool {
        false
    }

    fn args_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {"message": {"type": "string"}},
            "required": ["message"]
        })
    }

    async fn call(&self, _ctx: &ToolContext, _args: serde_json::Value) -> EngineResult<ToolResult> {
        Ok(ToolResult::success("message sent"))
    }
}

pub struct RequestConfirmationTool;

#[async_trait]
impl Tool for RequestConfirmationTool {
    fn name(&self) -> &str {
        "request_confirmation"
    }

    fn description(&self) -> &str {
        "Pauses the turn and asks the user to approve or deny a risky action."
    }

    fn side_effecting(&self) -> bool {
        false
    }

    fn args_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "kind": {"type": "string"},
                "details": {"type": "object"}
            },
            "required": ["kind"]
        })
    }

    async fn call(&self, _ctx: &ToolContext, _args: serde_json::Value) -> EngineResult<ToolResult> {
        Ok(ToolResult::success("confirmation requested"))
    }
}
