//! `summarise` (§4.7): the meta-agent's fallback when a batch of ingestion
//! text won't fit the context budget — an extractive trim, not an LLM call,
//! so it never itself risks another context-overflow round trip.

use async_trait::async_trait;
use serde_json::json;

use mnemo_core::error::{EngineError, EngineResult};
use mnemo_core::tools::{Tool, ToolContext, ToolResult};

const DEFAULT_TARGET_CHARS: usize = 2000;

pub struct SummariseTool;

#[async_trait]
impl Tool for SummariseTool {
    fn name(&self) -> &str {
        "summarise"
    }

    fn description(&self) -> &str {
        "Extractively trims text to a target character budget, keeping leading sentences."
    }

    fn side_effecting(&self) -> bool {
        false
    }

    fn args_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "text": {"type": "string"},
                "target_chars": {"type": "integer"}
            },
            "required": ["text"]
        })
    }

    async fn call(&self, _ctx: &ToolContext, args: serde_json::Value) -> EngineResult<ToolResult> {
        let text = args
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| EngineError::InvalidInput("missing required argument: text".to_string()))?;
        let target = args
            .get("target_chars")
            .and_then(serde_json::Value::as_u64)
            .map_or(DEFAULT_TARGET_CHARS, |n| n as usize);
        Ok(ToolResult::success(extractive_trim(text, target)))
    }
}

/// Keeps whole sentences (split on `.`, `!`, `?`) from the front of `text`
/// until adding the next one would exceed `target_chars`.
fn extractive_trim(text: &str, target_chars: usize) -> String {
    if text.len() <= target_chars {
        return text.to_string();
    }
    let mut kept = String::new();
    for sentence in text.split_inclusive(['.', '!', '?']) {
        if kept.len() + sentence.len() > target_chars {
            break;
        }
        kept.push_str(sentence);
    }
    if kept.is_empty() {
        kept.push_str(&text[..target_chars.min(text.len())]);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_unchanged() {
        assert_eq!(extractive_trim("short.", 2000), "short.");
    }

    #[test]
    fn long_text_keeps_whole_sentences() {
        let text = "First sentence. Second sentence. Third sentence that is much longer than the budget allows for this test.";
        let trimmed = extractive_trim(text, 30);
        assert!(trimmed.len() <= 40);
        assert!(trimmed.ends_with('.'));
    }
}
