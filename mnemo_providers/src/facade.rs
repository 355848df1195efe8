//! Resolves a provider family name to a concrete `LlmProvider`/`Embedder`,
//! wiring in the env-resolved credential (§4.3, §6).

use std::sync::Arc;

use mnemo_core::error::{EngineError, EngineResult};
use mnemo_core::provider::{Embedder, LlmProvider};

use crate::anthropic::AnthropicProvider;
use crate::credentials;
use crate::google::GoogleProvider;
use crate::openai_compat::OpenAiCompatProvider;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";
pub const OPENAI_EMBED_MODEL: &str = "text-embedding-3-small";
pub const OPENAI_EMBED_DIMENSION: usize = 1536;

/// Builds the `LlmProvider` for `provider` (one of `openai`, `anthropic`,
/// `google`, `deepseek`), resolving its credential from the process
/// environment. Unknown provider names are `InvalidInput`, not a panic,
/// since the name ultimately comes from user-editable settings.
pub fn build_llm_provider(provider: &str) -> EngineResult<Arc<dyn LlmProvider>> {
    let api_key = credentials::resolve(provider)?;
    match provider {
        "openai" => Ok(Arc::new(OpenAiCompatProvider::new("openai", api_key, OPENAI_BASE_URL))),
        "anthropic" => Ok(Arc::new(AnthropicProvider::new(api_key))),
        "google" => Ok(Arc::new(GoogleProvider::new(api_key))),
        "deepseek" => Ok(Arc::new(OpenAiCompatProvider::new("deepseek", api_key, DEEPSEEK_BASE_URL))),
        other => Err(EngineError::InvalidInput(format!("unknown provider family: {other}"))),
    }
}

/// Builds the `Embedder` for `provider`. Anthropic exposes no embeddings
/// endpoint; requesting one is `InvalidInput` rather than a silent fallback,
/// since silently switching a user's embedder would violate the per-user
/// `D_model` invariant (§9).
pub fn build_embedder(provider: &str) -> EngineResult<Arc<dyn Embedder>> {
    let api_key = credentials::resolve(provider)?;
    match provider {
        "openai" => Ok(Arc::new(
            OpenAiCompatProvider::new("openai", api_key, OPENAI_BASE_URL)
                .with_embeddings(OPENAI_EMBED_MODEL, OPENAI_EMBED_DIMENSION),
        )),
        "google" => Ok(Arc::new(GoogleProvider::new(api_key))),
        other => Err(EngineError::InvalidInput(format!(
            "provider {other} does not expose an embedding endpoint"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_invalid_input() {
        // SAFETY: test-only env mutation.
        unsafe {
            std::env::set_var("OPENAI_API_KEY", "test-key");
        }
        let err = build_llm_provider("not-a-provider").unwrap_err();
        assert_eq!(err.kind(), mnemo_core::error::ErrorKind::InvalidInput);
    }

    #[test]
    fn anthropic_has_no_embedder() {
        // SAFETY: test-only env mutation.
        unsafe {
            std::env::set_var("ANTHROPIC_API_KEY", "test-key");
        }
        let err = build_embedder("anthropic").unwrap_err();
        assert_eq!(err.kind(), mnemo_core::error::ErrorKind::InvalidInput);
    }
}
