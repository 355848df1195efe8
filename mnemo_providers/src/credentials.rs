//! Env-var credential resolution (§4.3, §6). Config-file values are layered in
//! by `mnemo_config` before a provider is constructed; this module only reads
//! the process environment, which always overrides the file for credentials.

use mnemo_core::error::{EngineError, EngineResult};
use mnemo_core::provider::credential_env_var;

/// Reads the API key for `provider` from its well-known env var, or
/// `MissingCredential` naming that var so the caller can surface it verbatim
/// in a `StepEvent::MissingApiKeys` (§4.7.1, §6).
pub fn resolve(provider: &str) -> EngineResult<String> {
    let var = credential_env_var(provider);
    std::env::var(var).map_err(|_| EngineError::MissingCredential {
        provider: provider.to_string(),
        missing: vec![var.to_string()],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_var_names_itself() {
        // SAFETY: test-only env mutation, no concurrent access to this var within the suite.
        unsafe {
            std::env::remove_var("GOOGLE_AI_API_KEY");
        }
        let err = resolve("google").unwrap_err();
        match err {
            EngineError::MissingCredential { provider, missing } => {
                assert_eq!(provider, "google");
                assert_eq!(missing, vec!["GOOGLE_AI_API_KEY".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
