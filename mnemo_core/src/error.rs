//! The error-kind taxonomy shared by every layer above the Store.
//!
//! Managers, providers, and tool handlers all return `Result<T, EngineError>`;
//! the Step Loop and Streaming Dispatcher pattern-match on the variant to decide
//! whether to retry, surface a structured event, or collapse a failure into a
//! tool-return message. See §7 of the design for the propagation policy.

use serde::Serialize;

/// Language-neutral error kind, reported to API consumers by `kind()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    MissingCredential,
    Transient,
    QuotaExceeded,
    Cancelled,
    Fatal,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("missing credential for provider {provider}: {missing:?}")]
    MissingCredential {
        provider: String,
        missing: Vec<String>,
    },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("quota exceeded for provider {provider}: {hint}")]
    QuotaExceeded { provider: String, hint: String },

    #[error("cancelled")]
    Cancelled,

    #[error("fatal invariant violation: {0}")]
    Fatal(String),
}

impl EngineError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::MissingCredential { .. } => ErrorKind::MissingCredential,
            Self::Transient(_) => ErrorKind::Transient,
            Self::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Fatal(_) => ErrorKind::Fatal,
        }
    }

    /// Whether a caller is permitted to retry this error itself (distinct from the
    /// transport-level retry policy in `mnemo_providers::retry`, which only ever
    /// retries `Transient`). Exposed so the Sandbox can decide whether to collapse
    /// a tool failure into a tool-return message or let it propagate.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
