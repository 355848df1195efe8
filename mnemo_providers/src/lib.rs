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
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

mod anthropic;
pub mod credentials;
pub mod facade;
mod google;
mod openai_compat;
mod retry;

pub use anthropic::AnthropicProvider;
pub use credentials::resolve as resolve_credential;
pub use facade::{build_embedder, build_llm_provider};
pub use google::GoogleProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use retry::{is_transient, retry_with_backoff, DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES};
