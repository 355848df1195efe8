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
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

mod schema;
mod settings;

pub use schema::{Config, DefaultsConfig, EmbedderConfig, ServerConfig, StoreConfig};
pub use settings::SettingsCache;
