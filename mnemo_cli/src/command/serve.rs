use std::sync::Arc;

use mnemo_config::{Config, SettingsCache};
use mnemo_providers::facade::build_embedder;
use mnemo_store::{ensure_schema, SettingsManager, StorageEngine};
use tracing::info;

/// Input parameters for the Serve command strategy.
#[derive(Debug, Clone, Default)]
pub struct ServeInput {
    /// Overrides `config.server.bind_addr` when set.
    pub bind_addr: Option<String>,
    /// Overrides `config.server.mcp_path` when set.
    pub mcp_path: Option<String>,
}

/// Strategy for running the long-lived server process.
///
/// Assembles the Store connection, the embedder, the tool registry, and the
/// settings cache into one `AppState`, then hands it to `mnemo_server::serve`.
#[derive(Debug, Clone, Copy)]
pub struct ServeStrategy;

impl super::CommandStrategy for ServeStrategy {
    type Input = ServeInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        let config = Config::load()?;
        info!("loaded configuration from {}", Config::ensure_config_dir()?.display());

        let db = sea_orm::Database::connect(&config.store.url).await?;
        ensure_schema(&db).await?;
        info!("store schema ready");

        let embedder = build_embedder(&config.embedder.provider)?;
        let engine = Arc::new(StorageEngine::new(db.clone(), embedder, config.store.d_pad));

        let tools = Arc::new(mnemo_tools::build_default_registry(engine.clone()));
        let settings = Arc::new(SettingsCache::new(SettingsManager::new(db), config.defaults.clone()));

        let state = mnemo_server::AppState::new(engine, tools, settings, Arc::new(config.clone()));

        let bind_addr = input.bind_addr.unwrap_or_else(|| config.server.bind_addr.clone());
        let mcp_path = input.mcp_path.unwrap_or_else(|| config.server.mcp_path.clone());

        mnemo_server::serve(state, &bind_addr, &mcp_path).await
    }
}
