//! Shared process state: the pieces every HTTP handler and the MCP service
//! need a handle to. Constructed once in `main` and cloned cheaply (everything
//! inside is an `Arc`) into axum's `State` extractor and into the MCP service.

use std::sync::Arc;

use mnemo_config::{Config, SettingsCache};
use mnemo_core::step::SuspendedStepTable;
use mnemo_core::tools::OtidCache;
use mnemo_store::StorageEngine;

/// Fallback identity used when a caller (MCP connection, or an HTTP request
/// with no `user_id`) doesn't name a user explicitly.
pub const DEFAULT_USER_ID: &str = "default_user";

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<StorageEngine>,
    pub tools: Arc<mnemo_core::tools::ToolRegistry>,
    pub settings: Arc<SettingsCache>,
    pub suspended: Arc<SuspendedStepTable>,
    pub otids: Arc<OtidCache>,
    pub config: Arc<Config>,
}

impl AppState {
    #[must_use]
    pub fn new(
        engine: Arc<StorageEngine>,
        tools: Arc<mnemo_core::tools::ToolRegistry>,
        settings: Arc<SettingsCache>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            engine,
            tools,
            settings,
            suspended: Arc::new(SuspendedStepTable::new()),
            otids: Arc::new(OtidCache::default()),
            config,
        }
    }
}
