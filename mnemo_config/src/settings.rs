//! Per-user `UserSettings` read-through cache (§4.10, C10). Grounded on the
//! reference config crate's lazily-populated, `serde(default = ...)`-backed
//! struct, generalized from one process-wide struct to a per-user `moka` TTL
//! map since settings are per-user in this engine.

use std::time::Duration;

use moka::sync::Cache;

use mnemo_core::domain::UserSettings;
use mnemo_core::error::EngineResult;
use mnemo_store::SettingsManager;

use crate::schema::DefaultsConfig;

const CACHE_TTL: Duration = Duration::from_secs(5 * 60);
const CACHE_CAPACITY: u64 = 10_000;

/// Front for `SettingsManager`: a cache miss or expiry reads through to the
/// Store; `update` always writes through first, then evicts (never updates)
/// the cache entry, so a racing reader either sees the old value from a
/// still-valid slot or repopulates from the now-committed row.
pub struct SettingsCache {
    store: SettingsManager,
    cache: Cache<String, UserSettings>,
    defaults: DefaultsConfig,
}

impl SettingsCache {
    #[must_use]
    pub fn new(store: SettingsManager, defaults: DefaultsConfig) -> Self {
        Self {
            store,
            cache: Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(CACHE_TTL)
                .build(),
            defaults,
        }
    }

    pub async fn get(&self, user_id: &str) -> EngineResult<UserSettings> {
        if let Some(hit) = self.cache.get(user_id) {
            return Ok(hit);
        }
        let defaults = UserSettings::default_for(user_id, &self.defaults.chat_model, &self.defaults.persona);
        let settings = self.store.get_or_create(user_id, &defaults).await?;
        self.cache.insert(user_id.to_string(), settings.clone());
        Ok(settings)
    }

    /// Applies `patch` to the current settings and writes the result through,
    /// then evicts the cache entry.
    pub async fn update(
        &self,
        user_id: &str,
        patch: impl FnOnce(UserSettings) -> UserSettings,
    ) -> EngineResult<UserSettings> {
        let current = self.get(user_id).await?;
        let updated = patch(current);
        self.store.put(&updated).await?;
        self.cache.invalidate(user_id);
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_chat_and_persona() {
        let defaults = DefaultsConfig {
            chat_model: "deepseek-chat".to_string(),
            persona: "persona".to_string(),
            timezone: "UTC".to_string(),
        };
        let settings = UserSettings::default_for("alice", &defaults.chat_model, &defaults.persona);
        assert_eq!(settings.chat_model, "deepseek-chat");
        assert_eq!(settings.persona, "persona");
    }
}
