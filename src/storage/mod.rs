//! Storage layer
//!
//! Object-safe repository traits plus two implementations: in-memory (tests,
//! embedders with their own durability) and YAML-file-per-document. The
//! [`SettingsService`] fronts settings reads with a TTL cache that is
//! invalidated on every write.

mod file;
mod memory;
pub mod repository;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use repository::{SettingsRepository, Storage, TicketRepository, UserRepository};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::cache::{SETTINGS_CACHE_TTL, TtlCache};
use crate::core::GuildSettings;
use crate::error::Result;
use crate::platform::GuildId;

/// Cached read/write access to guild settings
#[derive(Clone)]
pub struct SettingsService {
    repo: Arc<dyn SettingsRepository>,
    cache: Arc<TtlCache<GuildId, GuildSettings>>,
}

impl SettingsService {
    #[must_use]
    pub fn new(repo: Arc<dyn SettingsRepository>) -> Self {
        Self::with_ttl(repo, SETTINGS_CACHE_TTL)
    }

    #[must_use]
    pub fn with_ttl(repo: Arc<dyn SettingsRepository>, ttl: Duration) -> Self {
        Self {
            repo,
            cache: Arc::new(TtlCache::new(ttl)),
        }
    }

    /// Read-through settings fetch
    pub fn get(&self, guild: &GuildId) -> Result<GuildSettings> {
        if let Some(settings) = self.cache.get(guild) {
            return Ok(settings);
        }
        let settings = self.repo.find_or_create_settings(guild)?;
        self.cache.insert(guild.clone(), settings.clone());
        Ok(settings)
    }

    /// Load fresh, mutate, persist, invalidate the cached copy
    pub fn update<F>(&self, guild: &GuildId, mutate: F) -> Result<GuildSettings>
    where
        F: FnOnce(&mut GuildSettings),
    {
        let mut settings = self.repo.find_or_create_settings(guild)?;
        mutate(&mut settings);
        settings.updated_at = Utc::now();
        self.repo.save_settings(&settings)?;
        self.cache.invalidate(guild);
        Ok(settings)
    }

    /// Settings of every known guild, bypassing the cache
    pub fn all_guilds(&self) -> Result<Vec<GuildSettings>> {
        self.repo.all_guilds()
    }
}
