use std::collections::HashMap;

use crate::config::{ActionId, PanelId};
use crate::core::{GuildSettings, Ticket, TicketId, UserProfile};
use crate::error::Result;
use crate::platform::{ChannelId, GuildId, UserId};

/// Repository trait for ticket storage operations
///
/// This trait defines the interface for storing and retrieving tickets,
/// allowing for different storage implementations. Saves are guarded by an
/// optimistic-concurrency version check: a save against a record that was
/// modified since it was read fails with `VersionConflict` and writes
/// nothing.
pub trait TicketRepository: Send + Sync {
    /// Persists a brand-new ticket; fails if the id already exists
    fn insert(&self, ticket: &Ticket) -> Result<()>;

    /// Saves an existing ticket, checking and incrementing its version
    fn save(&self, ticket: &mut Ticket) -> Result<()>;

    /// Loads a ticket by ID
    fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>>;

    /// Loads the ticket backing a channel
    fn find_by_channel(&self, channel: &ChannelId) -> Result<Option<Ticket>>;

    /// Highest sequence index drawn so far for (guild, panel, action)
    fn last_index_for(
        &self,
        guild: &GuildId,
        panel: &PanelId,
        action: &ActionId,
    ) -> Result<Option<u32>>;

    /// Loads every ticket of a guild, open and closed
    fn load_all_for_guild(&self, guild: &GuildId) -> Result<Vec<Ticket>>;

    /// Number of tickets each staff member participated in, per guild
    fn staff_activity_counts(&self, guild: &GuildId) -> Result<HashMap<UserId, u64>>;
}

/// Repository trait for per-actor user profiles
pub trait UserRepository: Send + Sync {
    /// Resolves the profile for an actor, creating it on first contact
    fn find_or_create_profile(&self, actor: &UserId) -> Result<UserProfile>;

    /// Saves a profile
    fn save_profile(&self, profile: &UserProfile) -> Result<()>;
}

/// Repository trait for guild-scoped settings
pub trait SettingsRepository: Send + Sync {
    /// Resolves the settings document for a guild, creating it when absent
    fn find_or_create_settings(&self, guild: &GuildId) -> Result<GuildSettings>;

    /// Saves a settings document
    fn save_settings(&self, settings: &GuildSettings) -> Result<()>;

    /// Loads the settings of every known guild (reconciliation sweep input)
    fn all_guilds(&self) -> Result<Vec<GuildSettings>>;
}

/// Combined storage trait
pub trait Storage: TicketRepository + UserRepository + SettingsRepository {}

/// Implementation of Storage for types that implement all three traits
impl<T> Storage for T where T: TicketRepository + UserRepository + SettingsRepository {}
