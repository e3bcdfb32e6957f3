//! In-memory storage
//!
//! Backs tests and embedders that bring their own durability. All maps sit
//! behind `RwLock`s; the version check in [`TicketRepository::save`] makes
//! lost updates visible even though reads and writes are otherwise
//! unsynchronized.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use super::repository::{SettingsRepository, TicketRepository, UserRepository};
use crate::config::{ActionId, PanelId};
use crate::core::{GuildSettings, Ticket, TicketId, UserProfile};
use crate::error::{Result, TicketDeskError};
use crate::platform::{ChannelId, GuildId, UserId};

/// Storage over process-local hash maps
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tickets: RwLock<HashMap<TicketId, Ticket>>,
    users: RwLock<HashMap<UserId, UserProfile>>,
    settings: RwLock<HashMap<GuildId, GuildSettings>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TicketRepository for MemoryStorage {
    fn insert(&self, ticket: &Ticket) -> Result<()> {
        let mut tickets = self.tickets.write().unwrap_or_else(|e| e.into_inner());
        if tickets.contains_key(&ticket.id) {
            return Err(TicketDeskError::state(format!(
                "ticket `{}` already exists",
                ticket.id
            )));
        }
        tickets.insert(ticket.id.clone(), ticket.clone());
        Ok(())
    }

    fn save(&self, ticket: &mut Ticket) -> Result<()> {
        let mut tickets = self.tickets.write().unwrap_or_else(|e| e.into_inner());
        let stored = tickets
            .get(&ticket.id)
            .ok_or_else(|| TicketDeskError::not_found("ticket"))?;
        if stored.version != ticket.version {
            return Err(TicketDeskError::VersionConflict {
                id: ticket.id.to_string(),
            });
        }
        ticket.version += 1;
        ticket.updated_at = Utc::now();
        tickets.insert(ticket.id.clone(), ticket.clone());
        Ok(())
    }

    fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>> {
        let tickets = self.tickets.read().unwrap_or_else(|e| e.into_inner());
        Ok(tickets.get(id).cloned())
    }

    fn find_by_channel(&self, channel: &ChannelId) -> Result<Option<Ticket>> {
        let tickets = self.tickets.read().unwrap_or_else(|e| e.into_inner());
        Ok(tickets
            .values()
            .find(|t| &t.channel_id == channel)
            .cloned())
    }

    fn last_index_for(
        &self,
        guild: &GuildId,
        panel: &PanelId,
        action: &ActionId,
    ) -> Result<Option<u32>> {
        let tickets = self.tickets.read().unwrap_or_else(|e| e.into_inner());
        Ok(tickets
            .values()
            .filter(|t| &t.guild_id == guild && &t.panel_id == panel && &t.action_id == action)
            .map(|t| t.index)
            .max())
    }

    fn load_all_for_guild(&self, guild: &GuildId) -> Result<Vec<Ticket>> {
        let tickets = self.tickets.read().unwrap_or_else(|e| e.into_inner());
        Ok(tickets
            .values()
            .filter(|t| &t.guild_id == guild)
            .cloned()
            .collect())
    }

    fn staff_activity_counts(&self, guild: &GuildId) -> Result<HashMap<UserId, u64>> {
        let tickets = self.tickets.read().unwrap_or_else(|e| e.into_inner());
        let mut counts: HashMap<UserId, u64> = HashMap::new();
        for ticket in tickets.values().filter(|t| &t.guild_id == guild) {
            for staff in &ticket.active_staff_ids {
                *counts.entry(staff.clone()).or_default() += 1;
            }
        }
        Ok(counts)
    }
}

impl UserRepository for MemoryStorage {
    fn find_or_create_profile(&self, actor: &UserId) -> Result<UserProfile> {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        Ok(users
            .entry(actor.clone())
            .or_insert_with(|| UserProfile::new(actor.clone()))
            .clone())
    }

    fn save_profile(&self, profile: &UserProfile) -> Result<()> {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        users.insert(profile.actor_id.clone(), profile.clone());
        Ok(())
    }
}

impl SettingsRepository for MemoryStorage {
    fn find_or_create_settings(&self, guild: &GuildId) -> Result<GuildSettings> {
        let mut settings = self.settings.write().unwrap_or_else(|e| e.into_inner());
        Ok(settings
            .entry(guild.clone())
            .or_insert_with(|| GuildSettings::new(guild.clone()))
            .clone())
    }

    fn save_settings(&self, settings: &GuildSettings) -> Result<()> {
        let mut map = self.settings.write().unwrap_or_else(|e| e.into_inner());
        map.insert(settings.guild_id.clone(), settings.clone());
        Ok(())
    }

    fn all_guilds(&self) -> Result<Vec<GuildSettings>> {
        let settings = self.settings.read().unwrap_or_else(|e| e.into_inner());
        Ok(settings.values().cloned().collect())
    }
}
