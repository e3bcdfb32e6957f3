//! File-backed storage
//!
//! One YAML document per entity under a root directory:
//!
//! ```text
//! <root>/tickets/<ticket-id>.yml
//! <root>/users/<actor-id>.yml
//! <root>/settings/<guild-id>.yml
//! ```
//!
//! Writes go through a temp file followed by a rename so a crash never
//! leaves a half-written document behind.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::repository::{SettingsRepository, TicketRepository, UserRepository};
use crate::config::{ActionId, PanelId};
use crate::core::{GuildSettings, Ticket, TicketId, UserProfile};
use crate::error::{Result, TicketDeskError};
use crate::platform::{ChannelId, GuildId, UserId};

const TICKETS_DIR: &str = "tickets";
const USERS_DIR: &str = "users";
const SETTINGS_DIR: &str = "settings";

/// Storage over per-document YAML files
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Create a file storage rooted at `root`, creating directories as needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let storage = Self { root: root.into() };
        for dir in [TICKETS_DIR, USERS_DIR, SETTINGS_DIR] {
            fs::create_dir_all(storage.root.join(dir))?;
        }
        Ok(storage)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ticket_path(&self, id: &TicketId) -> PathBuf {
        self.root.join(TICKETS_DIR).join(format!("{id}.yml"))
    }

    fn user_path(&self, actor: &UserId) -> PathBuf {
        self.root.join(USERS_DIR).join(format!("{actor}.yml"))
    }

    fn settings_path(&self, guild: &GuildId) -> PathBuf {
        self.root.join(SETTINGS_DIR).join(format!("{guild}.yml"))
    }

    fn read_doc<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(serde_yaml::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_doc<T: Serialize>(path: &Path, doc: &T) -> Result<()> {
        let content = serde_yaml::to_string(doc)?;
        let tmp = path.with_extension("yml.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn each_ticket<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(Ticket),
    {
        for entry in fs::read_dir(self.root.join(TICKETS_DIR))? {
            let path = entry?.path();
            if path.extension().is_none_or(|e| e != "yml") {
                continue;
            }
            if let Some(ticket) = Self::read_doc::<Ticket>(&path)? {
                visit(ticket);
            }
        }
        Ok(())
    }
}

impl TicketRepository for FileStorage {
    fn insert(&self, ticket: &Ticket) -> Result<()> {
        let path = self.ticket_path(&ticket.id);
        if path.exists() {
            return Err(TicketDeskError::state(format!(
                "ticket `{}` already exists",
                ticket.id
            )));
        }
        Self::write_doc(&path, ticket)
    }

    fn save(&self, ticket: &mut Ticket) -> Result<()> {
        let path = self.ticket_path(&ticket.id);
        let stored: Ticket =
            Self::read_doc(&path)?.ok_or_else(|| TicketDeskError::not_found("ticket"))?;
        if stored.version != ticket.version {
            return Err(TicketDeskError::VersionConflict {
                id: ticket.id.to_string(),
            });
        }
        ticket.version += 1;
        ticket.updated_at = Utc::now();
        Self::write_doc(&path, ticket)
    }

    fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>> {
        Self::read_doc(&self.ticket_path(id))
    }

    fn find_by_channel(&self, channel: &ChannelId) -> Result<Option<Ticket>> {
        let mut found = None;
        self.each_ticket(|t| {
            if found.is_none() && &t.channel_id == channel {
                found = Some(t);
            }
        })?;
        Ok(found)
    }

    fn last_index_for(
        &self,
        guild: &GuildId,
        panel: &PanelId,
        action: &ActionId,
    ) -> Result<Option<u32>> {
        let mut last = None;
        self.each_ticket(|t| {
            if &t.guild_id == guild && &t.panel_id == panel && &t.action_id == action {
                last = last.max(Some(t.index));
            }
        })?;
        Ok(last)
    }

    fn load_all_for_guild(&self, guild: &GuildId) -> Result<Vec<Ticket>> {
        let mut tickets = Vec::new();
        self.each_ticket(|t| {
            if &t.guild_id == guild {
                tickets.push(t);
            }
        })?;
        Ok(tickets)
    }

    fn staff_activity_counts(&self, guild: &GuildId) -> Result<HashMap<UserId, u64>> {
        let mut counts: HashMap<UserId, u64> = HashMap::new();
        self.each_ticket(|t| {
            if &t.guild_id == guild {
                for staff in &t.active_staff_ids {
                    *counts.entry(staff.clone()).or_default() += 1;
                }
            }
        })?;
        Ok(counts)
    }
}

impl UserRepository for FileStorage {
    fn find_or_create_profile(&self, actor: &UserId) -> Result<UserProfile> {
        let path = self.user_path(actor);
        if let Some(profile) = Self::read_doc(&path)? {
            return Ok(profile);
        }
        let profile = UserProfile::new(actor.clone());
        Self::write_doc(&path, &profile)?;
        Ok(profile)
    }

    fn save_profile(&self, profile: &UserProfile) -> Result<()> {
        Self::write_doc(&self.user_path(&profile.actor_id), profile)
    }
}

impl SettingsRepository for FileStorage {
    fn find_or_create_settings(&self, guild: &GuildId) -> Result<GuildSettings> {
        let path = self.settings_path(guild);
        if let Some(settings) = Self::read_doc(&path)? {
            return Ok(settings);
        }
        let settings = GuildSettings::new(guild.clone());
        Self::write_doc(&path, &settings)?;
        Ok(settings)
    }

    fn save_settings(&self, settings: &GuildSettings) -> Result<()> {
        Self::write_doc(&self.settings_path(&settings.guild_id), settings)
    }

    fn all_guilds(&self) -> Result<Vec<GuildSettings>> {
        let mut all = Vec::new();
        for entry in fs::read_dir(self.root.join(SETTINGS_DIR))? {
            let path = entry?.path();
            if path.extension().is_none_or(|e| e != "yml") {
                continue;
            }
            if let Some(settings) = Self::read_doc::<GuildSettings>(&path)? {
                all.push(settings);
            }
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AutoExpireEntry, TicketBuilder};
    use tempfile::TempDir;

    fn storage() -> (TempDir, FileStorage) {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("ticket-desk")).unwrap();
        (dir, storage)
    }

    #[test]
    fn test_ticket_roundtrip() {
        let (_dir, storage) = storage();
        let mut ticket = TicketBuilder::new()
            .guild_id("g1")
            .user_id("u1")
            .channel_id("c1")
            .index(2)
            .build();
        storage.insert(&ticket).unwrap();

        let loaded = storage.find_by_id(&ticket.id).unwrap().unwrap();
        assert_eq!(loaded, ticket);

        ticket.claimed = true;
        ticket.claimed_by = Some(UserId::from("staff"));
        storage.save(&mut ticket).unwrap();

        let loaded = storage
            .find_by_channel(&ChannelId::from("c1"))
            .unwrap()
            .unwrap();
        assert_eq!(loaded.version, 1);
        assert!(loaded.claimed);
    }

    #[test]
    fn test_stale_save_rejected() {
        let (_dir, storage) = storage();
        let ticket = TicketBuilder::new()
            .guild_id("g1")
            .user_id("u1")
            .channel_id("c1")
            .build();
        storage.insert(&ticket).unwrap();

        let mut fresh = storage.find_by_id(&ticket.id).unwrap().unwrap();
        let mut stale = storage.find_by_id(&ticket.id).unwrap().unwrap();
        storage.save(&mut fresh).unwrap();

        assert!(matches!(
            storage.save(&mut stale),
            Err(TicketDeskError::VersionConflict { .. })
        ));
    }

    #[test]
    fn test_settings_roundtrip_with_expiry_entries() {
        let (_dir, storage) = storage();
        let guild = GuildId::from("g1");
        let mut settings = storage.find_or_create_settings(&guild).unwrap();
        settings.auto_expire_tickets.push(AutoExpireEntry {
            ticket_id: TicketId::new(),
            channel_id: ChannelId::from("c1"),
            expire_at: Utc::now(),
            requested_by: UserId::from("staff"),
        });
        storage.save_settings(&settings).unwrap();

        let all = storage.all_guilds().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].auto_expire_tickets.len(), 1);
    }
}
