//! Guild-scoped settings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TicketId;
use crate::platform::{ChannelId, GuildId, UserId};

/// A scheduled deferred close for one ticket channel.
///
/// Only the due time is persisted; the firing timer is process-local and
/// re-armed from this entry at boot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoExpireEntry {
    pub ticket_id: TicketId,
    pub channel_id: ChannelId,
    pub expire_at: DateTime<Utc>,
    /// Staff member who scheduled the expiry; recorded as the closer when
    /// the timer or the boot sweep fires
    pub requested_by: UserId,
}

/// Settings document for one guild
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSettings {
    pub guild_id: GuildId,
    #[serde(default)]
    pub auto_expire_tickets: Vec<AutoExpireEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GuildSettings {
    #[must_use]
    pub fn new(guild_id: GuildId) -> Self {
        let now = Utc::now();
        Self {
            guild_id,
            auto_expire_tickets: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Pending auto-expire entry for a channel, if any
    #[must_use]
    pub fn auto_expire_for(&self, channel: &ChannelId) -> Option<&AutoExpireEntry> {
        self.auto_expire_tickets
            .iter()
            .find(|e| &e.channel_id == channel)
    }

    /// Remove the entry for a channel; returns it when one was pending
    pub fn remove_auto_expire(&mut self, channel: &ChannelId) -> Option<AutoExpireEntry> {
        let pos = self
            .auto_expire_tickets
            .iter()
            .position(|e| &e.channel_id == channel)?;
        self.updated_at = Utc::now();
        Some(self.auto_expire_tickets.remove(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_expire_lookup_and_removal() {
        let mut settings = GuildSettings::new(GuildId::from("g1"));
        let channel = ChannelId::from("c1");
        settings.auto_expire_tickets.push(AutoExpireEntry {
            ticket_id: TicketId::new(),
            channel_id: channel.clone(),
            expire_at: Utc::now(),
            requested_by: UserId::from("staff"),
        });

        assert!(settings.auto_expire_for(&channel).is_some());
        assert!(settings.remove_auto_expire(&channel).is_some());
        assert!(settings.auto_expire_for(&channel).is_none());
        assert!(settings.remove_auto_expire(&channel).is_none());
    }
}
