use chrono::{DateTime, Utc};

use super::{Ticket, TicketId};
use crate::config::{ActionId, PanelId};
use crate::platform::{ChannelId, GuildId, UserId};

/// Builder for creating Ticket instances
#[derive(Default)]
pub struct TicketBuilder {
    id: Option<TicketId>,
    guild_id: Option<GuildId>,
    panel_id: Option<PanelId>,
    action_id: Option<ActionId>,
    user_id: Option<UserId>,
    channel_id: Option<ChannelId>,
    server_identifier: Option<String>,
    index: Option<u32>,
    created_at: Option<DateTime<Utc>>,
}

impl TicketBuilder {
    /// Create a new ticket builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ticket ID
    #[must_use]
    pub fn id(mut self, id: TicketId) -> Self {
        self.id = Some(id);
        self
    }

    /// Set the guild
    #[must_use]
    pub fn guild_id(mut self, guild_id: impl Into<GuildId>) -> Self {
        self.guild_id = Some(guild_id.into());
        self
    }

    /// Set the stable panel reference
    #[must_use]
    pub fn panel_id(mut self, panel_id: PanelId) -> Self {
        self.panel_id = Some(panel_id);
        self
    }

    /// Set the stable action reference
    #[must_use]
    pub fn action_id(mut self, action_id: ActionId) -> Self {
        self.action_id = Some(action_id);
        self
    }

    /// Set the creator
    #[must_use]
    pub fn user_id(mut self, user_id: impl Into<UserId>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the backing channel
    #[must_use]
    pub fn channel_id(mut self, channel_id: impl Into<ChannelId>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    /// Set the bound server identifier
    #[must_use]
    pub fn server_identifier(mut self, server_identifier: impl Into<String>) -> Self {
        self.server_identifier = Some(server_identifier.into());
        self
    }

    /// Set the sequence index
    #[must_use]
    pub const fn index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }

    /// Set `created_at` timestamp
    #[must_use]
    pub const fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Build the ticket in its initial state: unclaimed, level 0, open.
    ///
    /// Missing optional references default to empty values; callers that
    /// persist tickets are expected to have set guild/panel/action/channel.
    #[must_use]
    pub fn build(self) -> Ticket {
        let now = Utc::now();
        let created_at = self.created_at.unwrap_or(now);
        Ticket {
            id: self.id.unwrap_or_default(),
            guild_id: self.guild_id.unwrap_or_else(|| GuildId::from("")),
            panel_id: self.panel_id.unwrap_or_default(),
            action_id: self.action_id.unwrap_or_default(),
            user_id: self.user_id.unwrap_or_else(|| UserId::from("")),
            channel_id: self.channel_id.unwrap_or_else(|| ChannelId::from("")),
            server_identifier: self.server_identifier,
            index: self.index.unwrap_or(1),
            claimed: false,
            claimed_by: None,
            closed: false,
            closed_by: None,
            reason: None,
            escalation_level: 0,
            active_staff_ids: Vec::new(),
            voice_channel_id: None,
            version: 0,
            created_at,
            updated_at: created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ActionId, PanelId};

    #[test]
    fn test_builder_initial_state() {
        let ticket = TicketBuilder::new()
            .guild_id("guild-1")
            .panel_id(PanelId("support".into()))
            .action_id(ActionId("support/general".into()))
            .user_id("user-1")
            .channel_id("chan-1")
            .server_identifier("Chernarus")
            .index(3)
            .build();

        assert_eq!(ticket.index, 3);
        assert!(!ticket.claimed);
        assert!(ticket.claimed_by.is_none());
        assert!(!ticket.closed);
        assert_eq!(ticket.escalation_level, 0);
        assert_eq!(ticket.version, 0);
        assert_eq!(ticket.server_identifier.as_deref(), Some("Chernarus"));
        assert!(ticket.claim_state_consistent());
    }
}
