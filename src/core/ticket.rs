//! The persisted ticket record, one per created channel

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::config::{ActionId, PanelId};
use crate::platform::{ChannelId, GuildId, UserId};

/// Unique ticket identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(Uuid);

impl TicketId {
    /// Generate a new random ticket ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a ticket ID from its string form
    pub fn parse_str(input: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(input).map(Self)
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Persisted record of one support conversation.
///
/// Created by the intake workflow, mutated exclusively by lifecycle
/// transitions, and terminated by the close transition. Closed tickets are
/// never physically deleted - the record persists as an audit trail after
/// its channel is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub guild_id: GuildId,
    /// Stable reference into the loaded panel configuration
    pub panel_id: PanelId,
    /// Stable reference into the owning panel's actions
    pub action_id: ActionId,
    /// The creator
    pub user_id: UserId,
    pub channel_id: ChannelId,
    #[serde(default)]
    pub server_identifier: Option<String>,
    /// Sequence number scoped to (guild, panel, action), starting at 1
    pub index: u32,
    #[serde(default)]
    pub claimed: bool,
    #[serde(default)]
    pub claimed_by: Option<UserId>,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub closed_by: Option<UserId>,
    #[serde(default)]
    pub reason: Option<String>,
    /// Position in the panel's effective escalation chain, 0 = not escalated
    #[serde(default)]
    pub escalation_level: usize,
    /// Staff members who participated in the ticket channel
    #[serde(default)]
    pub active_staff_ids: Vec<UserId>,
    /// Companion support voice channel, when one is active
    #[serde(default)]
    pub voice_channel_id: Option<ChannelId>,
    /// Optimistic-concurrency version, checked and incremented on save
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Whether the ticket still accepts lifecycle transitions
    #[must_use]
    pub const fn is_open(&self) -> bool {
        !self.closed
    }

    /// Sequence index rendered the way channel names carry it
    #[must_use]
    pub fn padded_index(&self) -> String {
        format!("{:04}", self.index)
    }

    /// `claimed == false` implies `claimed_by == None`
    #[must_use]
    pub fn claim_state_consistent(&self) -> bool {
        self.claimed || self.claimed_by.is_none()
    }

    /// Record a staff participant once; returns true when newly added
    pub fn record_staff(&mut self, staff: &UserId) -> bool {
        if self.active_staff_ids.contains(staff) {
            return false;
        }
        self.active_staff_ids.push(staff.clone());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TicketBuilder;

    #[test]
    fn test_ticket_id_roundtrip() {
        let id = TicketId::new();
        let parsed = TicketId::parse_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_padded_index() {
        let ticket = TicketBuilder::new()
            .guild_id("g")
            .user_id("u")
            .channel_id("c")
            .index(7)
            .build();
        assert_eq!(ticket.padded_index(), "0007");
    }

    #[test]
    fn test_claim_state_consistency() {
        let mut ticket = TicketBuilder::new()
            .guild_id("g")
            .user_id("u")
            .channel_id("c")
            .build();
        assert!(ticket.claim_state_consistent());

        ticket.claimed_by = Some(UserId::from("staff"));
        assert!(!ticket.claim_state_consistent());

        ticket.claimed = true;
        assert!(ticket.claim_state_consistent());
    }

    #[test]
    fn test_record_staff_is_idempotent() {
        let mut ticket = TicketBuilder::new()
            .guild_id("g")
            .user_id("u")
            .channel_id("c")
            .build();
        let staff = UserId::from("staff");
        assert!(ticket.record_staff(&staff));
        assert!(!ticket.record_staff(&staff));
        assert_eq!(ticket.active_staff_ids.len(), 1);
    }
}
