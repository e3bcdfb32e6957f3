//! Support voice-channel toggle
//!
//! Creates or removes a companion voice channel for a ticket, mirroring
//! the ticket channel's current permission overwrites under the same
//! parent category. The relation is stored on the ticket; matching by
//! normalized channel name is kept only as a fallback for tickets that
//! predate the stored relation.

use tracing::instrument;

use super::{TicketEngine, VOICE_MARKER, strip_markers};
use crate::core::TicketId;
use crate::error::{Result, TicketDeskError};
use crate::logging::LogEvent;
use crate::platform::{Actor, ChannelId, ChannelKind, CreateChannel, Field};

/// Voice-channel name derived from a ticket channel name: markers and
/// dashes stripped, speaker prefix added
fn voice_name_for(channel_name: &str) -> String {
    format!("🔊 {}", strip_markers(channel_name).replace('-', " "))
}

impl TicketEngine {
    /// Create the companion support voice channel for a ticket
    #[instrument(skip(self, actor), fields(ticket = %ticket_id, actor = %actor.id))]
    pub async fn start_support_voice(
        &self,
        ticket_id: &TicketId,
        actor: &Actor,
    ) -> Result<ChannelId> {
        let mut ticket = self.ticket_by_id(ticket_id)?;
        Self::ensure_open(&ticket)?;
        {
            let view = self.view_for(&ticket)?;
            Self::ensure_not_restricted_creator(&view, &ticket, actor)?;
            if !view.panel.has_dedicated_support_vcs {
                return Err(TicketDeskError::state(
                    "dedicated support voice channels are not enabled for this panel",
                ));
            }
        }
        if ticket.voice_channel_id.is_some() {
            return Err(TicketDeskError::state(
                "a support voice channel is already active for this ticket",
            ));
        }

        let parent = self
            .platform()
            .channel_parent(&ticket.channel_id)
            .await?
            .ok_or_else(|| {
                TicketDeskError::state(
                    "this ticket is missing a parent category - this command has been cancelled",
                )
            })?;
        let channel_name = self.platform().channel_name(&ticket.channel_id).await?;
        let overwrites = self
            .platform()
            .channel_overwrites(&ticket.channel_id)
            .await?;

        let voice_id = self
            .platform()
            .create_channel(
                &ticket.guild_id,
                CreateChannel {
                    name: voice_name_for(&channel_name),
                    kind: ChannelKind::Voice,
                    parent: Some(parent),
                    topic: None,
                    overwrites,
                    reason: format!(
                        "Dedicated support channel for ticket #{} was requested",
                        ticket.index
                    ),
                },
            )
            .await?;

        ticket.voice_channel_id = Some(voice_id.clone());
        self.tickets().save(&mut ticket)?;

        self.mark_channel(&ticket.channel_id, VOICE_MARKER).await;

        let view = self.view_for(&ticket)?;
        self.log()
            .emit(
                LogEvent::new(&ticket, view, &actor.id, "Created Support VC", "🔊")
                    .standalone()
                    .with_fields(vec![Field::inline("VC", format!("<#{voice_id}>"))]),
            )
            .await;
        Ok(voice_id)
    }

    /// Delete the companion support voice channel for a ticket
    #[instrument(skip(self, actor), fields(ticket = %ticket_id, actor = %actor.id))]
    pub async fn end_support_voice(&self, ticket_id: &TicketId, actor: &Actor) -> Result<()> {
        let mut ticket = self.ticket_by_id(ticket_id)?;
        Self::ensure_open(&ticket)?;
        {
            let view = self.view_for(&ticket)?;
            Self::ensure_not_restricted_creator(&view, &ticket, actor)?;
        }

        let voice_id = match ticket.voice_channel_id.clone() {
            Some(id) => id,
            // Legacy fallback: recover the relation by normalized name
            None => {
                let parent = self
                    .platform()
                    .channel_parent(&ticket.channel_id)
                    .await?
                    .ok_or_else(|| {
                        TicketDeskError::state(
                            "this ticket is missing a parent category - this command has been cancelled",
                        )
                    })?;
                let channel_name = self.platform().channel_name(&ticket.channel_id).await?;
                self.platform()
                    .find_channel(
                        &ticket.guild_id,
                        &parent,
                        &voice_name_for(&channel_name),
                        ChannelKind::Voice,
                    )
                    .await?
                    .ok_or_else(|| {
                        TicketDeskError::not_found(format!(
                            "support voice channel for ticket #{}",
                            ticket.index
                        ))
                    })?
            }
        };

        self.platform()
            .delete_channel(
                &voice_id,
                &format!("Support VC session ended for ticket #{}", ticket.index),
            )
            .await?;

        ticket.voice_channel_id = None;
        self.tickets().save(&mut ticket)?;

        self.unmark_channel(&ticket.channel_id, VOICE_MARKER).await;

        let view = self.view_for(&ticket)?;
        self.log()
            .emit(
                LogEvent::new(&ticket, view, &actor.id, "Ended Support VC", "🔇").standalone(),
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_name_strips_markers_and_dashes() {
        assert_eq!(voice_name_for("📍0004-mira-saki"), "🔊 0004 mira saki");
        assert_eq!(voice_name_for("plain"), "🔊 plain");
    }
}
