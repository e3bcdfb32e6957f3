//! Claim, unclaim, escalate, and de-escalate transitions
//!
//! Every transition re-resolves the ticket's panel and action from its
//! stored identifiers before touching anything; configuration drift aborts
//! with a re-deploy instruction. State guards reject invalid transitions
//! without mutating the record.

use tracing::instrument;

use super::{CLAIM_MARKER, ESCALATE_MARKER, TicketEngine};
use crate::core::{Ticket, TicketId};
use crate::error::{Result, TicketDeskError};
use crate::logging::LogEvent;
use crate::platform::{
    Actor, ChannelId, Field, GuildId, OverwriteTarget, PermissionOverwrite, UserId,
};

impl TicketEngine {
    /// Claim an unclaimed ticket for the acting staff member
    #[instrument(skip(self, actor), fields(ticket = %ticket_id, actor = %actor.id))]
    pub async fn claim(&self, ticket_id: &TicketId, actor: &Actor) -> Result<Ticket> {
        let mut ticket = self.ticket_by_id(ticket_id)?;
        Self::ensure_open(&ticket)?;
        {
            let view = self.view_for(&ticket)?;
            Self::ensure_not_restricted_creator(&view, &ticket, actor)?;
        }
        if ticket.claimed {
            let holder = ticket
                .claimed_by
                .as_ref()
                .map_or_else(|| "another member".to_string(), |u| format!("<@{u}>"));
            return Err(TicketDeskError::state(format!(
                "this ticket was already claimed by {holder} - it has to be unclaimed before it can be claimed again"
            )));
        }

        ticket.claimed = true;
        ticket.claimed_by = Some(actor.id.clone());
        self.tickets().save(&mut ticket)?;

        self.send_note(
            &ticket.channel_id,
            format!(
                "<@{}>, <@{}> has claimed your ticket",
                ticket.user_id, actor.id
            ),
        )
        .await;
        self.mark_channel(&ticket.channel_id, CLAIM_MARKER).await;

        let view = self.view_for(&ticket)?;
        self.log()
            .emit(LogEvent::new(&ticket, view, &actor.id, "Claimed", "📍"))
            .await;
        Ok(ticket)
    }

    /// Release a claimed ticket back to the unclaimed pool
    #[instrument(skip(self, actor), fields(ticket = %ticket_id, actor = %actor.id))]
    pub async fn unclaim(&self, ticket_id: &TicketId, actor: &Actor) -> Result<Ticket> {
        let mut ticket = self.ticket_by_id(ticket_id)?;
        Self::ensure_open(&ticket)?;
        {
            let view = self.view_for(&ticket)?;
            Self::ensure_not_restricted_creator(&view, &ticket, actor)?;
        }
        if !ticket.claimed {
            return Err(TicketDeskError::state(
                "this ticket hasn't been claimed yet - this action has been cancelled",
            ));
        }

        ticket.claimed = false;
        ticket.claimed_by = None;
        self.tickets().save(&mut ticket)?;

        self.unmark_channel(&ticket.channel_id, CLAIM_MARKER).await;

        let view = self.view_for(&ticket)?;
        self.log()
            .emit(LogEvent::new(&ticket, view, &actor.id, "Unclaimed", "📌"))
            .await;
        Ok(ticket)
    }

    /// Grant the next escalation role visibility and raise the level.
    ///
    /// Level 0 to 1 is reserved for the claimer; beyond that the actor must
    /// hold the role at the current level. Rejected at the chain ceiling.
    #[instrument(skip(self, actor), fields(ticket = %ticket_id, actor = %actor.id))]
    pub async fn escalate(&self, ticket_id: &TicketId, actor: &Actor) -> Result<usize> {
        let mut ticket = self.ticket_by_id(ticket_id)?;
        Self::ensure_open(&ticket)?;
        let chain = {
            let view = self.view_for(&ticket)?;
            Self::ensure_not_restricted_creator(&view, &ticket, actor)?;
            view.escalation_chain()
        };
        if !ticket.claimed {
            return Err(TicketDeskError::state(
                "this ticket hasn't been claimed yet - this action has been cancelled",
            ));
        }
        if chain.is_empty() {
            return Err(TicketDeskError::state(
                "this ticket can't be escalated - the configured escalation roles are already included in the action's role permissions",
            ));
        }

        let level = ticket.escalation_level;
        if level >= chain.len() {
            return Err(TicketDeskError::state(
                "this ticket can't be further escalated, it's at the highest level - this action has been cancelled",
            ));
        }
        if level == 0 {
            if Some(&actor.id) != ticket.claimed_by.as_ref() {
                let claimer = ticket
                    .claimed_by
                    .as_ref()
                    .map_or_else(String::new, |u| format!(" (<@{u}>)"));
                return Err(TicketDeskError::state(format!(
                    "only the ticket claimer{claimer} can initialize the escalation process - this action has been cancelled"
                )));
            }
        } else {
            let current = &chain[level - 1];
            if !actor.holds(current) {
                return Err(TicketDeskError::state(format!(
                    "only members of the current escalation level (<@&{current}>) can elevate it further - this action has been cancelled"
                )));
            }
        }

        // Permission first: a failed grant must leave the level untouched
        let next = chain[level].clone();
        self.platform()
            .grant_overwrite(
                &ticket.channel_id,
                PermissionOverwrite::grant(OverwriteTarget::Role(next.clone())),
            )
            .await?;

        ticket.escalation_level = level + 1;
        self.tickets().save(&mut ticket)?;

        self.send_note(
            &ticket.channel_id,
            format!(
                "<@&{next}>, this ticket has been escalated by <@{}>, please review the ticket information",
                actor.id
            ),
        )
        .await;
        self.mark_channel(&ticket.channel_id, ESCALATE_MARKER).await;

        let view = self.view_for(&ticket)?;
        self.log()
            .emit(
                LogEvent::new(&ticket, view, &actor.id, "Escalated", "⬆️").with_fields(vec![
                    Field::inline("Escalated To", format!("<@&{next}>")),
                    Field::inline(
                        "Escalation Level",
                        format!("{} / {}", ticket.escalation_level, chain.len()),
                    ),
                ]),
            )
            .await;
        Ok(ticket.escalation_level)
    }

    /// Revoke the current escalation role and lower the level.
    ///
    /// Requires the actor to hold the role at the current level; rejected
    /// at level 0.
    #[instrument(skip(self, actor), fields(ticket = %ticket_id, actor = %actor.id))]
    pub async fn deescalate(&self, ticket_id: &TicketId, actor: &Actor) -> Result<usize> {
        let mut ticket = self.ticket_by_id(ticket_id)?;
        Self::ensure_open(&ticket)?;
        let chain = {
            let view = self.view_for(&ticket)?;
            Self::ensure_not_restricted_creator(&view, &ticket, actor)?;
            view.escalation_chain()
        };
        if !ticket.claimed {
            return Err(TicketDeskError::state(
                "this ticket hasn't been claimed yet - this action has been cancelled",
            ));
        }

        let level = ticket.escalation_level;
        if level == 0 {
            return Err(TicketDeskError::state(
                "this ticket can't be further de-escalated, it's at the lowest level - this action has been cancelled",
            ));
        }
        let current = chain
            .get(level - 1)
            .cloned()
            .ok_or_else(|| {
                TicketDeskError::configuration(
                    "stored escalation level exceeds the configured escalation chain",
                )
            })?;
        if !actor.holds(&current) {
            return Err(TicketDeskError::state(format!(
                "only members of the current escalation level (<@&{current}>) can de-escalate it - this action has been cancelled"
            )));
        }

        self.platform()
            .revoke_overwrite(&ticket.channel_id, &OverwriteTarget::Role(current.clone()))
            .await?;

        ticket.escalation_level = level - 1;
        self.tickets().save(&mut ticket)?;

        if ticket.escalation_level == 0 {
            self.unmark_channel(&ticket.channel_id, ESCALATE_MARKER)
                .await;
        }

        let view = self.view_for(&ticket)?;
        self.log()
            .emit(
                LogEvent::new(&ticket, view, &actor.id, "De-escalated", "⬇️").with_fields(vec![
                    Field::inline("Escalation Role Removed", format!("<@&{current}>")),
                    Field::inline(
                        "Escalation Level",
                        format!("{} / {}", ticket.escalation_level, chain.len()),
                    ),
                ]),
            )
            .await;
        Ok(ticket.escalation_level)
    }

    /// Record a staff member's participation in a ticket channel.
    ///
    /// Invoked by the listener layer for each message in a ticket channel;
    /// returns true when the participant was newly recorded.
    pub async fn record_staff_activity(&self, channel: &ChannelId, actor: &Actor) -> Result<bool> {
        let Some(mut ticket) = self.tickets().find_by_channel(channel)? else {
            return Ok(false);
        };
        if ticket.closed || ticket.user_id == actor.id {
            return Ok(false);
        }
        let is_staff = {
            let view = self.view_for(&ticket)?;
            actor.holds_any(view.role_permissions())
                || actor.holds_any(&view.panel.escalation_role_ids)
        };
        if !is_staff || !ticket.record_staff(&actor.id) {
            return Ok(false);
        }
        self.tickets().save(&mut ticket)?;
        Ok(true)
    }

    /// React to a message from the ticket creator: a pending auto-expiry is
    /// cancelled, since the ticket is clearly still alive
    pub async fn note_user_message(&self, channel: &ChannelId, author: &UserId) -> Result<()> {
        let Some(ticket) = self.tickets().find_by_channel(channel)? else {
            return Ok(());
        };
        if ticket.closed || &ticket.user_id != author {
            return Ok(());
        }
        if self.cancel_auto_expire(&ticket.guild_id, channel).await? {
            self.send_note(
                channel,
                "Automatic ticket expiry was cancelled because the ticket creator sent a message",
            )
            .await;
        }
        Ok(())
    }

    /// Tickets each staff member participated in, most active first
    pub fn staff_activity_leaderboard(&self, guild: &GuildId) -> Result<Vec<(UserId, u64)>> {
        let counts = self.tickets().staff_activity_counts(guild)?;
        let mut leaderboard: Vec<(UserId, u64)> = counts.into_iter().collect();
        leaderboard.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(leaderboard)
    }
}
