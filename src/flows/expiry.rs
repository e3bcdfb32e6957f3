//! Auto-expiry: scheduled, cancellable deferred closes
//!
//! The due time is persisted on the guild settings document; the firing
//! timer is process-local. A boot-time reconciliation sweep compares stored
//! due times against the wall clock, force-closes overdue tickets, drops
//! entries whose ticket already closed by another path, and re-arms timers
//! for entries still in the future.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use super::{EXPIRE_MARKER, TicketEngine};
use crate::core::{AutoExpireEntry, TicketId};
use crate::error::{Result, TicketDeskError};
use crate::platform::{Actor, ChannelId, GuildId};

/// Delay between the request and the deferred close
pub const AUTO_EXPIRE_DELAY: Duration = Duration::from_secs(48 * 60 * 60);

const EXPIRE_REASON: &str = "Ticket automatically expired after 48 hours of inactivity";
const BACKLOG_REASON: &str = "Ticket automatically expired after 48 hours of inactivity (might be late as this action was in the boot-process backlog)";

/// What the boot reconciliation sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Overdue tickets force-closed
    pub force_closed: usize,
    /// Future entries whose timers were re-armed
    pub rearmed: usize,
    /// Stale entries dropped (ticket gone or already closed)
    pub dropped: usize,
}

impl TicketEngine {
    /// Schedule a deferred close for a ticket.
    ///
    /// Rejected when one is already pending for the channel. The entry is
    /// persisted first; the in-process timer only exists as an optimization
    /// over the reconciliation sweep.
    #[instrument(skip(self, actor), fields(ticket = %ticket_id, actor = %actor.id))]
    pub async fn schedule_auto_expire(
        &self,
        ticket_id: &TicketId,
        actor: &Actor,
    ) -> Result<DateTime<Utc>> {
        let ticket = self.ticket_by_id(ticket_id)?;
        Self::ensure_open(&ticket)?;
        self.view_for(&ticket)?;

        let settings = self.settings().get(&ticket.guild_id)?;
        if settings.auto_expire_for(&ticket.channel_id).is_some() {
            return Err(TicketDeskError::state(
                "auto-expiry is already active for this ticket - this command has been cancelled",
            ));
        }

        let expire_at = Utc::now()
            + chrono::Duration::from_std(AUTO_EXPIRE_DELAY).unwrap_or(chrono::Duration::hours(48));
        let entry = AutoExpireEntry {
            ticket_id: ticket.id.clone(),
            channel_id: ticket.channel_id.clone(),
            expire_at,
            requested_by: actor.id.clone(),
        };
        self.settings().update(&ticket.guild_id, |s| {
            s.auto_expire_tickets.push(entry.clone());
        })?;

        self.arm_expiry_timer(&ticket.guild_id, &entry);
        self.mark_channel(&ticket.channel_id, EXPIRE_MARKER).await;
        self.send_note(
            &ticket.channel_id,
            format!(
                "This ticket will be automatically closed after 48 hours of inactivity (<t:{}:R>) - this is cancelled automatically if <@{}> sends a message in this channel",
                expire_at.timestamp(),
                ticket.user_id
            ),
        )
        .await;

        Ok(expire_at)
    }

    /// Cancel a pending auto-expiry; returns true when one was pending.
    ///
    /// Invoked on manual close, on switch-action, and when the creator
    /// speaks up. Safe to call when nothing is scheduled.
    pub async fn cancel_auto_expire(&self, guild: &GuildId, channel: &ChannelId) -> Result<bool> {
        let handle = {
            let mut timers = self
                .expiry_timers()
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            timers.remove(channel)
        };
        if let Some(handle) = handle {
            handle.abort();
        }

        let settings = self.settings().get(guild)?;
        if settings.auto_expire_for(channel).is_none() {
            return Ok(false);
        }
        self.settings().update(guild, |s| {
            s.remove_auto_expire(channel);
        })?;
        self.unmark_channel(channel, EXPIRE_MARKER).await;
        Ok(true)
    }

    /// Arm (or re-arm) the process-local timer for one persisted entry
    pub(crate) fn arm_expiry_timer(&self, guild: &GuildId, entry: &AutoExpireEntry) {
        let delay = (entry.expire_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let engine = self.clone();
        let guild = guild.clone();
        let channel = entry.channel_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.fire_auto_expire(&guild, &channel).await;
        });

        let mut timers = self
            .expiry_timers()
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(stale) = timers.insert(entry.channel_id.clone(), handle) {
            stale.abort();
        }
    }

    /// A timer fired: close the ticket unless another path got there first
    async fn fire_auto_expire(&self, guild: &GuildId, channel: &ChannelId) {
        {
            let mut timers = self
                .expiry_timers()
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            timers.remove(channel);
        }

        let entry = match self.settings().get(guild) {
            Ok(settings) => settings.auto_expire_for(channel).cloned(),
            Err(err) => {
                warn!(%err, %guild, "could not load settings for expiry firing");
                return;
            }
        };
        let Some(entry) = entry else {
            // Cancelled between arming and firing
            return;
        };
        if let Err(err) = self.settings().update(guild, |s| {
            s.remove_auto_expire(channel);
        }) {
            warn!(%err, %guild, "could not remove fired auto-expire entry");
        }

        match self.tickets().find_by_id(&entry.ticket_id) {
            Ok(Some(ticket)) if ticket.is_open() => {
                if let Err(err) = self
                    .finalize_close(
                        &ticket.id,
                        &entry.requested_by,
                        Some(EXPIRE_REASON.to_string()),
                        "Auto-Closed",
                        "⏲️",
                    )
                    .await
                {
                    warn!(%err, ticket = %ticket.id, "deferred close failed");
                }
            }
            Ok(_) => {
                info!(channel = %channel, "auto-expiry fired for an already-closed ticket; nothing to do");
            }
            Err(err) => {
                warn!(%err, channel = %channel, "could not load ticket for deferred close");
            }
        }
    }

    /// Boot-time reconciliation of persisted auto-expire entries against
    /// the wall clock
    #[instrument(skip(self))]
    pub async fn reconcile_auto_expiry(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let now = Utc::now();

        for settings in self.settings().all_guilds()? {
            let guild = settings.guild_id.clone();
            let mut stale: Vec<ChannelId> = Vec::new();

            for entry in &settings.auto_expire_tickets {
                let ticket = self.tickets().find_by_id(&entry.ticket_id)?;
                match ticket {
                    None => {
                        stale.push(entry.channel_id.clone());
                        report.dropped += 1;
                    }
                    Some(ticket) if ticket.closed => {
                        // Closed by another path while we were down
                        stale.push(entry.channel_id.clone());
                        report.dropped += 1;
                    }
                    Some(ticket) if entry.expire_at <= now => {
                        stale.push(entry.channel_id.clone());
                        match self
                            .finalize_close(
                                &ticket.id,
                                &entry.requested_by,
                                Some(BACKLOG_REASON.to_string()),
                                "Auto-Closed",
                                "⏲️",
                            )
                            .await
                        {
                            Ok(_) => report.force_closed += 1,
                            Err(err) => {
                                warn!(%err, ticket = %ticket.id, "backlog close failed");
                                report.dropped += 1;
                            }
                        }
                    }
                    Some(_) => {
                        self.arm_expiry_timer(&guild, entry);
                        report.rearmed += 1;
                    }
                }
            }

            if !stale.is_empty() {
                self.settings().update(&guild, |s| {
                    for channel in &stale {
                        s.remove_auto_expire(channel);
                    }
                })?;
            }
        }

        Ok(report)
    }
}
