//! Close and request-close transitions
//!
//! Closing prompts the requester for a reason, a reason-less confirmation,
//! or a cancellation - whichever arrives first within the window wins.
//! Request-close adds a second party: the ticket's creator must accept or
//! decline before the close proceeds. The terminal sequence is shared:
//! transcript, persist, DM, log, channel deletion.

use tracing::{info, instrument, warn};

use super::dialog::{ConfirmationDialog, DialogOutcome};
use super::TicketEngine;
use crate::core::TicketId;
use crate::error::Result;
use crate::logging::LogEvent;
use crate::platform::{
    Actor, Control, ControlId, ControlStyle, Field, OutboundMessage, Section, UserId,
};

/// Result of a direct close invocation
#[derive(Debug, Clone)]
pub enum CloseOutcome {
    Closed(CloseReport),
    /// The requester cancelled the prompt
    Cancelled,
    /// The prompt window elapsed
    TimedOut,
}

/// Result of a two-party close request
#[derive(Debug, Clone)]
pub enum RequestCloseOutcome {
    Closed(CloseReport),
    /// The requesting staff member cancelled their own prompt
    Cancelled,
    /// The ticket creator declined the request
    Declined,
    /// A prompt window elapsed without a response
    Expired,
}

/// What the terminal close sequence actually did
#[derive(Debug, Clone)]
pub struct CloseReport {
    pub ticket_id: TicketId,
    pub closed_by: UserId,
    pub reason: Option<String>,
    /// A transcript artifact was generated and attached
    pub transcript_attached: bool,
    /// Channel deletion is the canonical terminal signal; false means the
    /// record is closed but the channel lingers (insufficient permission)
    pub channel_deleted: bool,
}

impl TicketEngine {
    /// Close a ticket after prompting the requester for a reason.
    ///
    /// The prompt accepts a free-text reason message, a "close without
    /// reason" control, or a cancellation; exactly one wins within the
    /// confirmation window.
    #[instrument(skip(self, actor), fields(ticket = %ticket_id, actor = %actor.id))]
    pub async fn close(&self, ticket_id: &TicketId, actor: &Actor) -> Result<CloseOutcome> {
        let ticket = self.ticket_by_id(ticket_id)?;
        Self::ensure_open(&ticket)?;
        // Abort on configuration drift before prompting anyone
        self.view_for(&ticket)?;

        let confirm = ControlId::close_without_reason(&ticket.id);
        let decline = ControlId::close_cancel(&ticket.id);
        self.platform()
            .send(
                &ticket.channel_id,
                OutboundMessage::text(format!(
                    "<@{}>, are you sure you want to close this ticket?\n\nRespond with a reason for closing this ticket, or use the controls below\n\nYou have 5 minutes before this action cancels",
                    actor.id
                ))
                .with_controls(vec![
                    Control::button(confirm.clone(), "Close without reason", None, ControlStyle::Danger),
                    Control::button(decline.clone(), "Cancel, don't close", None, ControlStyle::Success),
                ]),
            )
            .await?;

        let dialog = ConfirmationDialog::new(
            ticket.channel_id.clone(),
            actor.id.clone(),
            confirm,
            decline,
        )
        .accept_text_reason();

        match dialog.run(self.events()).await {
            DialogOutcome::Confirmed { reason } => {
                let report = self
                    .finalize_close(&ticket.id, &actor.id, reason, "Closed", "🔒")
                    .await?;
                Ok(CloseOutcome::Closed(report))
            }
            DialogOutcome::Declined => Ok(CloseOutcome::Cancelled),
            DialogOutcome::Expired => Ok(CloseOutcome::TimedOut),
        }
    }

    /// Propose closing a ticket; the creator must accept before it proceeds.
    ///
    /// A proposal nobody answers silently expires.
    #[instrument(skip(self, actor), fields(ticket = %ticket_id, actor = %actor.id))]
    pub async fn request_close(
        &self,
        ticket_id: &TicketId,
        actor: &Actor,
    ) -> Result<RequestCloseOutcome> {
        let ticket = self.ticket_by_id(ticket_id)?;
        Self::ensure_open(&ticket)?;
        self.view_for(&ticket)?;

        // Stage one: the proposing staff member settles on a reason
        let confirm = ControlId::request_close_without_reason(&ticket.id);
        let decline = ControlId::request_close_cancel(&ticket.id);
        self.platform()
            .send(
                &ticket.channel_id,
                OutboundMessage::text(format!(
                    "<@{}>, are you sure you want to request <@{}> to close this ticket?\n\nRespond with a reason for closing this ticket, or use the controls below\n\nYou have 5 minutes before this action cancels",
                    actor.id, ticket.user_id
                ))
                .with_controls(vec![
                    Control::button(confirm.clone(), "Close without reason", None, ControlStyle::Danger),
                    Control::button(decline.clone(), "Cancel, don't close", None, ControlStyle::Success),
                ]),
            )
            .await?;

        let staff_dialog = ConfirmationDialog::new(
            ticket.channel_id.clone(),
            actor.id.clone(),
            confirm,
            decline,
        )
        .accept_text_reason();

        let reason = match staff_dialog.run(self.events()).await {
            DialogOutcome::Confirmed { reason } => reason,
            DialogOutcome::Declined => return Ok(RequestCloseOutcome::Cancelled),
            DialogOutcome::Expired => return Ok(RequestCloseOutcome::Expired),
        };

        // Stage two: the ticket creator accepts or declines
        let accept = ControlId::request_close_accept(&ticket.id);
        let refuse = ControlId::request_close_decline(&ticket.id);
        let reason_part = reason
            .as_deref()
            .map_or_else(String::new, |r| format!(" with reason **`{r}`**"));
        self.platform()
            .send(
                &ticket.channel_id,
                OutboundMessage::text(format!(
                    "<@{}>, <@{}> is requesting to close your ticket{reason_part} - you have 5 minutes before this action cancels",
                    ticket.user_id, actor.id
                ))
                .with_controls(vec![
                    Control::button(accept.clone(), "Accept", None, ControlStyle::Success),
                    Control::button(refuse.clone(), "Decline", None, ControlStyle::Danger),
                ]),
            )
            .await?;

        let creator_dialog = ConfirmationDialog::new(
            ticket.channel_id.clone(),
            ticket.user_id.clone(),
            accept,
            refuse,
        );

        match creator_dialog.run(self.events()).await {
            DialogOutcome::Confirmed { .. } => {
                self.send_note(
                    &ticket.channel_id,
                    format!("<@{}>, the close request was accepted", actor.id),
                )
                .await;
                let report = self
                    .finalize_close(&ticket.id, &actor.id, reason, "Request-Closed", "❓")
                    .await?;
                Ok(RequestCloseOutcome::Closed(report))
            }
            DialogOutcome::Declined => {
                self.send_note(
                    &ticket.channel_id,
                    format!(
                        "<@{}>, the request to close this ticket was declined",
                        actor.id
                    ),
                )
                .await;
                Ok(RequestCloseOutcome::Declined)
            }
            DialogOutcome::Expired => Ok(RequestCloseOutcome::Expired),
        }
    }

    /// Terminal close sequence, shared by close, request-close, auto-expiry
    /// firing, and the boot reconciliation sweep.
    ///
    /// Re-reads the ticket so a close that raced another path is rejected
    /// before a second transcript or channel deletion is attempted.
    pub(crate) async fn finalize_close(
        &self,
        ticket_id: &TicketId,
        closed_by: &UserId,
        reason: Option<String>,
        verb: &str,
        emoji: &str,
    ) -> Result<CloseReport> {
        let mut ticket = self.ticket_by_id(ticket_id)?;
        Self::ensure_open(&ticket)?;

        self.send_note(
            &ticket.channel_id,
            "Please be patient while the ticket is being closed - all messages are being retrieved and a transcript is being generated",
        )
        .await;

        // Transcript export is best-effort; a closed ticket without a
        // transcript beats an undeletable channel
        let transcript = match self.transcripts().export(&ticket.channel_id).await {
            Ok(file) => Some(file),
            Err(err) => {
                warn!(%err, ticket = %ticket.id, "transcript export failed");
                None
            }
        };

        ticket.closed = true;
        ticket.closed_by = Some(closed_by.clone());
        ticket.reason = reason.clone();
        self.tickets().save(&mut ticket)?;

        // Any pending auto-expiry dies with the ticket
        self.cancel_auto_expire(&ticket.guild_id, &ticket.channel_id)
            .await?;

        let view = self.view_for(&ticket)?;

        // Best-effort DM with the transcript
        let reason_part = reason
            .as_deref()
            .map_or_else(String::new, |r| format!("\n**Reason:**\n```\n{r}\n```"));
        let mut dm = OutboundMessage::text(format!(
            "Your ticket has been closed. Please refer to the transcript if needed{reason_part}"
        ))
        .with_sections(vec![Section {
            title: None,
            body: None,
            fields: vec![
                Field::new("Panel", view.panel.title()),
                Field::new("Action", view.button_name()),
            ],
        }]);
        if let Some(file) = &transcript {
            dm.attachments.push(file.clone());
        }
        if let Err(err) = self.platform().send_dm(&ticket.user_id, dm).await {
            info!(%err, user = %ticket.user_id, "could not DM the ticket creator");
        }

        self.log()
            .emit(
                LogEvent::new(&ticket, view, closed_by, verb, emoji)
                    .with_fields(vec![Field::new(
                        "Reason",
                        reason.clone().unwrap_or_else(|| "No reason was provided".to_string()),
                    )])
                    .with_files(transcript.iter().cloned().collect()),
            )
            .await;

        // Channel deletion is the canonical terminal signal; failure leaves
        // a lingering channel but the record stays closed
        let channel_deleted = match self
            .platform()
            .delete_channel(&ticket.channel_id, "Ticket closed")
            .await
        {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, ticket = %ticket.id, channel = %ticket.channel_id, "could not delete ticket channel");
                false
            }
        };

        Ok(CloseReport {
            ticket_id: ticket.id,
            closed_by: closed_by.clone(),
            reason,
            transcript_attached: transcript.is_some(),
            channel_deleted,
        })
    }
}
