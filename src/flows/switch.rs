//! Switch-action: re-target a ticket to a different (panel, action) pair
//!
//! If the new action collects a form, the creator must complete it
//! (bounded) before anything changes. On success the channel is renamed
//! and re-parented, its permission set fully reset to the new action's
//! baseline, claim and escalation state cleared, a fresh sequence index
//! drawn under the new counter, and a new header pinned in place of the
//! old one.

use tracing::{error, instrument, warn};

use super::intake::build_header;
use super::{TicketEngine, opener_from_channel_name};
use crate::config::ActionView;
use crate::core::Ticket;
use crate::error::{Result, TicketDeskError};
use crate::flows::forms::FormResponse;
use crate::logging::LogEvent;
use crate::platform::{
    Actor, ChannelEdit, ChannelId, Field, OverwriteTarget, PermissionOverwrite,
};

/// Inbound switch-action request; invoked from inside the ticket channel
#[derive(Debug, Clone)]
pub struct SwitchActionRequest {
    pub channel_id: ChannelId,
    /// Position of the target panel in the deployed configuration
    pub target_panel_index: usize,
    /// Position of the target action within that panel
    pub target_action_index: usize,
    pub actor: Actor,
}

/// A completed action switch
#[derive(Debug, Clone)]
pub struct SwitchOutcome {
    pub ticket: Ticket,
    pub old_action_name: String,
    pub new_action_name: String,
    /// Set when the fresh header message could not be posted; the switch
    /// itself committed
    pub header_error: Option<String>,
}

impl TicketEngine {
    /// Re-target the ticket in `channel` to a different action.
    ///
    /// The ticket keeps its server binding; servers are not re-collected on
    /// a switch.
    #[instrument(skip(self, request), fields(channel = %request.channel_id, actor = %request.actor.id))]
    pub async fn switch_action(&self, request: SwitchActionRequest) -> Result<SwitchOutcome> {
        let mut ticket = self.ticket_by_channel(&request.channel_id)?;
        Self::ensure_open(&ticket)?;

        let old_action_name = {
            let old_view = self.view_for(&ticket)?;
            Self::ensure_not_restricted_creator(&old_view, &ticket, &request.actor)?;
            old_view.button_name()
        };

        let (new_panel, new_action) = self
            .panels()
            .resolve_entry(request.target_panel_index, request.target_action_index)?;
        if new_panel.id == ticket.panel_id && new_action.id == ticket.action_id {
            return Err(TicketDeskError::state(
                "this ticket is already using the specified action - this command has been cancelled",
            ));
        }

        // The collected form (empty when the new action has none)
        let mut profile = self.users().find_or_create_profile(&ticket.user_id)?;
        let form = if new_action.form_entries.is_empty() {
            FormResponse::default()
        } else {
            let form_id = format!("@ticket-switch@{}", ticket.id);
            self.collect_form(
                &ticket.channel_id,
                &ticket.user_id,
                &form_id,
                new_action,
                profile.steam_id.as_deref(),
            )
            .await?
        };
        if let Some((idx, _)) = new_action.steam_id_entry() {
            if let Some(value) = form.value(idx) {
                if profile.set_steam_id(value) {
                    self.users().save_profile(&profile)?;
                }
            }
        }

        let server = ticket.server_identifier.clone();
        let new_view = ActionView::new(new_panel, new_action, server.as_deref());
        let category = new_view
            .category()
            .ok_or_else(|| {
                TicketDeskError::configuration(
                    "no category is configured for the target ticket action",
                )
            })?
            .clone();
        if !self
            .platform()
            .category_exists(&ticket.guild_id, &category)
            .await?
        {
            return Err(TicketDeskError::configuration(format!(
                "specified category (`{category}`) to move the ticket channel doesn't exist"
            )));
        }

        let new_index = self
            .tickets()
            .last_index_for(&ticket.guild_id, &new_panel.id, &new_action.id)?
            .unwrap_or(0)
            + 1;
        let new_action_name = new_view.button_name();

        // Recover the opener's name part from the current channel name
        let current_name = self.platform().channel_name(&ticket.channel_id).await?;
        let opener_name = opener_from_channel_name(&current_name);
        let join = new_view.index_join_str();

        // Full permission reset to the new action's baseline; anyone added
        // through claims or escalation loses access
        let mut overwrites = vec![
            PermissionOverwrite::deny(OverwriteTarget::Everyone),
            PermissionOverwrite::grant(OverwriteTarget::Member(ticket.user_id.clone())),
        ];
        overwrites.extend(
            new_view
                .role_permissions()
                .iter()
                .map(|r| PermissionOverwrite::grant(OverwriteTarget::Role(r.clone()))),
        );

        self.platform()
            .edit_channel(
                &ticket.channel_id,
                ChannelEdit {
                    name: Some(format!("{new_index:04}{join}{opener_name}")),
                    topic: Some(format!(
                        "[{opener_name}] - {new_action_name} ({})",
                        ticket.user_id
                    )),
                    parent: Some(category),
                    overwrites: Some(overwrites),
                    reason: Some("Ticket action changed".to_string()),
                },
            )
            .await?;

        // A pending deferred close does not survive a re-target
        if self
            .cancel_auto_expire(&ticket.guild_id, &ticket.channel_id)
            .await?
        {
            self.send_note(
                &ticket.channel_id,
                "Automatic ticket expiry was cancelled because the panel action was changed",
            )
            .await;
        }

        ticket.panel_id = new_panel.id.clone();
        ticket.action_id = new_action.id.clone();
        ticket.index = new_index;
        ticket.claimed = false;
        ticket.claimed_by = None;
        ticket.escalation_level = 0;
        self.tickets().save(&mut ticket)?;

        // Old header stays in chat for traceability, just unpinned
        if let Err(err) = self.platform().unpin_own_messages(&ticket.channel_id).await {
            warn!(%err, channel = %ticket.channel_id, "could not unpin previous header messages");
        }

        let view = self.view_for(&ticket)?;
        let header = build_header(&ticket, &view, &opener_name, &form);
        let header_error = match self.platform().send(&ticket.channel_id, header).await {
            Ok(message_id) => {
                if let Err(err) = self
                    .platform()
                    .pin_message(&ticket.channel_id, &message_id)
                    .await
                {
                    warn!(%err, channel = %ticket.channel_id, "could not pin ticket header message");
                }
                None
            }
            Err(err) => {
                error!(%err, ticket = %ticket.id, "ticket header message failed after switch");
                Some(err.to_string())
            }
        };

        self.log()
            .emit(
                LogEvent::new(
                    &ticket,
                    view,
                    &request.actor.id,
                    "Changed Ticket Action",
                    "🔄",
                )
                .standalone()
                .with_fields(vec![
                    Field::inline("Old Action", old_action_name.clone()),
                    Field::inline("New Action", new_action_name.clone()),
                ]),
            )
            .await;

        Ok(SwitchOutcome {
            ticket,
            old_action_name,
            new_action_name,
            header_error,
        })
    }
}
