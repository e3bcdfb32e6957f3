//! Intake workflow: a (panel, action, server?) selection becomes a private
//! channel plus a persisted ticket
//!
//! Deployed entry points address configuration positionally; everything
//! stored on the resulting ticket uses stable identifiers. Channel creation
//! failures abort before any ticket is persisted; a header-message failure
//! after the ticket exists is surfaced in the outcome instead of being
//! swallowed.

use tracing::{error, instrument, warn};

use super::{TicketEngine, sanitize_name};
use crate::config::ActionView;
use crate::core::{Ticket, TicketBuilder, TicketId};
use crate::error::{Result, TicketDeskError};
use crate::flows::forms::FormResponse;
use crate::logging::LogEvent;
use crate::platform::{
    Actor, ChannelId, Control, ControlId, ControlStyle, CreateChannel, ChannelKind, Field,
    GuildId, OutboundMessage, OverwriteTarget, PermissionOverwrite, Section,
};

/// Inbound ticket-creation request from the interaction layer
#[derive(Debug, Clone)]
pub struct OpenTicketRequest {
    pub guild_id: GuildId,
    /// Position of the panel in the deployed configuration
    pub panel_index: usize,
    /// Position of the action within the panel
    pub action_index: usize,
    /// Bound server, when the entry point already carries one
    pub server_identifier: Option<String>,
    pub actor: Actor,
    /// Channel hosting the entry point; prompts go here
    pub invoked_in: ChannelId,
}

/// Result of an intake invocation
#[derive(Debug, Clone)]
pub enum IntakeOutcome {
    /// Ticket and channel exist
    Created(CreatedTicket),
    /// A server-selection control was presented; the workflow re-enters
    /// once the choice arrives, carried in the control identifier
    AwaitingServerSelection,
}

/// A successfully created ticket
#[derive(Debug, Clone)]
pub struct CreatedTicket {
    pub ticket: Ticket,
    pub channel_id: ChannelId,
    /// Set when the ticket and channel exist but the pinned header message
    /// could not be posted; visible to the operator, not fatal
    pub header_error: Option<String>,
}

impl TicketEngine {
    /// Create a ticket from a deployed entry point.
    ///
    /// Collects the action's form (bounded) before touching any state,
    /// draws the next sequence index, creates the private channel, persists
    /// the ticket, posts and pins the header, and emits a "Created" event.
    #[instrument(skip(self, request), fields(guild = %request.guild_id, panel = request.panel_index, action = request.action_index))]
    pub async fn open_ticket(&self, request: OpenTicketRequest) -> Result<IntakeOutcome> {
        let (panel, action) = self
            .panels()
            .resolve_entry(request.panel_index, request.action_index)?;

        // Server binding: explicit choice, fixed panel binding, or a
        // selection hop
        let server_identifier = match (&request.server_identifier, &panel.server) {
            (Some(chosen), _) => Some(chosen.clone()),
            (None, Some(fixed)) => Some(fixed.clone()),
            (None, None) if panel.select_server => {
                self.prompt_server_selection(&request, panel).await?;
                return Ok(IntakeOutcome::AwaitingServerSelection);
            }
            (None, None) => None,
        };

        let view = ActionView::new(panel, action, server_identifier.as_deref());
        let category = view
            .category()
            .ok_or_else(|| {
                TicketDeskError::configuration(
                    "no category is configured for creating ticket channels",
                )
            })?
            .clone();
        if !self
            .platform()
            .category_exists(&request.guild_id, &category)
            .await?
        {
            return Err(TicketDeskError::configuration(format!(
                "specified category (`{category}`) to create ticket channel doesn't exist"
            )));
        }

        let mut profile = self.users().find_or_create_profile(&request.actor.id)?;

        // Pre-fetch a missing steam id from the backend integration so the
        // form can be prefilled
        if action.steam_id_entry().is_some() && profile.steam_id.is_none() && panel.pre_fetch_steam64
        {
            if let Some(source) = self.steam_ids() {
                match source.lookup(&request.actor.id).await {
                    Ok(Some(steam_id)) => {
                        if profile.set_steam_id(steam_id) {
                            self.users().save_profile(&profile)?;
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(%err, actor = %request.actor.id, "steam id pre-fetch failed");
                    }
                }
            }
        }

        // The ticket id doubles as the form-flow id, the way control ids
        // carry it everywhere else
        let ticket_id = TicketId::new();
        let form_id = format!("@ticket-intake@{ticket_id}");
        let form = self
            .collect_form(
                &request.invoked_in,
                &request.actor.id,
                &form_id,
                action,
                profile.steam_id.as_deref(),
            )
            .await?;

        // Capture a submitted steam id back onto the profile
        if let Some((idx, _)) = action.steam_id_entry() {
            if let Some(value) = form.value(idx) {
                if profile.set_steam_id(value) {
                    self.users().save_profile(&profile)?;
                }
            }
        }

        let index = self
            .tickets()
            .last_index_for(&request.guild_id, &panel.id, &action.id)?
            .unwrap_or(0)
            + 1;

        let opener_name = sanitize_name(&request.actor.display_name);
        let join = view.index_join_str();
        let channel_name = format!("{index:04}{join}{opener_name}");
        let topic = format!(
            "[{opener_name}] - {} ({})",
            view.button_name(),
            request.actor.id
        );

        let mut overwrites = vec![
            PermissionOverwrite::deny(OverwriteTarget::Everyone),
            PermissionOverwrite::grant(OverwriteTarget::Member(request.actor.id.clone())),
        ];
        overwrites.extend(
            view.role_permissions()
                .iter()
                .map(|r| PermissionOverwrite::grant(OverwriteTarget::Role(r.clone()))),
        );

        // Channel creation failures abort here, before any ticket exists
        let channel_id = self
            .platform()
            .create_channel(
                &request.guild_id,
                CreateChannel {
                    name: channel_name,
                    kind: ChannelKind::Text,
                    parent: Some(category),
                    topic: Some(topic),
                    overwrites,
                    reason: format!("Ticket opened by {}", request.actor.display_name),
                },
            )
            .await?;

        let ticket = TicketBuilder::new()
            .id(ticket_id)
            .guild_id(request.guild_id.clone())
            .panel_id(panel.id.clone())
            .action_id(action.id.clone())
            .user_id(request.actor.id.clone())
            .channel_id(channel_id.clone())
            .index(index);
        let ticket = match &server_identifier {
            Some(server) => ticket.server_identifier(server.clone()),
            None => ticket,
        }
        .build();
        self.tickets().insert(&ticket)?;

        let header = build_header(&ticket, &view, &opener_name, &form);
        let header_error = match self.platform().send(&channel_id, header).await {
            Ok(message_id) => {
                if let Err(err) = self.platform().pin_message(&channel_id, &message_id).await {
                    warn!(%err, channel = %channel_id, "could not pin ticket header message");
                }
                None
            }
            Err(err) => {
                // The ticket and channel exist; report, don't roll back
                error!(%err, ticket = %ticket.id, channel = %channel_id, "ticket header message failed");
                Some(err.to_string())
            }
        };

        self.log()
            .emit(LogEvent::new(
                &ticket,
                view,
                &request.actor.id,
                "Created",
                "📥",
            ))
            .await;

        Ok(IntakeOutcome::Created(CreatedTicket {
            ticket,
            channel_id,
            header_error,
        }))
    }

    async fn prompt_server_selection(
        &self,
        request: &OpenTicketRequest,
        panel: &crate::config::Panel,
    ) -> Result<()> {
        let mut options: Vec<String> = panel.server_mapping.keys().cloned().collect();
        options.sort();
        if options.is_empty() {
            return Err(TicketDeskError::configuration(
                "panel requires a server selection but no servers are mapped",
            ));
        }
        let prompt = OutboundMessage::text(format!(
            "<@{}>, please select the server you're playing on to continue",
            request.actor.id
        ))
        .with_controls(vec![Control::select(
            ControlId::server_select(request.panel_index, request.action_index),
            "Select a server",
            options,
        )]);
        self.platform().send(&request.invoked_in, prompt).await?;
        Ok(())
    }
}

/// Build the pinned ticket header: creation summary, submitted form values,
/// and the full set of lifecycle controls
pub(crate) fn build_header(
    ticket: &Ticket,
    view: &ActionView<'_>,
    opener_name: &str,
    form: &FormResponse,
) -> OutboundMessage {
    let mention = format!("<@{}>", ticket.user_id);
    let mut content = view
        .creation_message()
        .map(|template| template.replace("{@member}", &mention))
        .unwrap_or_default();
    if view.ping_on_creation() {
        let roles = view
            .role_permissions()
            .iter()
            .map(|r| format!("<@&{r}>"))
            .collect::<Vec<_>>()
            .join(" ");
        if !roles.is_empty() {
            if !content.is_empty() {
                content.push_str("\n\n");
            }
            content.push_str(&roles);
        }
    }

    let mut summary_fields = Vec::new();
    if let Some(server) = &ticket.server_identifier {
        summary_fields.push(Field::new("Server", server.clone()));
    }
    summary_fields.push(Field::new(
        "User",
        format!("{opener_name} - {}", ticket.user_id),
    ));
    summary_fields.push(Field::new("Panel", view.panel.title()));
    summary_fields.push(Field::new("Action", view.button_name()));
    let summary = Section {
        title: None,
        body: Some(format!("📥 A new ticket was created by {mention}")),
        fields: summary_fields,
    };

    let mut form_fields = Vec::new();
    if let Some(server) = &ticket.server_identifier {
        form_fields.push(Field::new("Server", server.clone()));
    }
    for (idx, entry) in view.action.form_entries.iter().enumerate() {
        let label = if entry.required {
            format!("{} *", entry.label)
        } else {
            entry.label.clone()
        };
        let value = form.value(idx).unwrap_or("-").to_string();
        form_fields.push(Field::new(label, value));
    }
    let form_section = Section {
        title: Some("User provided information/context:".to_string()),
        body: None,
        fields: form_fields,
    };

    let mut controls = vec![
        Control::button(
            ControlId::claim(&ticket.id),
            "Claim Ticket",
            Some("📍"),
            ControlStyle::Secondary,
        ),
        Control::button(
            ControlId::unclaim(&ticket.id),
            "Unclaim Ticket",
            Some("📌"),
            ControlStyle::Secondary,
        ),
    ];
    if !view.panel.escalation_role_ids.is_empty() {
        controls.push(Control::button(
            ControlId::escalate(&ticket.id),
            "Escalate",
            Some("⬆️"),
            ControlStyle::Primary,
        ));
        controls.push(Control::button(
            ControlId::deescalate(&ticket.id),
            "De-escalate",
            Some("⬇️"),
            ControlStyle::Primary,
        ));
    }
    if view.panel.has_dedicated_support_vcs {
        controls.push(Control::button(
            ControlId::support_vc(&ticket.id),
            "Support VC",
            Some("🔊"),
            ControlStyle::Success,
        ));
        controls.push(Control::button(
            ControlId::support_vc_end(&ticket.id),
            "End VC",
            Some("🔇"),
            ControlStyle::Success,
        ));
    }
    controls.push(Control::button(
        ControlId::close(&ticket.id),
        "Close Ticket",
        Some("🔒"),
        ControlStyle::Danger,
    ));
    controls.push(Control::button(
        ControlId::request_close(&ticket.id),
        "Request Close",
        Some("❔"),
        ControlStyle::Danger,
    ));
    controls.push(Control::button(
        ControlId::auto_expire(&ticket.id),
        "Auto Close (48H)",
        Some("⏲️"),
        ControlStyle::Danger,
    ));

    OutboundMessage {
        content,
        sections: vec![summary, form_section],
        controls,
        attachments: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PanelSet;
    use crate::core::TicketBuilder;

    const YAML: &str = r#"
panels:
  - identifier: "Support"
    category_open_ticket_id: "cat"
    role_permissions: ["staff-role"]
    ping_on_ticket_creation: true
    ticket_creation_message: "Welcome {@member}!"
    escalation_role_ids: ["esc-1"]
    has_dedicated_support_vcs: true
    actions:
      - button_text: "General"
        form_entries:
          - label: "Issue"
            required: true
"#;

    #[test]
    fn test_header_contains_controls_and_form_values() {
        let set = PanelSet::from_yaml(YAML).unwrap();
        let (panel, action) = set.resolve_entry(0, 0).unwrap();
        let view = ActionView::new(panel, action, None);
        let ticket = TicketBuilder::new()
            .guild_id("g")
            .panel_id(panel.id.clone())
            .action_id(action.id.clone())
            .user_id("opener")
            .channel_id("chan")
            .build();
        let form = FormResponse {
            values: vec!["cannot connect".into()],
        };

        let header = build_header(&ticket, &view, "opener", &form);

        assert!(header.content.contains("Welcome <@opener>!"));
        assert!(header.content.contains("<@&staff-role>"));

        let labels: Vec<&str> = header.controls.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "Claim Ticket",
                "Unclaim Ticket",
                "Escalate",
                "De-escalate",
                "Support VC",
                "End VC",
                "Close Ticket",
                "Request Close",
                "Auto Close (48H)",
            ]
        );

        let form_section = &header.sections[1];
        assert_eq!(form_section.fields[0].name, "Issue *");
        assert_eq!(form_section.fields[0].value, "cannot connect");
    }

    #[test]
    fn test_header_skips_optional_controls() {
        let yaml = r#"
panels:
  - identifier: "Bare"
    category_open_ticket_id: "cat"
    actions:
      - button_text: "Plain"
"#;
        let set = PanelSet::from_yaml(yaml).unwrap();
        let (panel, action) = set.resolve_entry(0, 0).unwrap();
        let view = ActionView::new(panel, action, None);
        let ticket = TicketBuilder::new()
            .guild_id("g")
            .user_id("opener")
            .channel_id("chan")
            .build();

        let header = build_header(&ticket, &view, "opener", &FormResponse::default());
        let labels: Vec<&str> = header.controls.iter().map(|c| c.label.as_str()).collect();
        assert!(!labels.contains(&"Escalate"));
        assert!(!labels.contains(&"Support VC"));
        assert!(labels.contains(&"Close Ticket"));
    }
}
