//! Logging sink
//!
//! Best-effort structured event emission to the resolved logging channel.
//! Fire-and-forget by design: an unresolvable channel or a failed send is
//! dropped without surfacing an error to the triggering actor. This is the
//! single place in the crate where a platform failure is intentionally
//! silent.

use std::sync::Arc;

use crate::config::ActionView;
use crate::core::Ticket;
use crate::platform::{ChannelApi, Field, OutboundMessage, Section, TranscriptFile, UserId};

/// A lifecycle transition to be logged
pub struct LogEvent<'a> {
    pub ticket: &'a Ticket,
    pub view: ActionView<'a>,
    pub actor: &'a UserId,
    /// Transition verb, e.g. "Claimed", "Auto-Closed"
    pub verb: &'a str,
    pub emoji: &'a str,
    /// When set, the verb reads as a complete phrase and no "a ticket"
    /// suffix is appended
    pub standalone: bool,
    /// Transition-specific extra fields
    pub fields: Vec<Field>,
    /// Attached artifacts (transcripts)
    pub files: Vec<TranscriptFile>,
}

impl<'a> LogEvent<'a> {
    #[must_use]
    pub fn new(
        ticket: &'a Ticket,
        view: ActionView<'a>,
        actor: &'a UserId,
        verb: &'a str,
        emoji: &'a str,
    ) -> Self {
        Self {
            ticket,
            view,
            actor,
            verb,
            emoji,
            standalone: false,
            fields: Vec::new(),
            files: Vec::new(),
        }
    }

    #[must_use]
    pub const fn standalone(mut self) -> Self {
        self.standalone = true;
        self
    }

    #[must_use]
    pub fn with_fields(mut self, fields: Vec<Field>) -> Self {
        self.fields = fields;
        self
    }

    #[must_use]
    pub fn with_files(mut self, files: Vec<TranscriptFile>) -> Self {
        self.files = files;
        self
    }
}

/// Posts structured lifecycle records to the configured logging channel
#[derive(Clone)]
pub struct TicketEventLog {
    platform: Arc<dyn ChannelApi>,
}

impl TicketEventLog {
    #[must_use]
    pub fn new(platform: Arc<dyn ChannelApi>) -> Self {
        Self { platform }
    }

    /// Emit one event; never fails, never blocks the calling transition on
    /// anything but the send itself
    pub async fn emit(&self, event: LogEvent<'_>) {
        let Some(log_channel) = event.view.logging_channel() else {
            return;
        };

        let suffix = if event.standalone { "" } else { " a ticket" };
        let description = format!(
            "{} <@{}> {}{} in <#{}>",
            event.emoji,
            event.actor,
            event.verb.to_lowercase(),
            suffix,
            event.ticket.channel_id
        );

        let handler = event
            .ticket
            .claimed_by
            .as_ref()
            .map_or_else(|| "None".to_string(), |u| format!("<@{u}>"));

        let mut fields = vec![
            Field::inline("Panel", event.view.panel.title()),
            Field::inline(
                "Opened",
                format!("<t:{}>", event.ticket.created_at.timestamp()),
            ),
            Field::inline("Action", format!("{} {}", event.emoji, event.verb)),
            Field::inline("Button", event.view.button_name()),
            Field::inline("Executed By", format!("<@{}>", event.actor)),
            Field::inline("User", format!("<@{}>", event.ticket.user_id)),
            Field::inline("Channel", format!("<#{}>", event.ticket.channel_id)),
            Field::inline("Handler", handler),
        ];
        fields.extend(event.fields);

        let message = OutboundMessage::text(description)
            .with_sections(vec![Section {
                title: None,
                body: None,
                fields,
            }])
            .with_attachments(event.files);

        let had_files = !message.attachments.is_empty();
        if let Err(err) = self.platform.send(log_channel, message.clone()).await {
            if had_files {
                // Attachments might be too large for the platform; retry
                // the record alone before giving up
                let mut bare = message;
                bare.attachments.clear();
                if let Err(err) = self.platform.send(log_channel, bare).await {
                    tracing::debug!(%err, channel = %log_channel, "dropping ticket log event");
                }
            } else {
                tracing::debug!(%err, channel = %log_channel, "dropping ticket log event");
            }
        }
    }
}
