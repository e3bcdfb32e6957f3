//! Ticket lifecycle flows
//!
//! [`TicketEngine`] is the single entry point for every ticket operation:
//! intake, claim/unclaim, escalation, close, request-close, switch-action,
//! auto-expiry and the support voice toggle. Each flow lives in its own
//! module; this module wires the collaborators together and carries the
//! shared transition preamble (resolve ticket, re-resolve its panel and
//! action from stored identifiers, check actor standing).

pub mod close;
pub mod dialog;
pub mod expiry;
pub mod forms;
pub mod intake;
pub mod lifecycle;
pub mod switch;
pub mod voice;

pub use close::{CloseOutcome, CloseReport, RequestCloseOutcome};
pub use dialog::{CONFIRM_WINDOW, ConfirmationDialog, DialogOutcome};
pub use expiry::{AUTO_EXPIRE_DELAY, ReconcileReport};
pub use forms::{FORM_COLLECT_WINDOW, FormPager, FormResponse, MODAL_FIELDS_MAX};
pub use intake::{CreatedTicket, IntakeOutcome, OpenTicketRequest};
pub use switch::{SwitchActionRequest, SwitchOutcome};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::task::JoinHandle;

use crate::config::{ActionView, PanelSet};
use crate::core::{Ticket, TicketId};
use crate::error::{Result, TicketDeskError};
use crate::logging::TicketEventLog;
use crate::platform::events::EventBus;
use crate::platform::{
    Actor, ChannelApi, ChannelEdit, ChannelId, OutboundMessage, SteamIdSource, TranscriptExporter,
};
use crate::storage::{SettingsService, Storage, TicketRepository, UserRepository};

/// Channel-name marker for claimed tickets
pub(crate) const CLAIM_MARKER: &str = "📍";
/// Channel-name marker for escalated tickets
pub(crate) const ESCALATE_MARKER: &str = "⬆️";
/// Channel-name marker for tickets scheduled to auto-expire
pub(crate) const EXPIRE_MARKER: &str = "⏰";
/// Channel-name marker for tickets with an active support VC
pub(crate) const VOICE_MARKER: &str = "🔊";

const ALL_MARKERS: [&str; 6] = ["📍", "📌", "⬆️", "⏰", "🔊", "🔒"];

static NAME_SANITIZER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9-]+").expect("static pattern"));

/// Lowercase a display name into channel-name-safe form
#[must_use]
pub(crate) fn sanitize_name(name: &str) -> String {
    let lowered = name.to_lowercase().replace(' ', "-");
    let cleaned = NAME_SANITIZER.replace_all(&lowered, "");
    cleaned.trim_matches('-').to_string()
}

/// Remove every lifecycle marker glyph from a channel name
#[must_use]
pub(crate) fn strip_markers(name: &str) -> String {
    let mut out = name.to_string();
    for marker in ALL_MARKERS {
        out = out.replace(marker, "");
    }
    out
}

/// Recover the opener part of a `0004-opener` style channel name
#[must_use]
pub(crate) fn opener_from_channel_name(name: &str) -> String {
    let stripped = strip_markers(name);
    let rest = stripped.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() == stripped.len() {
        // No leading index; use the whole stripped name
        return stripped;
    }
    let mut chars = rest.chars();
    chars.next();
    chars.as_str().to_string()
}

struct EngineInner {
    panels: Arc<PanelSet>,
    tickets: Arc<dyn TicketRepository>,
    users: Arc<dyn UserRepository>,
    settings: SettingsService,
    platform: Arc<dyn ChannelApi>,
    transcripts: Arc<dyn TranscriptExporter>,
    steam_ids: Option<Arc<dyn SteamIdSource>>,
    events: EventBus,
    log: TicketEventLog,
    expiry_timers: Mutex<HashMap<ChannelId, JoinHandle<()>>>,
}

/// The ticket lifecycle engine
///
/// Cheap to clone; clones share all state. Every public method is one
/// inbound operation from the interaction layer.
#[derive(Clone)]
pub struct TicketEngine {
    inner: Arc<EngineInner>,
}

impl TicketEngine {
    /// Start building an engine
    #[must_use]
    pub fn builder() -> TicketEngineBuilder {
        TicketEngineBuilder::default()
    }

    /// The loaded panel configuration
    #[must_use]
    pub fn panels(&self) -> &PanelSet {
        &self.inner.panels
    }

    /// The inbound event bus; the integration layer publishes here
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub(crate) fn platform(&self) -> &Arc<dyn ChannelApi> {
        &self.inner.platform
    }

    pub(crate) fn tickets(&self) -> &Arc<dyn TicketRepository> {
        &self.inner.tickets
    }

    pub(crate) fn users(&self) -> &Arc<dyn UserRepository> {
        &self.inner.users
    }

    pub(crate) fn settings(&self) -> &SettingsService {
        &self.inner.settings
    }

    pub(crate) fn transcripts(&self) -> &Arc<dyn TranscriptExporter> {
        &self.inner.transcripts
    }

    pub(crate) fn steam_ids(&self) -> Option<&Arc<dyn SteamIdSource>> {
        self.inner.steam_ids.as_ref()
    }

    pub(crate) fn log(&self) -> &TicketEventLog {
        &self.inner.log
    }

    pub(crate) fn expiry_timers(&self) -> &Mutex<HashMap<ChannelId, JoinHandle<()>>> {
        &self.inner.expiry_timers
    }

    /// Load a ticket by id or fail with a user-visible not-found error
    pub(crate) fn ticket_by_id(&self, id: &TicketId) -> Result<Ticket> {
        self.inner
            .tickets
            .find_by_id(id)?
            .ok_or_else(|| TicketDeskError::not_found("ticket"))
    }

    /// Load the ticket backing a channel
    pub(crate) fn ticket_by_channel(&self, channel: &ChannelId) -> Result<Ticket> {
        self.inner
            .tickets
            .find_by_channel(channel)?
            .ok_or_else(|| TicketDeskError::not_found("ticket for this channel"))
    }

    /// Re-resolve a ticket's panel and action from its stored identifiers
    pub(crate) fn view_for<'a>(&'a self, ticket: &'a Ticket) -> Result<ActionView<'a>> {
        let (panel, action) = self
            .inner
            .panels
            .resolve_ids(&ticket.panel_id, &ticket.action_id)?;
        Ok(ActionView::new(
            panel,
            action,
            ticket.server_identifier.as_deref(),
        ))
    }

    /// Closed tickets accept no further transitions
    pub(crate) fn ensure_open(ticket: &Ticket) -> Result<()> {
        if ticket.closed {
            return Err(TicketDeskError::state("this ticket is already closed"));
        }
        Ok(())
    }

    /// The ticket's own creator may not drive staff transitions unless they
    /// also hold a baseline staff role
    pub(crate) fn ensure_not_restricted_creator(
        view: &ActionView<'_>,
        ticket: &Ticket,
        actor: &Actor,
    ) -> Result<()> {
        if ticket.user_id == actor.id && !actor.holds_any(view.role_permissions()) {
            return Err(TicketDeskError::state(
                "ticket creators cannot perform this action on their own ticket",
            ));
        }
        Ok(())
    }

    /// Prefix the channel name with a marker glyph; best-effort
    pub(crate) async fn mark_channel(&self, channel: &ChannelId, marker: &str) {
        let Ok(name) = self.inner.platform.channel_name(channel).await else {
            return;
        };
        if name.starts_with(marker) {
            return;
        }
        let edit = ChannelEdit {
            name: Some(format!("{marker}{name}")),
            ..ChannelEdit::default()
        };
        if let Err(err) = self.inner.platform.edit_channel(channel, edit).await {
            tracing::debug!(%err, %channel, marker, "could not mark channel name");
        }
    }

    /// Remove a marker glyph from the channel name; best-effort
    pub(crate) async fn unmark_channel(&self, channel: &ChannelId, marker: &str) {
        let Ok(name) = self.inner.platform.channel_name(channel).await else {
            return;
        };
        if !name.contains(marker) {
            return;
        }
        let edit = ChannelEdit {
            name: Some(name.replace(marker, "")),
            ..ChannelEdit::default()
        };
        if let Err(err) = self.inner.platform.edit_channel(channel, edit).await {
            tracing::debug!(%err, %channel, marker, "could not unmark channel name");
        }
    }

    /// Post a plain notice into a channel; best-effort
    pub(crate) async fn send_note(&self, channel: &ChannelId, text: impl Into<String>) {
        if let Err(err) = self
            .inner
            .platform
            .send(channel, OutboundMessage::text(text))
            .await
        {
            tracing::debug!(%err, %channel, "could not send channel notice");
        }
    }
}

/// Builder for [`TicketEngine`]
#[derive(Default)]
pub struct TicketEngineBuilder {
    panels: Option<Arc<PanelSet>>,
    tickets: Option<Arc<dyn TicketRepository>>,
    users: Option<Arc<dyn UserRepository>>,
    settings: Option<SettingsService>,
    platform: Option<Arc<dyn ChannelApi>>,
    transcripts: Option<Arc<dyn TranscriptExporter>>,
    steam_ids: Option<Arc<dyn SteamIdSource>>,
    events: Option<EventBus>,
}

impl TicketEngineBuilder {
    /// Set the loaded panel configuration
    #[must_use]
    pub fn panels(mut self, panels: PanelSet) -> Self {
        self.panels = Some(Arc::new(panels));
        self
    }

    /// Use one storage backend for tickets, profiles, and settings
    #[must_use]
    pub fn storage<S>(mut self, storage: Arc<S>) -> Self
    where
        S: Storage + 'static,
    {
        self.tickets = Some(storage.clone());
        self.users = Some(storage.clone());
        self.settings = Some(SettingsService::new(storage));
        self
    }

    /// Override the settings service (custom TTL, separate backend)
    #[must_use]
    pub fn settings(mut self, settings: SettingsService) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Set the chat-platform implementation
    #[must_use]
    pub fn platform(mut self, platform: Arc<dyn ChannelApi>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Set the transcript export collaborator
    #[must_use]
    pub fn transcripts(mut self, transcripts: Arc<dyn TranscriptExporter>) -> Self {
        self.transcripts = Some(transcripts);
        self
    }

    /// Attach the optional steam-id pre-fetch integration
    #[must_use]
    pub fn steam_ids(mut self, steam_ids: Arc<dyn SteamIdSource>) -> Self {
        self.steam_ids = Some(steam_ids);
        self
    }

    /// Share an existing event bus instead of creating one
    #[must_use]
    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Assemble the engine
    pub fn build(self) -> Result<TicketEngine> {
        let panels = self
            .panels
            .ok_or_else(|| TicketDeskError::configuration("panel configuration is not loaded"))?;
        let tickets = self
            .tickets
            .ok_or_else(|| TicketDeskError::configuration("ticket storage is not configured"))?;
        let users = self
            .users
            .ok_or_else(|| TicketDeskError::configuration("user storage is not configured"))?;
        let settings = self
            .settings
            .ok_or_else(|| TicketDeskError::configuration("settings storage is not configured"))?;
        let platform = self
            .platform
            .ok_or_else(|| TicketDeskError::configuration("platform API is not configured"))?;
        let transcripts = self.transcripts.ok_or_else(|| {
            TicketDeskError::configuration("transcript exporter is not configured")
        })?;

        let events = self.events.unwrap_or_default();
        let log = TicketEventLog::new(platform.clone());

        Ok(TicketEngine {
            inner: Arc::new(EngineInner {
                panels,
                tickets,
                users,
                settings,
                platform,
                transcripts,
                steam_ids: self.steam_ids,
                events,
                log,
                expiry_timers: Mutex::new(HashMap::new()),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Mira Saki"), "mira-saki");
        assert_eq!(sanitize_name("Ünicode!! User"), "nicode-user");
        assert_eq!(sanitize_name("--edge--"), "edge");
    }

    #[test]
    fn test_strip_markers() {
        assert_eq!(strip_markers("📍⏰0004-mira"), "0004-mira");
        assert_eq!(strip_markers("plain"), "plain");
    }

    #[test]
    fn test_opener_from_channel_name() {
        assert_eq!(opener_from_channel_name("0004-mira"), "mira");
        assert_eq!(opener_from_channel_name("📍0010_two-part"), "two-part");
        assert_eq!(opener_from_channel_name("no-index"), "no-index");
    }
}
