//! Test support: recording collaborator doubles and engine fixtures
//!
//! An in-memory [`RecordingPlatform`] that captures every platform call,
//! plus a transcript-exporter double that counts exports. Used by the
//! crate's own tests; embedders can reuse them to exercise their
//! integration layers without a live chat backend.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::platform::{
    ChannelApi, ChannelEdit, ChannelId, ChannelKind, CreateChannel, GuildId, MessageId,
    OutboundMessage, OverwriteTarget, PermissionOverwrite, PlatformError, PlatformResult,
    SteamIdSource, TranscriptExporter, TranscriptFile, UserId,
};

/// One simulated channel
#[derive(Debug, Clone)]
pub struct FakeChannel {
    pub name: String,
    pub kind: ChannelKind,
    pub parent: Option<ChannelId>,
    pub topic: Option<String>,
    pub overwrites: Vec<PermissionOverwrite>,
    pub deleted: bool,
}

#[derive(Default)]
struct PlatformState {
    channels: HashMap<ChannelId, FakeChannel>,
    categories: HashSet<ChannelId>,
    sent: Vec<(ChannelId, OutboundMessage)>,
    dms: Vec<(UserId, OutboundMessage)>,
    pins: Vec<(ChannelId, MessageId)>,
    unpin_calls: Vec<ChannelId>,
    deletions: Vec<(ChannelId, String)>,
    revocations: Vec<(ChannelId, OverwriteTarget)>,
}

/// Chat-platform double that records every call
#[derive(Default)]
pub struct RecordingPlatform {
    state: Mutex<PlatformState>,
    counter: AtomicU64,
    fail_sends: AtomicBool,
    fail_creates: AtomicBool,
    fail_deletes: AtomicBool,
    fail_grants: AtomicBool,
}

impl RecordingPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefix}-{n}")
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PlatformState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a category channel so `category_exists` resolves it
    pub fn add_category(&self, id: impl Into<ChannelId>) {
        let id = id.into();
        let mut state = self.lock();
        state.categories.insert(id.clone());
        state.channels.insert(
            id.clone(),
            FakeChannel {
                name: id.to_string(),
                kind: ChannelKind::Text,
                parent: None,
                topic: None,
                overwrites: Vec::new(),
                deleted: false,
            },
        );
    }

    /// Register a plain text channel (entry points, logging channels)
    pub fn add_channel(&self, id: impl Into<ChannelId>, name: &str) {
        let mut state = self.lock();
        state.channels.insert(
            id.into(),
            FakeChannel {
                name: name.to_string(),
                kind: ChannelKind::Text,
                parent: None,
                topic: None,
                overwrites: Vec::new(),
                deleted: false,
            },
        );
    }

    /// Every future `send` fails while set
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::Relaxed);
    }

    /// Every future `create_channel` fails while set
    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::Relaxed);
    }

    /// Every future `delete_channel` fails while set
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::Relaxed);
    }

    /// Every future `grant_overwrite` fails while set
    pub fn fail_grants(&self, fail: bool) {
        self.fail_grants.store(fail, Ordering::Relaxed);
    }

    /// Snapshot of a channel
    #[must_use]
    pub fn channel(&self, id: &ChannelId) -> Option<FakeChannel> {
        self.lock().channels.get(id).cloned()
    }

    /// Messages sent to one channel
    #[must_use]
    pub fn sent_to(&self, channel: &ChannelId) -> Vec<OutboundMessage> {
        self.lock()
            .sent
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// DMs sent to one user
    #[must_use]
    pub fn dms_to(&self, user: &UserId) -> Vec<OutboundMessage> {
        self.lock()
            .dms
            .iter()
            .filter(|(u, _)| u == user)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Messages pinned in one channel
    #[must_use]
    pub fn pins_in(&self, channel: &ChannelId) -> usize {
        self.lock().pins.iter().filter(|(c, _)| c == channel).count()
    }

    /// Channels passed to `unpin_own_messages`
    #[must_use]
    pub fn unpin_calls(&self) -> Vec<ChannelId> {
        self.lock().unpin_calls.clone()
    }

    /// Whether a channel was deleted
    #[must_use]
    pub fn was_deleted(&self, channel: &ChannelId) -> bool {
        self.lock().channels.get(channel).is_some_and(|c| c.deleted)
    }

    /// Overwrite revocations in call order
    #[must_use]
    pub fn revocations(&self) -> Vec<(ChannelId, OverwriteTarget)> {
        self.lock().revocations.clone()
    }

    /// Channels created so far (excluding registered fixtures), in order
    #[must_use]
    pub fn created_channels(&self) -> Vec<ChannelId> {
        let state = self.lock();
        let mut ids: Vec<ChannelId> = state
            .channels
            .keys()
            .filter(|id| id.as_str().starts_with("chan-"))
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl ChannelApi for RecordingPlatform {
    async fn create_channel(
        &self,
        _guild: &GuildId,
        request: CreateChannel,
    ) -> PlatformResult<ChannelId> {
        if self.fail_creates.load(Ordering::Relaxed) {
            return Err(PlatformError::api("simulated channel-creation failure"));
        }
        let id = ChannelId::new(self.next("chan"));
        let mut state = self.lock();
        state.channels.insert(
            id.clone(),
            FakeChannel {
                name: request.name,
                kind: request.kind,
                parent: request.parent,
                topic: request.topic,
                overwrites: request.overwrites,
                deleted: false,
            },
        );
        Ok(id)
    }

    async fn edit_channel(&self, channel: &ChannelId, edit: ChannelEdit) -> PlatformResult<()> {
        let mut state = self.lock();
        let entry = state
            .channels
            .get_mut(channel)
            .ok_or_else(|| PlatformError::not_found("channel"))?;
        if let Some(name) = edit.name {
            entry.name = name;
        }
        if let Some(topic) = edit.topic {
            entry.topic = Some(topic);
        }
        if let Some(parent) = edit.parent {
            entry.parent = Some(parent);
        }
        if let Some(overwrites) = edit.overwrites {
            entry.overwrites = overwrites;
        }
        Ok(())
    }

    async fn delete_channel(&self, channel: &ChannelId, reason: &str) -> PlatformResult<()> {
        if self.fail_deletes.load(Ordering::Relaxed) {
            return Err(PlatformError::missing_permission(
                "cannot delete this channel",
            ));
        }
        let mut state = self.lock();
        let entry = state
            .channels
            .get_mut(channel)
            .ok_or_else(|| PlatformError::not_found("channel"))?;
        entry.deleted = true;
        state.deletions.push((channel.clone(), reason.to_string()));
        Ok(())
    }

    async fn channel_name(&self, channel: &ChannelId) -> PlatformResult<String> {
        self.lock()
            .channels
            .get(channel)
            .map(|c| c.name.clone())
            .ok_or_else(|| PlatformError::not_found("channel"))
    }

    async fn channel_parent(&self, channel: &ChannelId) -> PlatformResult<Option<ChannelId>> {
        self.lock()
            .channels
            .get(channel)
            .map(|c| c.parent.clone())
            .ok_or_else(|| PlatformError::not_found("channel"))
    }

    async fn channel_overwrites(
        &self,
        channel: &ChannelId,
    ) -> PlatformResult<Vec<PermissionOverwrite>> {
        self.lock()
            .channels
            .get(channel)
            .map(|c| c.overwrites.clone())
            .ok_or_else(|| PlatformError::not_found("channel"))
    }

    async fn grant_overwrite(
        &self,
        channel: &ChannelId,
        overwrite: PermissionOverwrite,
    ) -> PlatformResult<()> {
        if self.fail_grants.load(Ordering::Relaxed) {
            return Err(PlatformError::missing_permission(
                "role sits at or above the bot's highest role",
            ));
        }
        let mut state = self.lock();
        let entry = state
            .channels
            .get_mut(channel)
            .ok_or_else(|| PlatformError::not_found("channel"))?;
        entry.overwrites.retain(|o| o.target != overwrite.target);
        entry.overwrites.push(overwrite);
        Ok(())
    }

    async fn revoke_overwrite(
        &self,
        channel: &ChannelId,
        target: &OverwriteTarget,
    ) -> PlatformResult<()> {
        let mut state = self.lock();
        let entry = state
            .channels
            .get_mut(channel)
            .ok_or_else(|| PlatformError::not_found("channel"))?;
        entry.overwrites.retain(|o| &o.target != target);
        state.revocations.push((channel.clone(), target.clone()));
        Ok(())
    }

    async fn send(
        &self,
        channel: &ChannelId,
        message: OutboundMessage,
    ) -> PlatformResult<MessageId> {
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(PlatformError::api("simulated send failure"));
        }
        let id = MessageId::new(self.next("msg"));
        self.lock().sent.push((channel.clone(), message));
        Ok(id)
    }

    async fn pin_message(&self, channel: &ChannelId, message: &MessageId) -> PlatformResult<()> {
        self.lock().pins.push((channel.clone(), message.clone()));
        Ok(())
    }

    async fn unpin_own_messages(&self, channel: &ChannelId) -> PlatformResult<()> {
        self.lock().unpin_calls.push(channel.clone());
        Ok(())
    }

    async fn send_dm(&self, user: &UserId, message: OutboundMessage) -> PlatformResult<()> {
        self.lock().dms.push((user.clone(), message));
        Ok(())
    }

    async fn category_exists(
        &self,
        _guild: &GuildId,
        category: &ChannelId,
    ) -> PlatformResult<bool> {
        Ok(self.lock().categories.contains(category))
    }

    async fn find_channel(
        &self,
        _guild: &GuildId,
        parent: &ChannelId,
        name: &str,
        kind: ChannelKind,
    ) -> PlatformResult<Option<ChannelId>> {
        Ok(self.lock().channels.iter().find_map(|(id, c)| {
            (!c.deleted && c.kind == kind && c.parent.as_ref() == Some(parent) && c.name == name)
                .then(|| id.clone())
        }))
    }
}

/// Transcript exporter double; counts exports so close-once behavior is
/// observable
#[derive(Default)]
pub struct RecordingTranscripts {
    exports: AtomicU64,
}

impl RecordingTranscripts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn export_count(&self) -> u64 {
        self.exports.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TranscriptExporter for RecordingTranscripts {
    async fn export(&self, channel: &ChannelId) -> PlatformResult<TranscriptFile> {
        self.exports.fetch_add(1, Ordering::Relaxed);
        Ok(TranscriptFile {
            name: format!("transcript-{channel}.html"),
            data: format!("<html>{channel}</html>").into_bytes(),
        })
    }
}

/// Steam-id source double returning one fixed id
pub struct FixedSteamSource(pub String);

#[async_trait]
impl SteamIdSource for FixedSteamSource {
    async fn lookup(&self, _user: &UserId) -> PlatformResult<Option<String>> {
        Ok(Some(self.0.clone()))
    }
}

/// Everything an engine test needs, wired to recording doubles
pub struct TestHarness {
    pub engine: crate::TicketEngine,
    pub storage: Arc<crate::storage::MemoryStorage>,
    pub platform: Arc<RecordingPlatform>,
    pub transcripts: Arc<RecordingTranscripts>,
    pub guild: GuildId,
}

/// Default panel fixture: baseline staff role, two-step escalation chain,
/// support VCs enabled, one form-less action and one with a form
#[must_use]
pub fn sample_panel_yaml() -> &'static str {
    r#"
panels:
  - identifier: "Support"
    embed:
      title: "Community Support"
    category_open_ticket_id: "cat-1"
    role_permissions: ["role-staff"]
    logging_channel_id: "log-1"
    escalation_role_ids: ["role-esc-1", "role-esc-2"]
    has_dedicated_support_vcs: true
    actions:
      - button_text: "General"
        button_emoji: "🎟️"
      - button_text: "Report"
        form_entries:
          - label: "Steam64 ID"
            required: true
            is_steam_id: true
          - label: "What happened?"
            required: true
            is_long: true
"#
}

/// Build a harness around the default panel fixture
#[must_use]
pub fn harness() -> TestHarness {
    harness_with(sample_panel_yaml())
}

/// Answer form prompts the way the interaction layer would: watch the
/// channel for collect-form controls and publish one submission per page,
/// in order
pub async fn respond_to_form_prompts(
    engine: &crate::TicketEngine,
    platform: &RecordingPlatform,
    channel: &ChannelId,
    respondent: &UserId,
    mut pages: Vec<Vec<String>>,
) {
    use crate::platform::events::InboundEvent;

    const PROMPT_PREFIX: &str = "@ticket-collect-form@";
    let mut seen = HashSet::new();
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    pages.reverse();
    while !pages.is_empty() && std::time::Instant::now() < deadline {
        let unseen = platform
            .sent_to(channel)
            .iter()
            .flat_map(|m| m.controls.clone())
            .filter(|c| c.id.as_str().starts_with(PROMPT_PREFIX))
            .map(|c| c.id.as_str()[PROMPT_PREFIX.len()..].to_string())
            .find(|id| !seen.contains(id));
        if let Some(form_id) = unseen {
            seen.insert(form_id.clone());
            let values = pages.pop().unwrap_or_default();
            engine.events().publish(InboundEvent::FormSubmit {
                channel: channel.clone(),
                user: respondent.clone(),
                form_id,
                values,
            });
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
}

/// Build a harness around a custom panel fixture
#[must_use]
pub fn harness_with(yaml: &str) -> TestHarness {
    let panels = crate::config::PanelSet::from_yaml(yaml).expect("fixture panels parse");
    let storage = Arc::new(crate::storage::MemoryStorage::new());
    let platform = Arc::new(RecordingPlatform::new());
    let transcripts = Arc::new(RecordingTranscripts::new());

    platform.add_category("cat-1");
    platform.add_channel("log-1", "ticket-logs");
    platform.add_channel("entry-1", "open-a-ticket");

    let engine = crate::TicketEngine::builder()
        .panels(panels)
        .storage(storage.clone())
        .platform(platform.clone())
        .transcripts(transcripts.clone())
        .build()
        .expect("fixture engine builds");

    TestHarness {
        engine,
        storage,
        platform,
        transcripts,
        guild: GuildId::from("guild-1"),
    }
}
