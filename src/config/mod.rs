//! Static panel/action configuration
//!
//! Panels describe ticket intake surfaces; each panel carries an ordered
//! list of action slots (which may contain gaps). The tree is loaded once
//! at process start and is read-only afterwards. Every panel and action is
//! assigned a stable identifier at load time; tickets store those
//! identifiers rather than array positions, so reordering the file can
//! never silently corrupt existing tickets - a stale reference surfaces as
//! a configuration-drift error instead.

pub mod resolver;

pub use resolver::ActionView;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use crate::error::{Result, TicketDeskError};
use crate::platform::{ChannelId, RoleId};

/// Stable panel identifier, assigned at load time
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PanelId(pub String);

impl PanelId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PanelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable action identifier, assigned at load time
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub String);

impl ActionId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Embed styling carried through to the rendering layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedStyle {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// One data-entry form field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormEntry {
    pub label: String,
    #[serde(default)]
    pub required: bool,
    /// Paragraph-style input instead of a single line
    #[serde(default)]
    pub is_long: bool,
    /// Identity field; value is stored on the user profile and prefilled
    #[serde(default)]
    pub is_steam_id: bool,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub placeholder: Option<String>,
}

/// Keys resolvable through the server-mapping/action/panel override chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overridables {
    #[serde(default)]
    pub category_open_ticket_id: Option<ChannelId>,
    #[serde(default)]
    pub role_permissions: Option<Vec<RoleId>>,
    #[serde(default)]
    pub logging_channel_id: Option<ChannelId>,
    #[serde(default)]
    pub ticket_index_join_str: Option<String>,
    #[serde(default)]
    pub ping_on_ticket_creation: Option<bool>,
    #[serde(default)]
    pub ticket_creation_message: Option<String>,
}

/// One ticket-creation variant within a panel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelAction {
    /// Explicit stable id; derived from the button text when absent
    #[serde(default)]
    pub id: ActionId,
    #[serde(default)]
    pub button_text: Option<String>,
    #[serde(default)]
    pub button_emoji: Option<String>,
    #[serde(default)]
    pub button_color: Option<String>,
    #[serde(default)]
    pub form_entries: Vec<FormEntry>,
    #[serde(flatten)]
    pub overrides: Overridables,
}

impl PanelAction {
    /// Button presentation: emoji and text joined, matching the deployed label
    #[must_use]
    pub fn button_name(&self) -> String {
        let emoji = self.button_emoji.as_deref().unwrap_or("");
        let text = self.button_text.as_deref().unwrap_or("");
        let sep = if emoji.is_empty() || text.is_empty() {
            ""
        } else {
            " "
        };
        format!("{emoji}{sep}{text}").trim().to_string()
    }

    /// The identity entry of this action's form, if any
    #[must_use]
    pub fn steam_id_entry(&self) -> Option<(usize, &FormEntry)> {
        self.form_entries
            .iter()
            .enumerate()
            .find(|(_, e)| e.is_steam_id)
    }
}

/// One ticket intake surface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Panel {
    /// Explicit stable id; derived from the identifier when absent
    #[serde(default)]
    pub id: PanelId,
    pub identifier: String,
    #[serde(default)]
    pub embed: EmbedStyle,
    /// Fixed server binding, mutually exclusive with `select_server`
    #[serde(default)]
    pub server: Option<String>,
    /// Prompt the opener for a server before the form
    #[serde(default)]
    pub select_server: bool,
    #[serde(default)]
    pub has_dedicated_support_vcs: bool,
    /// Escalation chain, ordered low to high
    #[serde(default)]
    pub escalation_role_ids: Vec<RoleId>,
    /// Fetch a missing steam id from the backend integration before forms
    #[serde(default)]
    pub pre_fetch_steam64: bool,
    /// Per-server-identifier override dictionary
    #[serde(default)]
    pub server_mapping: HashMap<String, Overridables>,
    /// Ordered action slots; gaps are preserved
    #[serde(default)]
    pub actions: Vec<Option<PanelAction>>,
    #[serde(flatten)]
    pub overrides: Overridables,
}

impl Panel {
    /// Panel display title, falling back to the identifier
    #[must_use]
    pub fn title(&self) -> &str {
        self.embed.title.as_deref().unwrap_or(&self.identifier)
    }
}

#[derive(Debug, Deserialize)]
struct PanelFile {
    panels: Vec<Panel>,
}

/// The loaded, read-only panel tree
#[derive(Debug, Clone, Default)]
pub struct PanelSet {
    panels: Vec<Panel>,
}

impl PanelSet {
    /// Build a panel set, assigning stable ids and validating uniqueness
    pub fn new(mut panels: Vec<Panel>) -> Result<Self> {
        let mut seen_panels = HashSet::new();
        let mut seen_actions = HashSet::new();

        for panel in &mut panels {
            if panel.id.0.is_empty() {
                panel.id = PanelId(slugify(&panel.identifier));
            }
            if !seen_panels.insert(panel.id.0.clone()) {
                return Err(TicketDeskError::configuration(format!(
                    "duplicate panel id `{}`",
                    panel.id
                )));
            }
            for (slot, action) in panel.actions.iter_mut().enumerate() {
                let Some(action) = action else { continue };
                if action.id.0.is_empty() {
                    let local = action
                        .button_text
                        .as_deref()
                        .map(slugify)
                        .filter(|s| !s.is_empty())
                        .unwrap_or_else(|| format!("action-{slot}"));
                    action.id = ActionId(format!("{}/{local}", panel.id));
                }
                if !seen_actions.insert(action.id.0.clone()) {
                    return Err(TicketDeskError::configuration(format!(
                        "duplicate action id `{}` in panel `{}`",
                        action.id, panel.id
                    )));
                }
            }
        }

        Ok(Self { panels })
    }

    /// Load the panel tree from a configuration file (YAML/TOML/JSON)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()
            .map_err(|e| TicketDeskError::configuration(format!("panel config: {e}")))?;
        let file: PanelFile = cfg
            .try_deserialize()
            .map_err(|e| TicketDeskError::configuration(format!("panel config: {e}")))?;
        Self::new(file.panels)
    }

    /// Parse the panel tree from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: PanelFile = serde_yaml::from_str(yaml)?;
        Self::new(file.panels)
    }

    #[must_use]
    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    /// Resolve a deployed entry point by position.
    ///
    /// Deployed buttons address panels and actions positionally; a stale
    /// button referencing removed configuration aborts here with a
    /// re-deploy instruction.
    pub fn resolve_entry(
        &self,
        panel_index: usize,
        action_index: usize,
    ) -> Result<(&Panel, &PanelAction)> {
        let panel = self.panels.get(panel_index).ok_or_else(|| {
            TicketDeskError::configuration(format!(
                "ticket panel with index `{panel_index}` no longer exists"
            ))
        })?;
        let action = panel
            .actions
            .get(action_index)
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                TicketDeskError::configuration(format!(
                    "ticket action with index `{action_index}` is not defined"
                ))
            })?;
        Ok((panel, action))
    }

    /// Resolve by stored stable identifiers; drift errors instruct a re-deploy
    pub fn resolve_ids(
        &self,
        panel_id: &PanelId,
        action_id: &ActionId,
    ) -> Result<(&Panel, &PanelAction)> {
        let panel = self
            .panels
            .iter()
            .find(|p| &p.id == panel_id)
            .ok_or_else(|| TicketDeskError::PanelDrift {
                panel_id: panel_id.0.clone(),
            })?;
        let action = panel
            .actions
            .iter()
            .flatten()
            .find(|a| &a.id == action_id)
            .ok_or_else(|| TicketDeskError::ActionDrift {
                action_id: action_id.0.clone(),
            })?;
        Ok((panel, action))
    }

    /// Flatten every non-empty action slot into `(panel, action)` pairs,
    /// in declaration order
    pub fn all_actions(&self) -> impl Iterator<Item = (&Panel, &PanelAction)> {
        self.panels
            .iter()
            .flat_map(|p| p.actions.iter().flatten().map(move |a| (p, a)))
    }
}

fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut dash = false;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            dash = false;
        } else if !dash && !out.is_empty() {
            out.push('-');
            dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}
