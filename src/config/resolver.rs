//! Override-key resolution
//!
//! Precedence for every overridable key: per-server mapping, else the
//! action value, else the panel value, else none. Pure lookups; callers
//! decide whether a missing value means "use the default" or "reject".

use super::{Overridables, Panel, PanelAction};
use crate::platform::{ChannelId, RoleId};

const DEFAULT_INDEX_JOIN: &str = "-";

/// A panel/action pair bound to an optional server identifier, with the
/// override chain applied
#[derive(Debug, Clone, Copy)]
pub struct ActionView<'a> {
    pub panel: &'a Panel,
    pub action: &'a PanelAction,
    pub server_identifier: Option<&'a str>,
}

impl<'a> ActionView<'a> {
    #[must_use]
    pub fn new(
        panel: &'a Panel,
        action: &'a PanelAction,
        server_identifier: Option<&'a str>,
    ) -> Self {
        Self {
            panel,
            action,
            server_identifier,
        }
    }

    /// Resolve one overridable key through the precedence chain
    pub fn resolve<T, F>(&self, pick: F) -> Option<&'a T>
    where
        T: ?Sized,
        F: Fn(&'a Overridables) -> Option<&'a T>,
    {
        if let Some(server) = self.server_identifier {
            if let Some(mapped) = self.panel.server_mapping.get(server) {
                if let Some(value) = pick(mapped) {
                    return Some(value);
                }
            }
        }
        pick(&self.action.overrides).or_else(|| pick(&self.panel.overrides))
    }

    /// Category for newly created ticket channels
    #[must_use]
    pub fn category(&self) -> Option<&'a ChannelId> {
        self.resolve(|o| o.category_open_ticket_id.as_ref())
    }

    /// Baseline staff roles granted on the ticket channel
    #[must_use]
    pub fn role_permissions(&self) -> &'a [RoleId] {
        self.resolve(|o| o.role_permissions.as_deref())
            .unwrap_or(&[])
    }

    /// Logging channel for lifecycle events
    #[must_use]
    pub fn logging_channel(&self) -> Option<&'a ChannelId> {
        self.resolve(|o| o.logging_channel_id.as_ref())
    }

    /// Joiner between the padded sequence index and the opener's name
    #[must_use]
    pub fn index_join_str(&self) -> &'a str {
        self.resolve(|o| o.ticket_index_join_str.as_deref())
            .unwrap_or(DEFAULT_INDEX_JOIN)
    }

    /// Whether baseline roles are pinged on ticket creation
    #[must_use]
    pub fn ping_on_creation(&self) -> bool {
        self.resolve(|o| o.ping_on_ticket_creation.as_ref())
            .copied()
            .unwrap_or(false)
    }

    /// Creation message template; `{@member}` expands to an opener mention
    #[must_use]
    pub fn creation_message(&self) -> Option<&'a str> {
        self.resolve(|o| o.ticket_creation_message.as_deref())
    }

    /// Effective escalation chain: the panel's escalation roles minus any
    /// already granted as baseline role permissions
    #[must_use]
    pub fn escalation_chain(&self) -> Vec<RoleId> {
        let baseline = self.role_permissions();
        self.panel
            .escalation_role_ids
            .iter()
            .filter(|r| !baseline.contains(r))
            .cloned()
            .collect()
    }

    /// Deployed button label of the bound action
    #[must_use]
    pub fn button_name(&self) -> String {
        self.action.button_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PanelSet;

    const YAML: &str = r#"
panels:
  - identifier: "Support"
    category_open_ticket_id: "panel-cat"
    role_permissions: ["panel-role"]
    ticket_index_join_str: "_"
    escalation_role_ids: ["panel-role", "esc-1", "esc-2"]
    server_mapping:
      Livonia:
        category_open_ticket_id: "livonia-cat"
        ping_on_ticket_creation: true
    actions:
      - button_text: "Report"
        category_open_ticket_id: "action-cat"
      - button_text: "Appeal"
"#;

    fn set() -> PanelSet {
        PanelSet::from_yaml(YAML).unwrap()
    }

    #[test]
    fn test_precedence_server_over_action_over_panel() {
        let set = set();
        let (panel, action) = set.resolve_entry(0, 0).unwrap();

        // server mapping wins
        let view = ActionView::new(panel, action, Some("Livonia"));
        assert_eq!(view.category().unwrap().as_str(), "livonia-cat");

        // unmapped server falls through to the action
        let view = ActionView::new(panel, action, Some("Namalsk"));
        assert_eq!(view.category().unwrap().as_str(), "action-cat");

        // no server: action over panel
        let view = ActionView::new(panel, action, None);
        assert_eq!(view.category().unwrap().as_str(), "action-cat");

        // action without a value falls back to the panel
        let (panel, appeal) = set.resolve_entry(0, 1).unwrap();
        let view = ActionView::new(panel, appeal, None);
        assert_eq!(view.category().unwrap().as_str(), "panel-cat");
    }

    #[test]
    fn test_unconfigured_key_resolves_to_none() {
        let set = set();
        let (panel, action) = set.resolve_entry(0, 0).unwrap();
        let view = ActionView::new(panel, action, None);
        assert!(view.logging_channel().is_none());
        assert!(view.creation_message().is_none());
    }

    #[test]
    fn test_defaults_for_join_and_ping() {
        let set = set();
        let (panel, action) = set.resolve_entry(0, 0).unwrap();

        let view = ActionView::new(panel, action, None);
        assert_eq!(view.index_join_str(), "_");
        assert!(!view.ping_on_creation());

        let view = ActionView::new(panel, action, Some("Livonia"));
        assert!(view.ping_on_creation());
    }

    #[test]
    fn test_escalation_chain_excludes_baseline_roles() {
        let set = set();
        let (panel, action) = set.resolve_entry(0, 0).unwrap();
        let view = ActionView::new(panel, action, None);
        let chain = view.escalation_chain();
        assert_eq!(
            chain,
            vec![RoleId::from("esc-1"), RoleId::from("esc-2")],
            "baseline panel-role must be filtered out of the chain"
        );
    }
}
