//! Narrow contract towards the chat platform
//!
//! The lifecycle engine never talks to a concrete chat backend. Everything
//! it needs - private channel management, message sending, permission
//! overwrites, transcript export - goes through the traits in this module,
//! implemented by the (excluded) integration layer. Messages are
//! presentation-free: sections and controls, no embed cosmetics.

pub mod events;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::TicketId;

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

id_newtype!(
    /// Guild (community/server space) identifier
    GuildId
);
id_newtype!(
    /// Channel identifier, also used for categories
    ChannelId
);
id_newtype!(
    /// Member/user identifier
    UserId
);
id_newtype!(
    /// Role identifier
    RoleId
);
id_newtype!(
    /// Message identifier
    MessageId
);

/// Identifier of an interactive control (button, select menu)
///
/// The string form is what the platform echoes back in
/// [`events::InboundEvent::ComponentClick`]; constructors keep the scheme in
/// one place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlId(pub String);

impl ControlId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn claim(ticket: &TicketId) -> Self {
        Self(format!("@ticket-claim@{ticket}"))
    }

    #[must_use]
    pub fn unclaim(ticket: &TicketId) -> Self {
        Self(format!("@ticket-unclaim@{ticket}"))
    }

    #[must_use]
    pub fn close(ticket: &TicketId) -> Self {
        Self(format!("@ticket-close@{ticket}"))
    }

    #[must_use]
    pub fn request_close(ticket: &TicketId) -> Self {
        Self(format!("@ticket-request-close@{ticket}"))
    }

    #[must_use]
    pub fn auto_expire(ticket: &TicketId) -> Self {
        Self(format!("@ticket-auto-expire@{ticket}"))
    }

    #[must_use]
    pub fn escalate(ticket: &TicketId) -> Self {
        Self(format!("@ticket-escalate@{ticket}"))
    }

    #[must_use]
    pub fn deescalate(ticket: &TicketId) -> Self {
        Self(format!("@ticket-deescalate@{ticket}"))
    }

    #[must_use]
    pub fn support_vc(ticket: &TicketId) -> Self {
        Self(format!("@ticket-vc@{ticket}"))
    }

    #[must_use]
    pub fn support_vc_end(ticket: &TicketId) -> Self {
        Self(format!("@ticket-vc-end@{ticket}"))
    }

    #[must_use]
    pub fn close_without_reason(ticket: &TicketId) -> Self {
        Self(format!("@ticket-close-without-reason@{ticket}"))
    }

    #[must_use]
    pub fn close_cancel(ticket: &TicketId) -> Self {
        Self(format!("@ticket-close-cancel@{ticket}"))
    }

    #[must_use]
    pub fn request_close_without_reason(ticket: &TicketId) -> Self {
        Self(format!("@ticket-request-close-without-reason@{ticket}"))
    }

    #[must_use]
    pub fn request_close_cancel(ticket: &TicketId) -> Self {
        Self(format!("@ticket-request-close-cancel@{ticket}"))
    }

    #[must_use]
    pub fn request_close_accept(ticket: &TicketId) -> Self {
        Self(format!("@ticket-request-close-accept@{ticket}"))
    }

    #[must_use]
    pub fn request_close_decline(ticket: &TicketId) -> Self {
        Self(format!("@ticket-request-close-decline@{ticket}"))
    }

    /// Server-selection control; the pending (panel, action) choice rides in
    /// the identifier so no server-side session is needed for the hop
    #[must_use]
    pub fn server_select(panel_index: usize, action_index: usize) -> Self {
        Self(format!("@ticket-server-select@{panel_index}@{action_index}"))
    }

    #[must_use]
    pub fn collect_form(form_id: &str) -> Self {
        Self(format!("@ticket-collect-form@{form_id}"))
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The acting member, as reported by the interaction layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub display_name: String,
    pub roles: Vec<RoleId>,
}

impl Actor {
    #[must_use]
    pub fn new(id: impl Into<UserId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            roles: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_roles(mut self, roles: Vec<RoleId>) -> Self {
        self.roles = roles;
        self
    }

    /// Whether the actor holds any of the given roles
    #[must_use]
    pub fn holds_any(&self, roles: &[RoleId]) -> bool {
        self.roles.iter().any(|r| roles.contains(r))
    }

    /// Whether the actor holds one specific role
    #[must_use]
    pub fn holds(&self, role: &RoleId) -> bool {
        self.roles.contains(role)
    }
}

impl From<UserId> for Actor {
    fn from(id: UserId) -> Self {
        let name = id.0.clone();
        Self {
            id,
            display_name: name,
            roles: Vec::new(),
        }
    }
}

/// Target of a permission overwrite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverwriteTarget {
    /// The guild-wide default role
    Everyone,
    Role(RoleId),
    Member(UserId),
}

/// Grant or deny the view/post capability bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    Grant,
    Deny,
}

/// One permission overwrite on a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionOverwrite {
    pub target: OverwriteTarget,
    pub access: Access,
}

impl PermissionOverwrite {
    #[must_use]
    pub const fn grant(target: OverwriteTarget) -> Self {
        Self {
            target,
            access: Access::Grant,
        }
    }

    #[must_use]
    pub const fn deny(target: OverwriteTarget) -> Self {
        Self {
            target,
            access: Access::Deny,
        }
    }
}

/// Channel kind, as far as the engine cares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelKind {
    Text,
    Voice,
}

/// Request to create a channel
#[derive(Debug, Clone)]
pub struct CreateChannel {
    pub name: String,
    pub kind: ChannelKind,
    pub parent: Option<ChannelId>,
    pub topic: Option<String>,
    pub overwrites: Vec<PermissionOverwrite>,
    pub reason: String,
}

/// Partial channel edit; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct ChannelEdit {
    pub name: Option<String>,
    pub topic: Option<String>,
    pub parent: Option<ChannelId>,
    /// Full permission reset when set
    pub overwrites: Option<Vec<PermissionOverwrite>>,
    pub reason: Option<String>,
}

/// A name/value pair inside a message section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl Field {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            inline: false,
        }
    }

    #[must_use]
    pub fn inline(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            inline: true,
        }
    }
}

/// One structured block of an outbound message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    pub title: Option<String>,
    pub body: Option<String>,
    pub fields: Vec<Field>,
}

/// Visual weight of a control; rendering is the integration layer's concern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlStyle {
    Primary,
    Secondary,
    Success,
    Danger,
}

/// An interactive control attached to a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub id: ControlId,
    pub label: String,
    pub emoji: Option<String>,
    pub style: ControlStyle,
    /// Non-empty for select menus; empty for buttons
    pub options: Vec<String>,
}

impl Control {
    #[must_use]
    pub fn button(
        id: ControlId,
        label: impl Into<String>,
        emoji: Option<&str>,
        style: ControlStyle,
    ) -> Self {
        Self {
            id,
            label: label.into(),
            emoji: emoji.map(String::from),
            style,
            options: Vec::new(),
        }
    }

    #[must_use]
    pub fn select(id: ControlId, placeholder: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            id,
            label: placeholder.into(),
            emoji: None,
            style: ControlStyle::Secondary,
            options,
        }
    }
}

/// A generated file artifact (transcript export)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptFile {
    pub name: String,
    pub data: Vec<u8>,
}

/// Presentation-free outbound message
#[derive(Debug, Clone, Default)]
pub struct OutboundMessage {
    pub content: String,
    pub sections: Vec<Section>,
    pub controls: Vec<Control>,
    pub attachments: Vec<TranscriptFile>,
}

impl OutboundMessage {
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_controls(mut self, controls: Vec<Control>) -> Self {
        self.controls = controls;
        self
    }

    #[must_use]
    pub fn with_sections(mut self, sections: Vec<Section>) -> Self {
        self.sections = sections;
        self
    }

    #[must_use]
    pub fn with_attachments(mut self, attachments: Vec<TranscriptFile>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// Errors surfaced by platform implementations
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlatformError {
    #[error("{what} not found")]
    NotFound { what: String },
    #[error("missing permission: {message}")]
    MissingPermission { message: String },
    #[error("{message}")]
    Api { message: String },
}

impl PlatformError {
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    #[must_use]
    pub fn missing_permission(message: impl Into<String>) -> Self {
        Self::MissingPermission {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }
}

/// Result alias for platform calls
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Channel and message management, implemented by the integration layer
#[async_trait]
pub trait ChannelApi: Send + Sync {
    async fn create_channel(
        &self,
        guild: &GuildId,
        request: CreateChannel,
    ) -> PlatformResult<ChannelId>;

    async fn edit_channel(&self, channel: &ChannelId, edit: ChannelEdit) -> PlatformResult<()>;

    async fn delete_channel(&self, channel: &ChannelId, reason: &str) -> PlatformResult<()>;

    async fn channel_name(&self, channel: &ChannelId) -> PlatformResult<String>;

    /// Parent category of a channel, when it has one
    async fn channel_parent(&self, channel: &ChannelId) -> PlatformResult<Option<ChannelId>>;

    async fn channel_overwrites(
        &self,
        channel: &ChannelId,
    ) -> PlatformResult<Vec<PermissionOverwrite>>;

    async fn grant_overwrite(
        &self,
        channel: &ChannelId,
        overwrite: PermissionOverwrite,
    ) -> PlatformResult<()>;

    async fn revoke_overwrite(
        &self,
        channel: &ChannelId,
        target: &OverwriteTarget,
    ) -> PlatformResult<()>;

    async fn send(&self, channel: &ChannelId, message: OutboundMessage)
    -> PlatformResult<MessageId>;

    async fn pin_message(&self, channel: &ChannelId, message: &MessageId) -> PlatformResult<()>;

    /// Unpin every message previously pinned by the bot itself; pinned user
    /// messages are left alone
    async fn unpin_own_messages(&self, channel: &ChannelId) -> PlatformResult<()>;

    async fn send_dm(&self, user: &UserId, message: OutboundMessage) -> PlatformResult<()>;

    async fn category_exists(&self, guild: &GuildId, category: &ChannelId)
    -> PlatformResult<bool>;

    /// Locate a channel by exact name under a parent category
    async fn find_channel(
        &self,
        guild: &GuildId,
        parent: &ChannelId,
        name: &str,
        kind: ChannelKind,
    ) -> PlatformResult<Option<ChannelId>>;
}

/// Transcript export collaborator: channel history to a file artifact
#[async_trait]
pub trait TranscriptExporter: Send + Sync {
    async fn export(&self, channel: &ChannelId) -> PlatformResult<TranscriptFile>;
}

/// Optional identity pre-fetch integration for steam-id form entries
#[async_trait]
pub trait SteamIdSource: Send + Sync {
    async fn lookup(&self, user: &UserId) -> PlatformResult<Option<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_id_scheme_is_stable() {
        let ticket = TicketId::new();
        let id = ControlId::claim(&ticket);
        assert!(id.as_str().starts_with("@ticket-claim@"));
        assert!(id.as_str().ends_with(&ticket.to_string()));
    }

    #[test]
    fn test_server_select_carries_position() {
        let id = ControlId::server_select(2, 0);
        assert_eq!(id.as_str(), "@ticket-server-select@2@0");
    }

    #[test]
    fn test_actor_role_checks() {
        let actor = Actor::new("100", "helper").with_roles(vec![RoleId::from("r1")]);
        assert!(actor.holds(&RoleId::from("r1")));
        assert!(actor.holds_any(&[RoleId::from("r2"), RoleId::from("r1")]));
        assert!(!actor.holds_any(&[RoleId::from("r2")]));
    }
}
