//! Error types for ticket-desk
//!
//! Every lifecycle operation surfaces its failure as a typed error so the
//! interaction layer can relay it to the triggering actor. The logging sink
//! is the one intentional exception and never returns errors.

use thiserror::Error;

use crate::platform::PlatformError;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, TicketDeskError>;

/// Error type for all ticket-desk operations
#[derive(Debug, Error)]
pub enum TicketDeskError {
    /// Static configuration is missing or inconsistent at time of use
    #[error(
        "invalid configuration: {message} - please notify the administrators and re-deploy the ticket panel"
    )]
    Configuration { message: String },

    /// A ticket references a panel that no longer resolves in the loaded
    /// configuration
    #[error(
        "ticket panel `{panel_id}` no longer exists in the loaded configuration - re-deploy the ticket panel and clean up stale deployment messages"
    )]
    PanelDrift { panel_id: String },

    /// A ticket references an action that no longer resolves in the loaded
    /// configuration
    #[error(
        "ticket action `{action_id}` no longer exists in the loaded configuration - re-deploy the ticket panel and clean up stale deployment messages"
    )]
    ActionDrift { action_id: String },

    /// Actor or bot lacks the permission for the requested transition
    #[error("missing permission: {message}")]
    Permission { message: String },

    /// Ticket, channel, or other referenced resource can't be resolved
    #[error("{what} not found")]
    NotFound { what: String },

    /// Operation is invalid for the ticket's current state
    #[error("invalid state: {message}")]
    State { message: String },

    /// Platform API failure during create/edit/delete/send
    #[error("platform failure: {message}")]
    External { message: String },

    /// Ticket was modified concurrently between read and save
    #[error("ticket `{id}` was modified concurrently - reload and retry")]
    VersionConflict { id: String },

    /// A bounded form collection window elapsed without a submission
    #[error("form submission timed out - this action has been cancelled")]
    FormTimeout,

    /// A submitted form did not satisfy its entry constraints
    #[error("invalid form submission: {message}")]
    FormInvalid { message: String },

    /// IO error during storage operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error for stored documents
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),

    /// Custom error message
    #[error("{0}")]
    Custom(String),
}

impl TicketDeskError {
    /// Configuration error with a formatted message
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// State error with a formatted message
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Permission error with a formatted message
    pub fn permission(message: impl Into<String>) -> Self {
        Self::Permission {
            message: message.into(),
        }
    }

    /// Not-found error naming the missing resource
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Returns true when the error only reports partial platform state
    /// (the operation itself committed)
    #[must_use]
    pub const fn is_external(&self) -> bool {
        matches!(self, Self::External { .. })
    }
}

impl From<PlatformError> for TicketDeskError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::NotFound { what } => Self::NotFound { what },
            PlatformError::MissingPermission { message } => Self::Permission { message },
            PlatformError::Api { message } => Self::External { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_error_mapping() {
        let err: TicketDeskError = PlatformError::missing_permission("role above bot").into();
        assert!(matches!(err, TicketDeskError::Permission { .. }));

        let err: TicketDeskError = PlatformError::api("rate limited").into();
        assert!(err.is_external());
    }

    #[test]
    fn test_drift_message_mentions_redeploy() {
        let err = TicketDeskError::PanelDrift {
            panel_id: "dayz-support".into(),
        };
        assert!(err.to_string().contains("re-deploy"));
    }
}
