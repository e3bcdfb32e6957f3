//! Per-actor user profile

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::platform::UserId;

/// Backing record for one actor, resolved or created on first contact.
///
/// Carries the stored steam id used to prefill identity form entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub actor_id: UserId,
    #[serde(default)]
    pub steam_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    #[must_use]
    pub fn new(actor_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            actor_id,
            steam_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Store a captured steam id; returns true when the value changed
    pub fn set_steam_id(&mut self, steam_id: impl Into<String>) -> bool {
        let steam_id = steam_id.into();
        let trimmed = steam_id.trim();
        if trimmed.is_empty() || self.steam_id.as_deref() == Some(trimmed) {
            return false;
        }
        self.steam_id = Some(trimmed.to_string());
        self.updated_at = Utc::now();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_steam_id_trims_and_dedupes() {
        let mut profile = UserProfile::new(UserId::from("u1"));
        assert!(profile.set_steam_id("  76561198000000000 "));
        assert_eq!(profile.steam_id.as_deref(), Some("76561198000000000"));
        assert!(!profile.set_steam_id("76561198000000000"));
        assert!(!profile.set_steam_id("   "));
    }
}
