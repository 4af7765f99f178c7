//! Participants: authenticated clients currently joined to a room.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::flow::CursorPosition;
use crate::id::UserId;

/// What a participant may do in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// The room's owner. Full control.
    Owner,
    /// May mutate the document.
    Editor,
    /// May watch and move a cursor, nothing else.
    Viewer,
}

impl Role {
    /// Whether this role may submit document mutations.
    #[must_use]
    pub const fn may_edit(self) -> bool {
        matches!(self, Self::Owner | Self::Editor)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Owner => "OWNER",
            Self::Editor => "EDITOR",
            Self::Viewer => "VIEWER",
        };
        f.write_str(s)
    }
}

/// An authenticated identity, produced by the access oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// Canonical user id.
    pub user_id: UserId,
    /// Display name shown to other participants.
    pub name: String,
}

/// A client currently joined to a room. Never persisted to the durable
/// store; lives only in the controller and the warm cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Canonical user id.
    pub user_id: UserId,
    /// Display name.
    pub name: String,
    /// Resolved role in this room.
    pub role: Role,
    /// Last time the participant sent anything.
    pub last_active_at: DateTime<Utc>,
    /// Live cursor, if the client has reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorPosition>,
}

impl Participant {
    /// Create a participant from a principal and resolved role.
    #[must_use]
    pub fn new(principal: Principal, role: Role) -> Self {
        Self {
            user_id: principal.user_id,
            name: principal.name,
            role,
            last_active_at: Utc::now(),
            cursor: None,
        }
    }

    /// Refresh the activity timestamp.
    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewer_may_not_edit() {
        assert!(Role::Owner.may_edit());
        assert!(Role::Editor.may_edit());
        assert!(!Role::Viewer.may_edit());
    }

    #[test]
    fn role_uses_wire_casing() {
        assert_eq!(serde_json::to_string(&Role::Editor).unwrap(), "\"EDITOR\"");
        let role: Role = serde_json::from_str("\"VIEWER\"").unwrap();
        assert_eq!(role, Role::Viewer);
    }
}
