//! Conflict rejection vocabulary.
//!
//! When validation rejects a granular change, the author — and only the
//! author — receives an `OPERATION_CONFLICT` carrying the machine
//! reason and a short human suggestion. Other participants never see
//! rejected events.

use serde::{Deserialize, Serialize};

use trellis_core::{ChangeKind, Timestamp};

/// Why a granular change was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictReason {
    /// The targeted node or edge is gone (deleted by another author).
    DoesNotExist,
    /// An item with the same id is already present.
    AlreadyExists,
    /// An edge endpoint references a node that is not in the document.
    DanglingEndpoint,
    /// The change could not be classified.
    Unknown,
}

impl ConflictReason {
    /// Short human guidance for the author's client, derived from the
    /// event kind and the reason.
    #[must_use]
    pub const fn suggestion(self, kind: ChangeKind) -> &'static str {
        match (self, kind) {
            (Self::DoesNotExist, _) => {
                "The item you tried to modify was deleted by another user. Please refresh."
            },
            (Self::AlreadyExists, _) => {
                "An item with this id was just created by another user. Please refresh and retry."
            },
            (Self::DanglingEndpoint, _) => {
                "One end of this connection no longer exists. Please refresh."
            },
            (Self::Unknown, ChangeKind::GranularEdges) => {
                "This connection could not be applied. Please refresh."
            },
            (Self::Unknown, _) => "This change could not be applied. Please refresh.",
        }
    }
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::DoesNotExist => "DOES_NOT_EXIST",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::DanglingEndpoint => "DANGLING_ENDPOINT",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// A rejection notice addressed to the rejected event's author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictNotice {
    /// Kind of the rejected event.
    pub kind: ChangeKind,
    /// Timestamp the rejected event carried.
    pub timestamp: Timestamp,
    /// Machine-readable reason.
    pub reason: ConflictReason,
    /// Human guidance for the client.
    pub suggestion: String,
}

impl ConflictNotice {
    /// Build a notice, deriving the suggestion from kind and reason.
    #[must_use]
    pub fn new(kind: ChangeKind, timestamp: Timestamp, reason: ConflictReason) -> Self {
        Self {
            kind,
            timestamp,
            reason,
            suggestion: reason.suggestion(kind).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_serialize_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&ConflictReason::DanglingEndpoint).unwrap(),
            "\"DANGLING_ENDPOINT\""
        );
    }

    #[test]
    fn notice_carries_a_suggestion() {
        let notice = ConflictNotice::new(
            ChangeKind::GranularNodes,
            77,
            ConflictReason::DoesNotExist,
        );
        assert!(notice.suggestion.contains("deleted by another user"));
        assert_eq!(notice.timestamp, 77);
    }
}
