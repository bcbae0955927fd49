//! Cross-node bus messages.
//!
//! Non-owning nodes publish these on the shared bus. Every node receives
//! every message; only the node whose registry holds the marker applies it.
//!
//! # Subjects
//!
//! | Message | Subject / channel |
//! |---------|-------------------|
//! | [`BusMessage::Explode`] | `soulgraves.explode` |
//! | [`BusMessage::Delete`] | `soulgraves.delete` |
//! | [`BusMessage::Sync`] | `soulgraves.sync` |

use serde::{Deserialize, Serialize};

use crate::ids::MarkerId;
use crate::structs::SoulRecord;

/// Subject for explode requests.
pub const EXPLODE_SUBJECT: &str = "soulgraves.explode";
/// Subject for delete requests.
pub const DELETE_SUBJECT: &str = "soulgraves.delete";
/// Subject for snapshot sync requests.
pub const SYNC_SUBJECT: &str = "soulgraves.sync";
/// All subjects a node subscribes to.
pub const ALL_SUBJECTS: [&str; 3] = [EXPLODE_SUBJECT, DELETE_SUBJECT, SYNC_SUBJECT];

/// A mutating intent routed to a soul's owning node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BusMessage {
    /// Make the soul explode now, dropping its contents.
    Explode {
        /// Target marker.
        marker_id: MarkerId,
    },
    /// Remove the soul without dropping anything.
    Delete {
        /// Target marker.
        marker_id: MarkerId,
    },
    /// Replace the soul's payload and expiry with this snapshot.
    Sync {
        /// The full soul snapshot.
        snapshot: SoulRecord,
    },
}

impl BusMessage {
    /// The marker this message targets.
    pub const fn marker_id(&self) -> MarkerId {
        match self {
            Self::Explode { marker_id } | Self::Delete { marker_id } => *marker_id,
            Self::Sync { snapshot } => snapshot.marker_id,
        }
    }

    /// The subject this message is published on.
    pub const fn subject(&self) -> &'static str {
        match self {
            Self::Explode { .. } => EXPLODE_SUBJECT,
            Self::Delete { .. } => DELETE_SUBJECT,
            Self::Sync { .. } => SYNC_SUBJECT,
        }
    }

    /// Serialize to a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if serialization fails.
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if `payload` is not a valid message.
    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_follows_variant() {
        let marker_id = MarkerId::new();
        assert_eq!(BusMessage::Explode { marker_id }.subject(), EXPLODE_SUBJECT);
        assert_eq!(BusMessage::Delete { marker_id }.subject(), DELETE_SUBJECT);
    }

    #[test]
    fn payload_is_tagged_json() {
        let marker_id = MarkerId::new();
        let payload = BusMessage::Delete { marker_id }.to_payload().unwrap_or_default();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap_or_default();
        assert_eq!(value.get("kind").and_then(|v| v.as_str()), Some("delete"));
        let expected = marker_id.to_string();
        assert_eq!(
            value.get("marker_id").and_then(|v| v.as_str()),
            Some(expected.as_str())
        );
    }

    #[test]
    fn garbage_payload_is_rejected() {
        assert!(BusMessage::from_payload(b"{\"kind\":\"teleport\"}").is_err());
    }
}
