//! The wire codec shared by both transports.
//!
//! Outbound intents are encoded with [`encode`]. Inbound deliveries arrive
//! here as `(subject, payload)` pairs and are routed onto the tick loop. Intents on the
//! shared subjects become [`Inbound::Bus`]; death events addressed to this
//! node on `soulgraves.<node>.death` become [`Inbound::Death`].

use soulgraves_core::engine::{EngineInbox, Inbound};
use soulgraves_types::{ALL_SUBJECTS, BusMessage, DeathEvent, NodeId};
use tracing::{debug, warn};

use crate::error::NodeError;

/// Subject on which this node accepts death events.
pub fn death_subject(node: &NodeId) -> String {
    format!("soulgraves.{node}.death")
}

/// Encode an outbound intent. Logs and returns `None` if it cannot be
/// serialized.
pub fn encode(message: &BusMessage) -> Option<Vec<u8>> {
    match message.to_payload() {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!(subject = message.subject(), error = %e, "failed to serialize soul intent");
            None
        }
    }
}

/// Decode one delivery. Returns `None` for subjects this node does not
/// handle.
pub fn decode(
    subject: &str,
    payload: &[u8],
    death_subject: &str,
) -> Result<Option<Inbound>, NodeError> {
    if subject == death_subject {
        let event: DeathEvent = serde_json::from_slice(payload)?;
        return Ok(Some(Inbound::Death(event)));
    }
    if ALL_SUBJECTS.contains(&subject) {
        let message = BusMessage::from_payload(payload)?;
        if message.subject() != subject {
            warn!(subject, kind = message.subject(), "message kind does not match subject, dropped");
            return Ok(None);
        }
        return Ok(Some(Inbound::Bus(message)));
    }
    Ok(None)
}

/// Decode and queue one delivery. Returns `false` once the engine is gone.
pub fn deliver(inbox: &EngineInbox, death_subject: &str, subject: &str, payload: &[u8]) -> bool {
    match decode(subject, payload, death_subject) {
        Ok(Some(Inbound::Death(event))) => inbox.death(event),
        Ok(Some(Inbound::Bus(message))) => inbox.bus(message),
        Ok(Some(Inbound::Reconciled(_))) => true,
        Ok(None) => {
            debug!(subject, "unhandled subject");
            true
        }
        Err(e) => {
            warn!(subject, error = %e, "undecodable payload dropped");
            true
        }
    }
}
