//! NATS transport for the cross-node bus.
//!
//! Intents are published on `soulgraves.explode`, `soulgraves.delete` and
//! `soulgraves.sync`. A node subscribes to `soulgraves.>`, which covers those
//! subjects and its own death intake subject.

use futures::StreamExt;
use soulgraves_core::bus::SoulBus;
use soulgraves_core::engine::EngineInbox;
use soulgraves_types::BusMessage;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::NodeError;
use crate::intake;

/// Wildcard matching every `SoulGraves` subject.
const WILDCARD: &str = "soulgraves.>";

/// NATS client wrapper for the soul bus.
#[derive(Clone)]
pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    /// Connect to a NATS server.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Nats`] if the connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self, NodeError> {
        info!(url = url, "connecting to NATS server");
        let client = async_nats::connect(url)
            .await
            .map_err(|e| NodeError::Nats(format!("failed to connect to {url}: {e}")))?;
        info!("NATS connection established");
        Ok(Self { client })
    }

    /// Subscribe to every soul subject and forward deliveries into `inbox`
    /// until the engine goes away or the subscription ends.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Nats`] if the subscription fails.
    pub async fn forward_to(
        &self,
        inbox: EngineInbox,
        death_subject: String,
    ) -> Result<JoinHandle<()>, NodeError> {
        let mut subscriber = self
            .client
            .subscribe(WILDCARD)
            .await
            .map_err(|e| NodeError::Nats(format!("failed to subscribe to {WILDCARD}: {e}")))?;
        info!(subject = WILDCARD, death_subject = %death_subject, "subscribed to soul subjects");

        Ok(tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                if !intake::deliver(&inbox, &death_subject, message.subject.as_str(), &message.payload) {
                    debug!("engine stopped, ending NATS intake");
                    break;
                }
            }
        }))
    }

    /// Flush pending publishes to the server.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Nats`] if the flush fails.
    pub async fn flush(&self) -> Result<(), NodeError> {
        self.client
            .flush()
            .await
            .map_err(|e| NodeError::Nats(format!("flush failed: {e}")))
    }
}

impl SoulBus for NatsBus {
    fn publish(&self, message: BusMessage) {
        let subject = message.subject();
        let Some(payload) = intake::encode(&message) else {
            return;
        };
        let client = self.client.clone();
        let marker_id = message.marker_id();
        tokio::spawn(async move {
            if let Err(e) = client.publish(subject, payload.into()).await {
                warn!(subject, marker_id = %marker_id, error = %e, "failed to publish soul intent");
            }
        });
    }
}

impl std::fmt::Debug for NatsBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsBus").field("connected", &true).finish()
    }
}
