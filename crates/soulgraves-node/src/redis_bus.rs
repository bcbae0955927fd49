//! Redis pub/sub transport for the cross-node bus.
//!
//! Uses two connections: a subscribed connection cannot publish, so intake
//! runs on its own client cloned from the publisher's configuration.

use fred::prelude::*;
use fred::types::Message;
use soulgraves_core::bus::SoulBus;
use soulgraves_core::engine::EngineInbox;
use soulgraves_types::BusMessage;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::NodeError;
use crate::intake;

/// Glob pattern matching every `SoulGraves` channel.
const PATTERN: &str = "soulgraves.*";

/// Redis client wrapper for the soul bus.
#[derive(Clone)]
pub struct RedisBus {
    publisher: Client,
}

impl RedisBus {
    /// Connect to Redis at the given URL.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Redis`] if the URL is invalid or the connection
    /// fails.
    pub async fn connect(url: &str) -> Result<Self, NodeError> {
        let config = Config::from_url(url)?;
        let publisher = Builder::from_config(config).build()?;
        publisher.init().await?;
        info!("connected to Redis");
        Ok(Self { publisher })
    }

    /// Subscribe to every soul channel and forward deliveries into `inbox`
    /// until the engine goes away or the connection closes.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Redis`] if the subscriber cannot connect or
    /// subscribe.
    pub async fn forward_to(
        &self,
        inbox: EngineInbox,
        death_subject: String,
    ) -> Result<JoinHandle<()>, NodeError> {
        let subscriber = self.publisher.clone_new();
        subscriber.init().await?;
        let mut messages = subscriber.message_rx();
        subscriber.psubscribe(PATTERN).await?;
        info!(pattern = PATTERN, death_subject = %death_subject, "subscribed to soul channels");

        Ok(tokio::spawn(async move {
            loop {
                match messages.recv().await {
                    Ok(message) => {
                        if !deliver(&inbox, &death_subject, &message) {
                            debug!("engine stopped, ending Redis intake");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Redis intake lagged, messages lost");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            if let Err(e) = subscriber.quit().await {
                debug!(error = %e, "Redis subscriber quit failed");
            }
        }))
    }

    /// Close the publishing connection.
    pub async fn quit(&self) {
        if let Err(e) = self.publisher.quit().await {
            debug!(error = %e, "Redis quit failed");
        }
    }
}

fn deliver(inbox: &EngineInbox, death_subject: &str, message: &Message) -> bool {
    let channel: &str = &message.channel;
    let Some(payload) = message.value.as_bytes() else {
        warn!(channel, "non-text payload dropped");
        return true;
    };
    intake::deliver(inbox, death_subject, channel, payload)
}

impl SoulBus for RedisBus {
    fn publish(&self, message: BusMessage) {
        let channel = message.subject();
        let Some(payload) = intake::encode(&message) else {
            return;
        };
        let client = self.publisher.clone();
        let marker_id = message.marker_id();
        tokio::spawn(async move {
            let result: Result<i64, Error> = client.publish(channel, payload).await;
            if let Err(e) = result {
                warn!(channel, marker_id = %marker_id, error = %e, "failed to publish soul intent");
            }
        });
    }
}

impl std::fmt::Debug for RedisBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBus").finish_non_exhaustive()
    }
}
