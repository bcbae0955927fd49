//! Cross-node bus.
//!
//! Publishing is fire-and-forget: transports log failures and never report
//! them back. Inbound messages are handed to the engine's inbox and applied
//! on the tick loop.

use soulgraves_types::BusMessage;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::engine::EngineInbox;

/// Outbound side of the bus.
pub trait SoulBus: Send + Sync {
    /// Publish a message to every node. Best effort.
    fn publish(&self, message: BusMessage);
}

/// Drops every message. Used in embedded mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBus;

impl SoulBus for NoopBus {
    fn publish(&self, message: BusMessage) {
        debug!(subject = message.subject(), marker_id = %message.marker_id(), "bus disabled, message dropped");
    }
}

/// In-process bus over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<BusMessage>,
}

impl LocalBus {
    /// Create a bus that buffers up to `capacity` messages per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// A new receiver that sees every message published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.sender.subscribe()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl SoulBus for LocalBus {
    fn publish(&self, message: BusMessage) {
        if self.sender.send(message).is_err() {
            debug!("no bus subscribers");
        }
    }
}

/// Forward every message from `receiver` into `inbox` until either side
/// closes.
pub fn forward_to_engine(
    mut receiver: broadcast::Receiver<BusMessage>,
    inbox: EngineInbox,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(message) => {
                    if !inbox.bus(message) {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "bus receiver lagged, messages lost");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
