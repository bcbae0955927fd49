//! `SoulGraves` node entry point.
//!
//! A node owns the souls created on it. It runs their behaviors on a fixed
//! tick, mirrors them into storage, and exchanges explode, delete and sync
//! intents with the rest of the cluster over the bus.
//!
//! # Architecture
//!
//! ```text
//! bus (death, intents) --> inbox --> tick loop --> world + storage
//!                                       |
//!                                       +--> registry view --> directory
//! ```
//!
//! Without a game host attached the node runs against a headless in-memory
//! world and region host, so deaths arrive only over the bus on
//! `soulgraves.<node>.death` and spawn vetoes come from `regions` in the
//! config file.

mod error;
mod intake;
mod nats_bus;
mod redis_bus;

use std::path::Path;
use std::sync::Arc;

use soulgraves_core::bus::{NoopBus, SoulBus};
use soulgraves_core::clock::SystemClock;
use soulgraves_core::config::{BusKind, SoulGravesConfig};
use soulgraves_core::embedded::EmbeddedBackend;
use soulgraves_core::engine::{EngineContext, EngineInbox, SoulEngine};
use soulgraves_core::memory_region::MemoryRegions;
use soulgraves_core::memory_world::MemoryWorld;
use soulgraves_core::region::{self, SPAWN_FLAG};
use soulgraves_core::store::SoulBackend;
use soulgraves_core::world::WorldPort;
use soulgraves_db::{PostgresBackend, PostgresConfig, PostgresPool};
use soulgraves_types::StorageMode;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::error::NodeError;
use crate::nats_bus::NatsBus;
use crate::redis_bus::RedisBus;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "soulgraves-config.yaml";

/// The connected bus transport.
enum Transport {
    Nats(NatsBus),
    Redis(RedisBus),
}

impl Transport {
    async fn connect(config: &SoulGravesConfig) -> Result<Self, NodeError> {
        match config.bus.kind {
            BusKind::Nats => Ok(Self::Nats(NatsBus::connect(&config.infrastructure.nats_url).await?)),
            BusKind::Redis => Ok(Self::Redis(RedisBus::connect(&config.infrastructure.redis_url).await?)),
        }
    }

    async fn forward_to(&self, inbox: EngineInbox, death_subject: String) -> Result<JoinHandle<()>, NodeError> {
        match self {
            Self::Nats(bus) => bus.forward_to(inbox, death_subject).await,
            Self::Redis(bus) => bus.forward_to(inbox, death_subject).await,
        }
    }

    /// Outbound side for the directory. Intents only travel in database
    /// mode, where other nodes can see our souls.
    fn outbound(&self, mode: StorageMode) -> Arc<dyn SoulBus> {
        match (mode, self) {
            (StorageMode::Embedded, _) => Arc::new(NoopBus),
            (StorageMode::Database, Self::Nats(bus)) => Arc::new(bus.clone()),
            (StorageMode::Database, Self::Redis(bus)) => Arc::new(bus.clone()),
        }
    }

    async fn close(&self) {
        match self {
            Self::Nats(bus) => {
                if let Err(e) = bus.flush().await {
                    error!(error = %e, "NATS flush on shutdown failed");
                }
            }
            Self::Redis(bus) => bus.quit().await,
        }
    }
}

fn load_config() -> Result<SoulGravesConfig, NodeError> {
    let path = std::env::var("SOULGRAVES_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned());
    let path = Path::new(&path);
    if path.exists() {
        Ok(SoulGravesConfig::from_file(path)?)
    } else {
        Ok(SoulGravesConfig::parse("")?)
    }
}

fn init_logging(config: &SoulGravesConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Application entry point.
///
/// Loads configuration, opens storage and the bus, reloads this node's
/// souls, then ticks until Ctrl-C.
///
/// # Errors
///
/// Returns an error if configuration, storage or the bus cannot be set up.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    init_logging(&config);

    let node = config.node_id();
    info!(
        node = %node,
        storage = ?config.storage.mode,
        bus = ?config.bus.kind,
        time_stable = config.souls.time_stable,
        time_unstable = config.souls.time_unstable,
        tick_interval_ms = config.souls.tick_interval_ms,
        "soulgraves-node starting"
    );

    let world = Arc::new(MemoryWorld::with_worlds(config.node.worlds.iter().cloned()));

    // --- Storage ---
    let mut pool = None;
    let backend: Arc<dyn SoulBackend> = match config.storage.mode {
        StorageMode::Embedded => Arc::new(EmbeddedBackend::new(Arc::clone(&world) as _)),
        StorageMode::Database => {
            let pg = PostgresConfig::from_settings(&config.infrastructure);
            let connected = PostgresPool::connect(&pg).await.map_err(NodeError::from)?;
            pool = Some(connected.clone());
            Arc::new(PostgresBackend::new(connected))
        }
    };

    // The headless world keeps no markers across restarts; restore ours.
    if matches!(config.storage.mode, StorageMode::Database) {
        backend.prepare().await;
        for row in backend.load_for_node(&node).await {
            if !row.deleted {
                world.spawn_marker(row.record.marker_id, &row.record.location);
            }
        }
    }

    // --- Regions ---
    let regions = Arc::new(MemoryRegions::denying(
        SPAWN_FLAG,
        config.regions.deny_spawning.iter().cloned(),
    ));
    let spawn_policy = region::hook_spawn_flag(regions.as_ref(), regions.clone());

    // --- Engine ---
    let mut engine = SoulEngine::new(EngineContext {
        node: node.clone(),
        souls: config.souls.clone(),
        clock: Arc::new(SystemClock),
        world,
        region: spawn_policy,
        backend,
    });
    let running = engine.load_from_backend().await;

    // --- Bus ---
    let transport = Transport::connect(&config).await?;
    let intake_task = transport
        .forward_to(engine.inbox(), intake::death_subject(&node))
        .await?;
    let directory = engine.directory(transport.outbound(config.storage.mode));
    info!(
        running,
        visible = directory.all_souls().await.len(),
        "souls loaded"
    );

    // --- Run ---
    let ticks = engine
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl-C, shutting down");
            }
        })
        .await;

    intake_task.abort();
    transport.close().await;
    if let Some(pool) = pool {
        pool.close().await;
    }
    info!(ticks, "soulgraves-node stopped");
    Ok(())
}
