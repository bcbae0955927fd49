//! Soul lifecycle, tick loop, and cross-node coordination for `SoulGraves`.
//!
//! When a player dies their items and experience are captured into a soul
//! that counts down, panics, and finally explodes unless the player (or,
//! if allowed, anyone else) collects it first. This crate owns that state
//! machine and everything around it that is independent of a concrete
//! database or bus transport.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `soulgraves-config.yaml`.
//! - [`clock`] -- [`Clock`] trait, real and manual clocks.
//! - [`soul`] -- The [`Soul`] entity and its lifecycle transitions.
//! - [`behavior`] -- The seven periodic behaviors and their running flags.
//! - [`registry`] -- Souls owned by this node and the published view.
//! - [`engine`] -- [`SoulEngine`], the tick loop and single registry writer.
//! - [`directory`] -- [`SoulDirectory`], merged local and remote queries.
//! - [`store`] -- [`SoulBackend`] persistence trait.
//! - [`embedded`] -- Backend over per-world chunk data.
//! - [`memory_backend`] -- In-memory relational backend.
//! - [`bus`] -- [`SoulBus`] trait and in-process transport.
//! - [`world`] -- Game host ports.
//! - [`memory_world`] -- Headless in-memory world.
//! - [`memory_region`] -- Headless region flags.
//! - [`region`] -- Region flag spawn veto.
//! - [`writer`] -- Ordered background storage queue.
//!
//! [`Clock`]: clock::Clock
//! [`Soul`]: soul::Soul
//! [`SoulEngine`]: engine::SoulEngine
//! [`SoulDirectory`]: directory::SoulDirectory
//! [`SoulBackend`]: store::SoulBackend
//! [`SoulBus`]: bus::SoulBus

pub mod behavior;
pub mod bus;
pub mod clock;
pub mod config;
pub mod directory;
pub mod embedded;
pub mod engine;
pub mod memory_backend;
pub mod memory_region;
pub mod memory_world;
pub mod region;
pub mod registry;
pub mod soul;
pub mod store;
pub mod world;
pub mod writer;
