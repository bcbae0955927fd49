//! Periodic per-soul behaviors.
//!
//! Each local soul carries a [`BehaviorSet`]: seven behaviors started
//! together, each firing on its own period measured in engine ticks, and
//! stopped together on teardown. A behavior is a plain function of the
//! soul and a [`BehaviorContext`]; it returns an [`Outcome`] the engine
//! acts on. Every behavior is a no-op once the soul is terminal.

use std::fmt;

use soulgraves_types::{PlayerId, SoulState};

use crate::config::SoulsConfig;
use crate::soul::Soul;
use crate::world::WorldPort;

/// One periodic behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Behavior {
    /// Recompute remaining time and explode at zero.
    Expiry,
    /// Ambient particles.
    Particle,
    /// Look for a qualifying player in pickup range.
    Pickup,
    /// Visual refresh.
    Render,
    /// Ambient sound.
    Sound,
    /// NORMAL/PANIC transition.
    State,
    /// Confirm the world and marker still exist.
    Validation,
}

impl Behavior {
    /// Every behavior, in the order they run within a tick.
    pub const ALL: [Self; 7] = [
        Self::Expiry,
        Self::Particle,
        Self::Pickup,
        Self::Render,
        Self::Sound,
        Self::State,
        Self::Validation,
    ];

    /// Ticks between runs.
    pub const fn period_ticks(self) -> u64 {
        match self {
            Self::Render => 1,
            Self::Pickup => 4,
            Self::Expiry | Self::State => 20,
            Self::Particle | Self::Sound => 50,
            Self::Validation => 100,
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Self::Expiry => 1,
            Self::Particle => 2,
            Self::Pickup => 4,
            Self::Render => 8,
            Self::Sound => 16,
            Self::State => 32,
            Self::Validation => 64,
        }
    }

    /// Whether the behavior writes to the soul. Only these need
    /// [`Behavior::run`]; the rest can go through [`Behavior::observe`].
    pub const fn mutates(self) -> bool {
        matches!(self, Self::Expiry | Self::State)
    }

    /// Run this behavior against `soul`.
    pub fn run(self, soul: &mut Soul, ctx: &BehaviorContext<'_>) -> Outcome {
        if soul.is_terminal() {
            return Outcome::Continue;
        }
        match self {
            Self::Expiry => expiry(soul, ctx),
            Self::State => state(soul, ctx),
            _ => self.observe(soul, ctx),
        }
    }

    /// Run a read-only behavior. Expiry and state do nothing here.
    pub fn observe(self, soul: &Soul, ctx: &BehaviorContext<'_>) -> Outcome {
        if soul.is_terminal() {
            return Outcome::Continue;
        }
        match self {
            Self::Expiry | Self::State => Outcome::Continue,
            Self::Particle => {
                ctx.world
                    .emit_particles(soul.marker_id(), soul.location(), soul.state());
                Outcome::Continue
            }
            Self::Pickup => pickup(soul, ctx),
            Self::Render => {
                ctx.world.render(soul.marker_id(), soul.location(), soul.state());
                Outcome::Continue
            }
            Self::Sound => {
                ctx.world.play_sound(soul.marker_id(), soul.location(), soul.state());
                Outcome::Continue
            }
            Self::Validation => validation(soul, ctx),
        }
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Expiry => "expiry",
            Self::Particle => "particle",
            Self::Pickup => "pickup",
            Self::Render => "render",
            Self::Sound => "sound",
            Self::State => "state",
            Self::Validation => "validation",
        };
        f.write_str(name)
    }
}

/// What the engine should do after a behavior ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing.
    Continue,
    /// Start the explosion.
    Explode,
    /// Delete without dropping anything.
    Delete,
    /// Hand the contents to this player, then delete.
    Pickup(PlayerId),
}

/// Everything a behavior may read besides the soul itself.
pub struct BehaviorContext<'a> {
    /// The live world.
    pub world: &'a dyn WorldPort,
    /// Soul settings.
    pub souls: &'a SoulsConfig,
    /// Current time, epoch milliseconds.
    pub now_ms: i64,
}

fn expiry(soul: &mut Soul, ctx: &BehaviorContext<'_>) -> Outcome {
    soul.refresh_time_left(ctx.now_ms);
    if soul.time_left() == 0 {
        Outcome::Explode
    } else {
        Outcome::Continue
    }
}

fn state(soul: &mut Soul, ctx: &BehaviorContext<'_>) -> Outcome {
    soul.refresh_time_left(ctx.now_ms);
    let next = if soul.time_left() <= ctx.souls.time_unstable {
        SoulState::Panic
    } else {
        SoulState::Normal
    };
    soul.set_state(next);
    Outcome::Continue
}

fn pickup(soul: &Soul, ctx: &BehaviorContext<'_>) -> Outcome {
    let actors = ctx
        .world
        .nearby_actors(soul.location(), ctx.souls.pickup_radius);
    let qualifying = actors
        .iter()
        .filter(|a| a.can_interact)
        .filter(|a| a.player_id == soul.owner_id() || ctx.souls.others_can_pickup);
    // The owner wins when several players are in range.
    let mut chosen = None;
    for actor in qualifying {
        if actor.player_id == soul.owner_id() {
            chosen = Some(actor.player_id);
            break;
        }
        chosen.get_or_insert(actor.player_id);
    }
    chosen.map_or(Outcome::Continue, Outcome::Pickup)
}

fn validation(soul: &Soul, ctx: &BehaviorContext<'_>) -> Outcome {
    if !ctx.world.world_exists(&soul.location().world) {
        return Outcome::Delete;
    }
    if soul.has_representation() && !ctx.world.marker_exists(soul.marker_id(), soul.location()) {
        return Outcome::Delete;
    }
    Outcome::Continue
}

/// Running flags for a soul's seven behaviors.
///
/// Started at most once; after [`BehaviorSet::stop_all`] nothing restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BehaviorSet {
    running: u8,
    started_at: Option<u64>,
    stopped: bool,
}

impl BehaviorSet {
    /// Start every behavior at `tick`.
    ///
    /// Returns `false` if already started or already stopped.
    pub fn start(&mut self, tick: u64) -> bool {
        if self.stopped || self.started_at.is_some() {
            return false;
        }
        self.started_at = Some(tick);
        self.running = Behavior::ALL.iter().fold(0, |acc, b| acc | b.bit());
        true
    }

    /// Stop every behavior. Permanent.
    pub const fn stop_all(&mut self) {
        self.running = 0;
        self.stopped = true;
    }

    /// Whether `behavior` is running.
    pub const fn is_running(&self, behavior: Behavior) -> bool {
        self.running & behavior.bit() != 0
    }

    /// Whether any behavior is running.
    pub const fn any_running(&self) -> bool {
        self.running != 0
    }

    /// Whether [`BehaviorSet::stop_all`] has been called.
    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Whether `behavior` should fire on `tick`.
    pub fn is_due(&self, behavior: Behavior, tick: u64) -> bool {
        let Some(started) = self.started_at else {
            return false;
        };
        self.is_running(behavior)
            && tick
                .checked_sub(started)
                .and_then(|elapsed| elapsed.checked_rem(behavior.period_ticks()))
                == Some(0)
    }
}
