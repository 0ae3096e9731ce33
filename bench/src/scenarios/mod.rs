//! Full-world benchmark scenarios.
//!
//! Each scenario stands up a world plus a built schedule and then runs it
//! tick by tick, so the measured numbers include graph dispatch, shard
//! fan-out, and the command barrier rather than raw iteration alone.
//!
//! Three workloads with different stress profiles:
//!
//! - `particles` — one huge archetype, constant churn through the queue
//! - `game_world` — heterogeneous archetypes, AI steering, projectile expiry
//! - `physics` — a pure system chain over wide rows, all parallelism from
//!   sharding

pub mod game_world;
pub mod particles;
pub mod physics;

pub use game_world::{GameWorldConfig, GameWorldScenario};
pub use particles::{ParticleConfig, ParticleScenario};
pub use physics::{PhysicsConfig, PhysicsScenario};

/// Lifecycle shared by the workloads above.
pub trait Scenario {
    /// Population the configuration asks for.
    fn entity_count(&self) -> usize;

    /// Spawn the population, register systems, build the schedule. Call
    /// once; schedules cannot be rebuilt.
    fn setup(&mut self);

    /// Advance the world by one tick.
    fn tick(&mut self);

    /// Destroy the population, leaving the world empty.
    fn teardown(&mut self);
}
