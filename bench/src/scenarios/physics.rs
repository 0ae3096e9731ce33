//! Physics simulation benchmark scenario.
//!
//! A single dense archetype of rigid bodies: Position, Velocity,
//! Acceleration, Transform. Four systems form a pipeline over the same rows:
//! integrate acceleration, integrate velocity, rebuild transforms, clamp to
//! the world bounds. Every pair of adjacent stages conflicts, so the graph
//! is a pure chain and all the parallelism comes from sharding.
//!
//! This scenario tests chunk iteration bandwidth and shard scaling with
//! wide (64 byte) components in the hot loop.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::components::{Acceleration, Position, Transform, Velocity};
use crate::scenarios::Scenario;
use quartz_engine::ecs::{Config, Entity, Schedule, System, View, World};

const WORLD_BOUND: f32 = 750.0;
const BOUNCE_DAMPING: f32 = 0.85;

/// Knobs for the physics workload.
#[derive(Clone)]
pub struct PhysicsConfig {
    /// Rigid bodies to simulate.
    pub body_count: usize,
    /// Seconds simulated per tick.
    pub delta_time: f32,
    /// Seed for the deterministic RNGs.
    pub seed: u64,
    /// Worker threads the schedule runs on.
    pub workers: usize,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            body_count: 50_000,
            delta_time: 1.0 / 120.0,
            seed: 9393,
            workers: 8,
        }
    }
}

/// World, schedule, and body list for the physics workload.
pub struct PhysicsScenario {
    config: PhysicsConfig,
    world: World,
    schedule: Schedule,
    bodies: Vec<Entity>,
}

impl PhysicsScenario {
    /// Scenario at the default size.
    pub fn new() -> Self {
        Self::with_config(PhysicsConfig::default())
    }

    /// Scenario with explicit knobs.
    pub fn with_config(config: PhysicsConfig) -> Self {
        Self {
            config,
            world: World::new(),
            schedule: Schedule::new(),
            bodies: Vec::new(),
        }
    }

    /// Live bodies right now.
    pub fn current_count(&self) -> usize {
        self.world.entity_count()
    }
}

impl Default for PhysicsScenario {
    fn default() -> Self {
        Self::new()
    }
}

impl Scenario for PhysicsScenario {
    fn entity_count(&self) -> usize {
        self.config.body_count
    }

    fn setup(&mut self) {
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);

        self.bodies = self.world.spawn_many((0..self.config.body_count).map(|_| {
            (
                Position {
                    x: rng.gen_range(-80.0..80.0),
                    y: rng.gen_range(-80.0..80.0),
                    z: rng.gen_range(10.0..150.0),
                },
                Velocity {
                    x: rng.gen_range(-16.0..16.0),
                    y: rng.gen_range(-16.0..16.0),
                    z: rng.gen_range(-4.0..4.0),
                },
                Acceleration {
                    x: rng.gen_range(-1.5..1.5),
                    y: rng.gen_range(-1.5..1.5),
                    z: -9.81, // gravity
                },
                Transform::IDENTITY,
            )
        }));

        let dt = self.config.delta_time;

        let accelerating = Arc::new(View::new().reads::<Acceleration>().writes::<Velocity>());
        let accelerate = accelerating.clone();
        self.schedule.add_system(
            System::new("accelerate", vec![accelerating], move |ctx| {
                for mut row in
                    accelerate.iter_shard(ctx.world(), ctx.par_index(), ctx.par_count())
                {
                    let (ax, ay, az) = {
                        let a = row.read::<Acceleration>();
                        (a.x, a.y, a.z)
                    };
                    let v = row.write::<Velocity>();
                    v.x += ax * dt;
                    v.y += ay * dt;
                    v.z += az * dt;
                }
            })
            .order(10)
            .parallel(2),
        );

        let advancing = Arc::new(View::new().reads::<Velocity>().writes::<Position>());
        let advance = advancing.clone();
        self.schedule.add_system(
            System::new("advance", vec![advancing], move |ctx| {
                for mut row in advance.iter_shard(ctx.world(), ctx.par_index(), ctx.par_count()) {
                    let (vx, vy, vz) = {
                        let v = row.read::<Velocity>();
                        (v.x, v.y, v.z)
                    };
                    let p = row.write::<Position>();
                    p.x += vx * dt;
                    p.y += vy * dt;
                    p.z += vz * dt;
                }
            })
            .order(20)
            .parallel(4),
        );

        // Write the new position into the matrix translation row.
        let transforming = Arc::new(View::new().reads::<Position>().writes::<Transform>());
        let transforms = transforming.clone();
        self.schedule.add_system(
            System::new("transforms", vec![transforming], move |ctx| {
                for mut row in
                    transforms.iter_shard(ctx.world(), ctx.par_index(), ctx.par_count())
                {
                    let (px, py, pz) = {
                        let p = row.read::<Position>();
                        (p.x, p.y, p.z)
                    };
                    let t = row.write::<Transform>();
                    t.matrix[3][0] = px;
                    t.matrix[3][1] = py;
                    t.matrix[3][2] = pz;
                }
            })
            .order(30)
            .parallel(4),
        );

        let bouncing = Arc::new(View::new().writes::<Position>().writes::<Velocity>());
        let bounds = bouncing.clone();
        self.schedule.add_system(
            System::new("bounds", vec![bouncing], move |ctx| {
                for mut row in bounds.iter_shard(ctx.world(), ctx.par_index(), ctx.par_count()) {
                    let (bx, by, bz) = {
                        let p = row.write::<Position>();
                        let bx = p.x.abs() > WORLD_BOUND;
                        let by = p.y.abs() > WORLD_BOUND;
                        let bz = p.z.abs() > WORLD_BOUND;
                        p.x = p.x.clamp(-WORLD_BOUND, WORLD_BOUND);
                        p.y = p.y.clamp(-WORLD_BOUND, WORLD_BOUND);
                        p.z = p.z.clamp(-WORLD_BOUND, WORLD_BOUND);
                        (bx, by, bz)
                    };
                    if bx || by || bz {
                        let v = row.write::<Velocity>();
                        if bx {
                            v.x = -v.x * BOUNCE_DAMPING;
                        }
                        if by {
                            v.y = -v.y * BOUNCE_DAMPING;
                        }
                        if bz {
                            v.z = -v.z * BOUNCE_DAMPING;
                        }
                    }
                }
            })
            .order(40)
            .parallel(2),
        );

        self.schedule.build(
            &mut self.world,
            Config {
                workers: self.config.workers,
                ..Config::default()
            },
        );
    }

    fn tick(&mut self) {
        self.schedule.run_tick(&mut self.world);
    }

    fn teardown(&mut self) {
        for entity in self.bodies.drain(..) {
            self.world.destroy_entity(entity);
        }
    }
}
