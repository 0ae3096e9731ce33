//! Particle pool workload.
//!
//! One wide archetype (Position, Velocity, Lifetime, Color, Size plus the
//! `Particle` tag) and four systems: integrate, decay, fade, respawn. Dead
//! particles are destroyed and replaced through the command queue every
//! tick, so the end-of-tick barrier always has structural work.
//!
//! Stresses: iteration over a huge single archetype, shard fan-out, and
//! spawn/destroy throughput at the barrier.

use std::sync::{Arc, Mutex};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::components::{Color, Lifetime, Particle, Position, Size, Velocity};
use crate::scenarios::Scenario;
use quartz_engine::ecs::{Config, Schedule, System, View, World};

/// Knobs for the particle workload.
#[derive(Clone)]
pub struct ParticleConfig {
    /// Particles to keep alive.
    pub particle_count: usize,
    /// Seconds simulated per tick.
    pub delta_time: f32,
    /// Seed for the deterministic RNGs.
    pub seed: u64,
    /// Worker threads the schedule runs on.
    pub workers: usize,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            particle_count: 100_000,
            delta_time: 1.0 / 60.0,
            seed: 1717,
            workers: 4,
        }
    }
}

fn fresh_particle(rng: &mut ChaCha8Rng) -> (Particle, Position, Velocity, Lifetime, Color, Size) {
    (
        Particle,
        Position {
            x: rng.gen_range(-64.0..64.0),
            y: rng.gen_range(-64.0..64.0),
            z: rng.gen_range(-64.0..64.0),
        },
        Velocity {
            x: rng.gen_range(-6.0..6.0),
            y: rng.gen_range(-6.0..6.0),
            z: rng.gen_range(-6.0..6.0),
        },
        Lifetime {
            remaining: rng.gen_range(0.8..4.0),
            total: 4.0,
        },
        Color {
            r: rng.gen_range(0.2..1.0),
            g: rng.gen_range(0.2..1.0),
            b: rng.gen_range(0.2..1.0),
            a: 1.0,
        },
        Size {
            width: rng.gen_range(0.5..3.0),
            height: rng.gen_range(0.5..3.0),
        },
    )
}

/// World, schedule, and bookkeeping for the particle workload.
pub struct ParticleScenario {
    config: ParticleConfig,
    world: World,
    schedule: Schedule,
    census: Arc<View>,
}

impl ParticleScenario {
    /// Scenario at the default size.
    pub fn new() -> Self {
        Self::with_config(ParticleConfig::default())
    }

    /// Scenario with explicit knobs.
    pub fn with_config(config: ParticleConfig) -> Self {
        Self {
            config,
            world: World::new(),
            schedule: Schedule::new(),
            census: Arc::new(View::new().with::<Particle>()),
        }
    }

    /// Live particles right now.
    pub fn current_count(&self) -> usize {
        self.world.entity_count()
    }
}

impl Default for ParticleScenario {
    fn default() -> Self {
        Self::new()
    }
}

impl Scenario for ParticleScenario {
    fn entity_count(&self) -> usize {
        self.config.particle_count
    }

    fn setup(&mut self) {
        let mut seed_rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        self.world
            .spawn_many((0..self.config.particle_count).map(|_| fresh_particle(&mut seed_rng)));

        let dt = self.config.delta_time;

        let moving = Arc::new(View::new().writes::<Position>().reads::<Velocity>());
        let movement = moving.clone();
        self.schedule.add_system(
            System::new("movement", vec![moving], move |ctx| {
                for mut row in movement.iter_shard(ctx.world(), ctx.par_index(), ctx.par_count())
                {
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
            .order(10)
            .parallel(4),
        );

        // Disjoint from movement, so the two run concurrently.
        let decaying = Arc::new(View::new().writes::<Lifetime>());
        let decay = decaying.clone();
        self.schedule.add_system(
            System::new("decay", vec![decaying], move |ctx| {
                for mut row in decay.iter_shard(ctx.world(), ctx.par_index(), ctx.par_count()) {
                    row.write::<Lifetime>().remaining -= dt;
                }
            })
            .order(10)
            .parallel(2),
        );

        let fading = Arc::new(View::new().reads::<Lifetime>().writes::<Color>());
        let fade = fading.clone();
        self.schedule.add_system(
            System::new("fade", vec![fading], move |ctx| {
                for mut row in fade.iter_shard(ctx.world(), ctx.par_index(), ctx.par_count()) {
                    let fraction = {
                        let life = row.read::<Lifetime>();
                        (life.remaining / life.total).max(0.0)
                    };
                    row.write::<Color>().a = fraction;
                }
            })
            .order(20)
            .parallel(2),
        );

        // Dead particles are swapped for fresh spawns one for one; both
        // changes land at the end-of-tick barrier.
        let dying = Arc::new(View::new().reads::<Lifetime>());
        let respawn = dying.clone();
        let respawn_rng = Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(
            self.config.seed.wrapping_mul(31),
        )));
        self.schedule.add_system(
            System::new("respawn", vec![dying], move |ctx| {
                for row in respawn.iter(ctx.world()) {
                    if row.read::<Lifetime>().remaining <= 0.0 {
                        ctx.commands().destroy(row.entity());
                        let mut rng = respawn_rng.lock().unwrap();
                        ctx.commands().spawn(fresh_particle(&mut rng));
                    }
                }
            })
            .order(30),
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
        let doomed: Vec<_> = self
            .census
            .iter(&self.world)
            .map(|row| row.entity())
            .collect();
        for entity in doomed {
            self.world.destroy_entity(entity);
        }
    }
}
