//! Game world simulation benchmark scenario.
//!
//! A mixed population across four archetypes:
//! - NPCs: Position, Velocity, Health, AiState, Team
//! - Players: Position, Velocity, Health, Team
//! - Projectiles: Position, Velocity, Lifetime, Team
//! - Static props: Position, Size
//!
//! Systems touch overlapping component sets, so the job graph has real
//! ordering edges here, unlike the single-archetype scenarios. Expired
//! projectiles are replaced one for one through the command queue.
//!
//! This scenario tests archetype dispatch with heterogeneous entities and a
//! schedule that mixes sequential edges with shardable work.

use std::sync::{Arc, Mutex};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::components::{AiState, Health, Lifetime, Position, Size, Team, Velocity};
use crate::scenarios::Scenario;
use quartz_engine::ecs::{Config, Schedule, System, View, World};

/// Knobs for the game world workload.
#[derive(Clone)]
pub struct GameWorldConfig {
    /// NPCs wandering the world.
    pub npc_count: usize,
    /// Player-controlled entities.
    pub player_count: usize,
    /// Projectiles in flight.
    pub projectile_count: usize,
    /// Inert scenery entities.
    pub static_count: usize,
    /// Seconds simulated per tick.
    pub delta_time: f32,
    /// Seed for the deterministic RNGs.
    pub seed: u64,
    /// Worker threads the schedule runs on.
    pub workers: usize,
}

impl Default for GameWorldConfig {
    fn default() -> Self {
        Self {
            npc_count: 4_000,
            player_count: 64,
            projectile_count: 1_500,
            static_count: 2_500,
            delta_time: 1.0 / 60.0,
            seed: 4242,
            workers: 8,
        }
    }
}

fn fresh_projectile(rng: &mut ChaCha8Rng) -> (Position, Velocity, Lifetime, Team) {
    (
        Position {
            x: rng.gen_range(-400.0..400.0),
            y: rng.gen_range(-400.0..400.0),
            z: rng.gen_range(0.5..8.0),
        },
        Velocity {
            x: rng.gen_range(-40.0..40.0),
            y: rng.gen_range(-40.0..40.0),
            z: 0.0,
        },
        Lifetime {
            remaining: rng.gen_range(0.5..2.5),
            total: 2.5,
        },
        Team {
            id: rng.gen_range(0..2),
        },
    )
}

/// World, schedule, and bookkeeping for the game world workload.
pub struct GameWorldScenario {
    config: GameWorldConfig,
    world: World,
    schedule: Schedule,
    census: Arc<View>,
}

impl GameWorldScenario {
    /// Scenario at the default size.
    pub fn new() -> Self {
        Self::with_config(GameWorldConfig::default())
    }

    /// Scenario with explicit knobs.
    pub fn with_config(config: GameWorldConfig) -> Self {
        Self {
            config,
            world: World::new(),
            schedule: Schedule::new(),
            census: Arc::new(View::new().with::<Position>()),
        }
    }

    /// Live entities right now, across every archetype.
    pub fn current_count(&self) -> usize {
        self.world.entity_count()
    }
}

impl Default for GameWorldScenario {
    fn default() -> Self {
        Self::new()
    }
}

impl Scenario for GameWorldScenario {
    fn entity_count(&self) -> usize {
        self.config.npc_count
            + self.config.player_count
            + self.config.projectile_count
            + self.config.static_count
    }

    fn setup(&mut self) {
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);

        self.world.spawn_many((0..self.config.npc_count).map(|_| {
            (
                Position {
                    x: rng.gen_range(-400.0..400.0),
                    y: rng.gen_range(-400.0..400.0),
                    z: 0.0,
                },
                Velocity::default(),
                Health {
                    current: 80.0,
                    max: 80.0,
                },
                AiState {
                    state: rng.gen_range(0..3),
                    timer: rng.gen_range(0.0..1.0),
                    target_x: rng.gen_range(-400.0..400.0),
                    target_y: rng.gen_range(-400.0..400.0),
                },
                Team {
                    id: rng.gen_range(0..3),
                },
            )
        }));

        self.world.spawn_many((0..self.config.player_count).map(|_| {
            (
                Position {
                    x: rng.gen_range(-80.0..80.0),
                    y: rng.gen_range(-80.0..80.0),
                    z: 0.0,
                },
                Velocity {
                    x: rng.gen_range(-4.0..4.0),
                    y: rng.gen_range(-4.0..4.0),
                    z: 0.0,
                },
                Health {
                    current: 150.0,
                    max: 150.0,
                },
                Team { id: 0 },
            )
        }));

        self.world
            .spawn_many((0..self.config.projectile_count).map(|_| fresh_projectile(&mut rng)));

        self.world.spawn_many((0..self.config.static_count).map(|_| {
            (
                Position {
                    x: rng.gen_range(-900.0..900.0),
                    y: rng.gen_range(-900.0..900.0),
                    z: 0.0,
                },
                Size {
                    width: rng.gen_range(2.0..24.0),
                    height: rng.gen_range(2.0..24.0),
                },
            )
        }));

        let dt = self.config.delta_time;

        // NPCs re-target on a one second timer, then steer toward the target.
        let thinking = Arc::new(
            View::new()
                .reads::<Position>()
                .writes::<AiState>()
                .writes::<Velocity>(),
        );
        let ai = thinking.clone();
        let ai_rng = Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(
            self.config.seed.wrapping_mul(7),
        )));
        self.schedule.add_system(
            System::new("ai", vec![thinking], move |ctx| {
                for mut row in ai.iter_shard(ctx.world(), ctx.par_index(), ctx.par_count()) {
                    let (px, py) = {
                        let p = row.read::<Position>();
                        (p.x, p.y)
                    };

                    let (tx, ty, state) = {
                        let brain = row.write::<AiState>();
                        brain.timer += dt;
                        if brain.timer >= 1.0 {
                            brain.timer = 0.0;
                            brain.state = (brain.state + 1) % 3;
                            let mut rng = ai_rng.lock().unwrap();
                            brain.target_x = px + rng.gen_range(-60.0..60.0);
                            brain.target_y = py + rng.gen_range(-60.0..60.0);
                        }
                        (brain.target_x, brain.target_y, brain.state)
                    };

                    // 0 = idle, 1 = walk, 2 = chase
                    let speed = match state {
                        0 => 0.0,
                        1 => 1.5,
                        _ => 5.0,
                    };
                    let (dx, dy) = (tx - px, ty - py);
                    let dist = (dx * dx + dy * dy).sqrt().max(0.001);
                    let v = row.write::<Velocity>();
                    v.x = dx / dist * speed;
                    v.y = dy / dist * speed;
                }
            })
            .order(10)
            .parallel(2),
        );

        // Runs after ai (both touch Velocity), shards across every archetype
        // that moves: NPCs, players, and projectiles.
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
            .order(20)
            .parallel(4),
        );

        // Only projectiles carry Lifetime; expired ones are swapped for
        // fresh spawns at the barrier so the projectile count holds.
        let expiring = Arc::new(View::new().writes::<Lifetime>());
        let expire = expiring.clone();
        let expire_rng = Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(
            self.config.seed.wrapping_mul(13),
        )));
        self.schedule.add_system(
            System::new("expire", vec![expiring], move |ctx| {
                for mut row in expire.iter(ctx.world()) {
                    let life = row.write::<Lifetime>();
                    life.remaining -= dt;
                    if life.remaining <= 0.0 {
                        ctx.commands().destroy(row.entity());
                        let mut rng = expire_rng.lock().unwrap();
                        ctx.commands().spawn(fresh_projectile(&mut rng));
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

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> GameWorldScenario {
        GameWorldScenario::with_config(GameWorldConfig {
            npc_count: 40,
            player_count: 6,
            projectile_count: 24,
            static_count: 30,
            workers: 2,
            ..Default::default()
        })
    }

    #[test]
    fn setup_spawns_every_archetype() {
        let mut scenario = tiny();

        scenario.setup();
        assert_eq!(scenario.current_count(), scenario.entity_count());
        assert_eq!(scenario.current_count(), 100);

        scenario.teardown();
        assert_eq!(scenario.current_count(), 0);
    }

    #[test]
    fn projectile_churn_keeps_population_level() {
        let mut scenario = tiny();
        scenario.setup();

        // One simulated second; the shortest-lived projectiles expire
        for _ in 0..60 {
            scenario.tick();
        }

        assert_eq!(scenario.current_count(), 100);
        scenario.teardown();
    }
}
