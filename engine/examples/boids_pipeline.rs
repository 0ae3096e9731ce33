use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use quartz_engine::ecs::{Config, Schedule, System, View, World, diagnostics};
use quartz_macros::Component;

const SEED_COUNT: usize = 40;
const POPULATION: usize = 150;
const SPAWN_PER_TICK: usize = 2;
const TICKS: u64 = 400;

const WORLD_SIZE: f32 = 100.0;
const DT: f32 = 1.0 / 60.0;
const MAX_SPEED: f32 = 12.0;
const VIEW_RADIUS: f32 = 8.0;
const CROWD_RADIUS: f32 = 2.5;

const COHESION: f32 = 0.6;
const ALIGNMENT: f32 = 0.9;
const SEPARATION: f32 = 1.8;

const CENSUS_EVERY: u64 = 60;
const SPARK_TTL: u32 = 120;

#[derive(Component)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Component)]
struct Velocity {
    dx: f32,
    dy: f32,
}

#[derive(Component)]
struct Steering {
    dx: f32,
    dy: f32,
}

/// Sparks mark where the flock's center was; they age out after a while.
#[derive(Component)]
struct Age {
    ticks: u32,
}

/// Deterministic placement on spiraling rings; no RNG needed for a demo.
fn seed_boid(i: usize) -> (Position, Velocity, Steering) {
    let angle = i as f32 * 2.399_963; // golden angle
    let radius = 5.0 + (i % 7) as f32 * 3.0;
    (
        Position {
            x: WORLD_SIZE / 2.0 + angle.cos() * radius,
            y: WORLD_SIZE / 2.0 + angle.sin() * radius,
        },
        Velocity {
            dx: -angle.sin() * 4.0,
            dy: angle.cos() * 4.0,
        },
        Steering { dx: 0.0, dy: 0.0 },
    )
}

fn main() {
    println!("=============================================================");
    println!("Boids on the job graph");
    println!("=============================================================");

    let mut world = World::new();
    world.spawn_many((0..SEED_COUNT).map(seed_boid));

    // The flock view writes Steering; the neighbor view is the same data
    // read-only, so the O(n^2) scan inside `steer` stays a reader.
    let flock = Arc::new(
        View::new()
            .reads::<Position>()
            .reads::<Velocity>()
            .writes::<Steering>(),
    );
    let neighbors = Arc::new(View::new().reads::<Position>().reads::<Velocity>());
    let movers = Arc::new(
        View::new()
            .reads::<Steering>()
            .writes::<Position>()
            .writes::<Velocity>(),
    );
    let in_bounds = Arc::new(View::new().writes::<Position>().with::<Velocity>());
    let boid_census = Arc::new(View::new().with::<Position>().with::<Velocity>());
    let sparks = Arc::new(View::new().reads::<Age>());
    let aging = Arc::new(View::new().writes::<Age>());

    let mut schedule = Schedule::new();

    // Top the population up a couple of boids per tick; the spawns land at
    // the end-of-tick barrier.
    let spawn_count = boid_census.clone();
    schedule.add_system(
        System::new("spawner", vec![boid_census.clone()], move |ctx| {
            let count = spawn_count.iter(ctx.world()).count();
            for i in 0..SPAWN_PER_TICK.min(POPULATION.saturating_sub(count)) {
                ctx.commands().spawn(seed_boid(count + i));
            }
        })
        .order(5),
    );

    let steer_flock = flock.clone();
    let steer_near = neighbors.clone();
    schedule.add_system(
        System::new("steer", vec![flock.clone(), neighbors.clone()], move |ctx| {
            for mut row in
                steer_flock.iter_shard(ctx.world(), ctx.par_index(), ctx.par_count())
            {
                let me = row.entity();
                let (px, py) = {
                    let p = row.read::<Position>();
                    (p.x, p.y)
                };
                let (vx, vy) = {
                    let v = row.read::<Velocity>();
                    (v.dx, v.dy)
                };

                let mut center = (0.0f32, 0.0f32);
                let mut heading = (0.0f32, 0.0f32);
                let mut push = (0.0f32, 0.0f32);
                let mut seen = 0.0f32;
                for other in steer_near.iter(ctx.world()) {
                    if other.entity() == me {
                        continue;
                    }
                    let op = other.read::<Position>();
                    let (dx, dy) = (op.x - px, op.y - py);
                    let dist = (dx * dx + dy * dy).sqrt();
                    if dist > VIEW_RADIUS {
                        continue;
                    }
                    let ov = other.read::<Velocity>();
                    center.0 += op.x;
                    center.1 += op.y;
                    heading.0 += ov.dx;
                    heading.1 += ov.dy;
                    seen += 1.0;
                    if dist < CROWD_RADIUS && dist > f32::EPSILON {
                        push.0 -= dx / dist;
                        push.1 -= dy / dist;
                    }
                }

                let steering = row.write::<Steering>();
                if seen > 0.0 {
                    steering.dx = (center.0 / seen - px) * COHESION
                        + (heading.0 / seen - vx) * ALIGNMENT
                        + push.0 * SEPARATION;
                    steering.dy = (center.1 / seen - py) * COHESION
                        + (heading.1 / seen - vy) * ALIGNMENT
                        + push.1 * SEPARATION;
                } else {
                    steering.dx = 0.0;
                    steering.dy = 0.0;
                }
            }
        })
        .order(10)
        .parallel(4),
    );

    let integrate = movers.clone();
    schedule.add_system(
        System::new("integrate", vec![movers.clone()], move |ctx| {
            for mut row in integrate.iter_shard(ctx.world(), ctx.par_index(), ctx.par_count())
            {
                let (sx, sy) = {
                    let s = row.read::<Steering>();
                    (s.dx, s.dy)
                };
                let (dx, dy) = {
                    let v = row.write::<Velocity>();
                    v.dx += sx * DT;
                    v.dy += sy * DT;
                    let speed = (v.dx * v.dx + v.dy * v.dy).sqrt();
                    if speed > MAX_SPEED {
                        let scale = MAX_SPEED / speed;
                        v.dx *= scale;
                        v.dy *= scale;
                    }
                    (v.dx, v.dy)
                };
                let p = row.write::<Position>();
                p.x += dx * DT;
                p.y += dy * DT;
            }
        })
        .order(20)
        .parallel(2),
    );

    let wrap = in_bounds.clone();
    schedule.add_system(
        System::new("wrap", vec![in_bounds.clone()], move |ctx| {
            for mut row in wrap.iter(ctx.world()) {
                let p = row.write::<Position>();
                p.x = p.x.rem_euclid(WORLD_SIZE);
                p.y = p.y.rem_euclid(WORLD_SIZE);
            }
        })
        .order(30),
    );

    // Disjoint from the boid pipeline, so it runs alongside `wrap`.
    let age_view = aging.clone();
    schedule.add_system(
        System::new("age", vec![aging.clone()], move |ctx| {
            for mut row in age_view.iter(ctx.world()) {
                row.write::<Age>().ticks += 1;
            }
        })
        .order(30),
    );

    // Every CENSUS_EVERY ticks: report the flock, drop a spark at its
    // center of mass, and clear expired sparks. Structural changes need
    // the world mutably, so this one is exclusive.
    let ticks = Arc::new(AtomicU64::new(0));
    let census_ticks = ticks.clone();
    let census_boids = neighbors.clone();
    let census_sparks = sparks.clone();
    schedule.add_system(
        System::new("census", vec![neighbors.clone(), sparks.clone()], move |ctx| {
            let tick = census_ticks.fetch_add(1, Ordering::Relaxed) + 1;
            if tick % CENSUS_EVERY != 0 {
                return;
            }

            let mut sum = (0.0f32, 0.0f32);
            let mut speed = 0.0f32;
            let mut boids = 0usize;
            for row in census_boids.iter(ctx.world()) {
                let p = row.read::<Position>();
                let v = row.read::<Velocity>();
                sum.0 += p.x;
                sum.1 += p.y;
                speed += (v.dx * v.dx + v.dy * v.dy).sqrt();
                boids += 1;
            }

            let expired: Vec<_> = census_sparks
                .iter(ctx.world())
                .filter(|row| row.read::<Age>().ticks > SPARK_TTL)
                .map(|row| row.entity())
                .collect();
            let spark_count = census_sparks.iter(ctx.world()).count();

            let world = ctx.world_mut();
            for entity in &expired {
                world.destroy_entity(*entity);
            }
            if boids > 0 {
                world.spawn((
                    Position {
                        x: sum.0 / boids as f32,
                        y: sum.1 / boids as f32,
                    },
                    Age { ticks: 0 },
                ));
            }

            println!(
                "tick {tick:4}: {boids} boids, mean speed {:.1}, {spark_count} sparks ({} expired)",
                speed / boids.max(1) as f32,
                expired.len(),
            );
        })
        .exclusive()
        .order(40),
    );

    schedule.build(&mut world, Config { workers: 4, ..Config::default() });

    println!("\nJob graph:\n{}", schedule.export_dot());

    for _ in 0..TICKS {
        schedule.run_tick(&mut world);
    }

    println!("\nComponents:");
    for row in diagnostics::component_rows(&world) {
        println!(
            "  {:<60} {:>2} B align {}  {} entities across {} archetypes",
            row.name, row.size, row.align, row.entity_count, row.archetype_count
        );
    }

    println!("Archetypes:");
    for row in diagnostics::archetype_rows(&world) {
        println!(
            "  {:?}: {} entities, {} chunks of {} rows, {} B",
            row.id, row.entity_count, row.chunk_count, row.entities_per_chunk, row.byte_size
        );
    }

    println!("Views:");
    for row in diagnostics::view_rows(&schedule, &world) {
        println!(
            "  {}[{}]: {} entities in {} chunks",
            row.system, row.index, row.entity_count, row.chunk_count
        );
    }

    println!("Systems:");
    for row in diagnostics::system_rows(&schedule) {
        println!(
            "  {:<10} order {:>2}  x{}  {}  avg {:?}",
            row.name,
            row.defined_order,
            row.parallel_count,
            if row.exclusive { "exclusive" } else { "         " },
            row.last_duration
        );
    }
}
