//! End-to-end scenario benchmarks.
//!
//! Each scenario builds a world and a schedule once, then measures
//! steady-state ticks: graph dispatch, parallel sharding, and the command
//! barrier are all inside the measured region. The `tick_times` group
//! reports wall-clock totals over long runs for spotting tail latency.
//!
//! Run with: `cargo bench --bench ecs_scenarios`

use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use quartz_bench::scenarios::{
    GameWorldConfig, GameWorldScenario, ParticleConfig, ParticleScenario, PhysicsConfig,
    PhysicsScenario, Scenario,
};
use quartz_bench::tick_timer::measure_ticks;

// =============================================================================
// Particles
// =============================================================================

fn bench_particles(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenario/particles");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(5));

    for count in [15_000, 60_000, 120_000] {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_function(BenchmarkId::new("tick", count), |b| {
            let mut scenario = ParticleScenario::with_config(ParticleConfig {
                particle_count: count,
                ..Default::default()
            });
            scenario.setup();

            b.iter(|| scenario.tick());

            scenario.teardown();
        });
    }

    group.finish();
}

// =============================================================================
// Game world
// =============================================================================

fn game_world_configs() -> [(&'static str, GameWorldConfig); 3] {
    [
        (
            "village",
            GameWorldConfig {
                npc_count: 800,
                player_count: 16,
                projectile_count: 300,
                static_count: 500,
                workers: 4,
                ..Default::default()
            },
        ),
        ("town", GameWorldConfig::default()),
        (
            "city",
            GameWorldConfig {
                npc_count: 16_000,
                player_count: 256,
                projectile_count: 6_000,
                static_count: 10_000,
                ..Default::default()
            },
        ),
    ]
}

fn bench_game_world(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenario/game_world");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(5));

    for (label, config) in game_world_configs() {
        let total =
            config.npc_count + config.player_count + config.projectile_count + config.static_count;
        group.throughput(Throughput::Elements(total as u64));

        group.bench_function(BenchmarkId::new("tick", label), |b| {
            let mut scenario = GameWorldScenario::with_config(config.clone());
            scenario.setup();

            b.iter(|| scenario.tick());

            scenario.teardown();
        });
    }

    group.finish();
}

// =============================================================================
// Physics
// =============================================================================

fn bench_physics(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenario/physics");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(5));

    for count in [8_000, 20_000, 40_000] {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_function(BenchmarkId::new("step", count), |b| {
            let mut scenario = PhysicsScenario::with_config(PhysicsConfig {
                body_count: count,
                ..Default::default()
            });
            scenario.setup();

            b.iter(|| scenario.tick());

            scenario.teardown();
        });
    }

    group.finish();
}

// =============================================================================
// Tick time distribution
// =============================================================================

/// Wall-clock totals over a long steady-state run. Criterion reports the
/// mean; rerun with `TickTimer` directly when the percentiles matter.
fn bench_tick_times(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_times");
    group.sample_size(20);

    group.bench_function("particles_60k", |b| {
        b.iter_custom(|iters| {
            let mut scenario = ParticleScenario::with_config(ParticleConfig {
                particle_count: 60_000,
                ..Default::default()
            });
            scenario.setup();

            let stats = measure_ticks(iters as usize, |_| scenario.tick());

            scenario.teardown();
            stats.total_duration
        });
    });

    group.bench_function("physics_20k", |b| {
        b.iter_custom(|iters| {
            let mut scenario = PhysicsScenario::with_config(PhysicsConfig {
                body_count: 20_000,
                ..Default::default()
            });
            scenario.setup();

            let stats = measure_ticks(iters as usize, |_| scenario.tick());

            scenario.teardown();
            stats.total_duration
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_particles,
    bench_game_world,
    bench_physics,
    bench_tick_times
);
criterion_main!(benches);
