//! System registration, dependency analysis, and tick execution.
//!
//! A [`Schedule`] collects systems during startup, derives the conflict
//! graph from their declared component access, and then runs them tick
//! after tick over a fixed worker pool:
//!
//! ```text
//! Schedule
//!   ├── add_system(System)         collect and validate declarations
//!   ├── order_before("a", "b")     explicit hard edges
//!   ├── build(&mut world, config)  conflict graph + worker pool; the
//!   │                              component registry seals here
//!   └── run_tick(&mut world)       graph execution + command barrier
//! ```
//!
//! Building is a one-way door. The graph is derived once from the access
//! declarations known at build time, the registry stops accepting new
//! component types, and later registration attempts panic. Each tick then
//! submits the same graph with fresh in-degree counters.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut world = World::new();
//! let mut schedule = Schedule::new();
//!
//! let moving = Arc::new(View::new().writes::<Position>().reads::<Velocity>());
//! let view = Arc::clone(&moving);
//! schedule.add_system(System::new("movement", vec![moving], move |ctx| {
//!     for mut row in view.iter_shard(ctx.world(), ctx.par_index(), ctx.par_count()) {
//!         let delta = row.read::<Velocity>().clone();
//!         row.write::<Position>().advance(delta);
//!     }
//! }).parallel(4));
//!
//! schedule.build(&mut world, Config::default());
//! loop {
//!     schedule.run_tick(&mut world);
//! }
//! ```

mod dot;
mod executor;
mod graph;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::ecs::system::System;
use crate::ecs::world::{DEFAULT_CHUNK_BYTES, World};
use executor::Executor;
use graph::DependencyGraph;

/// Build-time knobs for the schedule.
#[derive(Debug, Clone)]
pub struct Config {
    /// Worker threads in the pool.
    pub workers: usize,
    /// Byte budget per storage chunk; applies to archetypes created after
    /// the build.
    pub chunk_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism()
                .map(|count| count.get())
                .unwrap_or(2),
            chunk_bytes: DEFAULT_CHUNK_BYTES,
        }
    }
}

/// The graph and pool that exist only once the schedule is built.
struct Built {
    graph: DependencyGraph,
    executor: Executor,
}

/// Registered systems plus, after [`build`](Schedule::build), the
/// dependency graph and worker pool that run them.
///
/// # Thread Safety
///
/// The schedule is owned and driven from one thread; the systems it runs
/// execute on the pool.
#[derive(Default)]
pub struct Schedule {
    systems: Vec<Arc<System>>,
    /// Explicit before/after pairs by system name, resolved at build.
    constraints: Vec<(String, String)>,
    built: Option<Built>,
}

impl Schedule {
    /// Creates an empty schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a system.
    ///
    /// # Panics
    /// Panics after [`build`](Schedule::build), on a duplicate name, and on
    /// contradictory flags: an exclusive system runs alone on the
    /// coordinating thread, so it can be neither parallel nor pinned.
    pub fn add_system(&mut self, system: System) {
        assert!(
            self.built.is_none(),
            "system '{}' added after the schedule was built",
            system.name(),
        );
        assert!(
            !self.systems.iter().any(|other| other.name() == system.name()),
            "duplicate system name '{}'",
            system.name(),
        );
        if system.is_exclusive() {
            assert!(
                system.parallel_count() == 1,
                "exclusive system '{}' cannot also be parallel",
                system.name(),
            );
            assert!(
                system.worker_affinity().is_none(),
                "exclusive system '{}' cannot be pinned to a worker",
                system.name(),
            );
        }
        self.systems.push(Arc::new(system));
    }

    /// Force `before` to complete before `after` starts, independent of
    /// any access conflict. Both names are resolved at build time.
    ///
    /// # Panics
    /// Panics after [`build`](Schedule::build).
    pub fn order_before(&mut self, before: impl Into<String>, after: impl Into<String>) {
        assert!(
            self.built.is_none(),
            "order constraint added after the schedule was built",
        );
        self.constraints.push((before.into(), after.into()));
    }

    /// Derive the dependency graph and spin up the worker pool.
    ///
    /// Resolving the registered views registers every declared component,
    /// after which the world's registry is sealed: the id space backs the
    /// conflict analysis, so types appearing later would be invisible to
    /// it. The configured chunk size applies to archetypes created from
    /// here on.
    ///
    /// # Panics
    /// Panics on a second build, on an order constraint naming an unknown
    /// system, and on any graph-level violation (cycles, exclusive-view
    /// claims, pins outside the pool).
    pub fn build(&mut self, world: &mut World, config: Config) {
        assert!(self.built.is_none(), "schedule already built");
        world.set_chunk_bytes(config.chunk_bytes);

        let graph = DependencyGraph::build(&self.systems, world.registry(), &self.constraints);
        world.registry().seal();
        let executor = Executor::new(self.systems.clone(), config.workers);
        log::info!(
            "schedule built: {} systems, {} components, {} workers",
            self.systems.len(),
            world.registry().len(),
            executor.worker_count(),
        );
        self.built = Some(Built { graph, executor });
    }

    /// Run every system once and apply the commands they queued.
    ///
    /// Systems run concurrently wherever the graph allows; deferred
    /// structural commands apply in one batch after the last system
    /// finishes, so every system in a tick sees the same world shape.
    ///
    /// # Panics
    /// Panics before [`build`](Schedule::build), and rethrows the payload
    /// of any system that panicked mid-tick.
    pub fn run_tick(&mut self, world: &mut World) {
        let Some(built) = self.built.as_mut() else {
            panic!("run_tick called before Schedule::build");
        };
        built.executor.run_tick(world, &built.graph);
        world.apply_commands();
    }

    /// The dependency graph as a DOT document.
    ///
    /// # Panics
    /// Panics before [`build`](Schedule::build).
    pub fn export_dot(&self) -> String {
        let Some(built) = self.built.as_ref() else {
            panic!("export_dot called before Schedule::build");
        };
        dot::render(&self.systems, &built.graph)
    }

    /// Write the DOT document to `jobgraph-<unix seconds>.dot` under `dir`
    /// and return the path.
    pub fn export_dot_to(&self, dir: impl AsRef<Path>) -> io::Result<PathBuf> {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let path = dir.as_ref().join(format!("jobgraph-{stamp}.dot"));
        fs::write(&path, self.export_dot())?;
        log::info!("job graph written to {}", path.display());
        Ok(path)
    }

    /// Number of registered systems.
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Whether [`build`](Schedule::build) has run.
    pub fn is_built(&self) -> bool {
        self.built.is_some()
    }

    pub(crate) fn systems(&self) -> &[Arc<System>] {
        &self.systems
    }

    /// Smoothed duration of one system's runs, `None` until it has run.
    pub fn last_duration(&self, system: usize) -> Option<Duration> {
        self.built
            .as_ref()
            .and_then(|built| built.executor.average_duration(system))
    }
}
