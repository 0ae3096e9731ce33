//! Tick execution over a fixed worker pool.
//!
//! The [`Executor`] owns the pool: one thread per worker, each holding a
//! private channel (for pinned jobs and shutdown) and a clone of the shared
//! job channel. A tick walks the dependency DAG with plain counters on the
//! coordinating thread: ready systems fan out into one job per parallel
//! shard, workers send back a completion with the elapsed time, and each
//! fully-completed system releases its successors. Exclusive systems never
//! enter the pool; the coordinator waits for in-flight jobs to drain and
//! runs them inline with a genuinely mutable world.
//!
//! A panicking system is fatal. The worker catches the unwind and ships the
//! payload back as a completion; the coordinator stops dispatching, drains
//! whatever is still in flight, and rethrows on the caller's thread.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, Sender, select, unbounded};

use crate::ecs::schedule::graph::DependencyGraph;
use crate::ecs::system::{Ctx, System};
use crate::ecs::world::World;

/// Weight of the newest sample in the per-system duration average.
const EMA_WEIGHT: f64 = 0.2;

/// A Send-safe pointer to the tick's world.
///
/// All world access during a tick is rooted in this one pointer: jobs
/// derive shared references from it, and the coordinator derives the
/// mutable reference for exclusive systems from it. The `&mut World` that
/// entered `run_tick` is never touched again until the tick ends, so the
/// derived references never alias a live mutable borrow.
#[derive(Clone, Copy)]
struct WorldPtr(NonNull<World>);

// SAFETY: WorldPtr may cross into worker threads because:
// 1. Everything behind it is Send and Sync; only the raw pointer itself
//    blocks the auto impls.
// 2. Jobs take shared references only, and systems whose declared access
//    conflicts are ordered by the dependency graph.
// 3. run_tick borrows the world for the whole tick and receives every
//    completion before returning, so the pointee outlives every copy.
unsafe impl Send for WorldPtr {}

enum Message {
    Run(Job),
    Shutdown,
}

/// One shard of one system, ready to execute.
struct Job {
    system: Arc<System>,
    world: WorldPtr,
    /// System index, echoed back in the completion.
    node: usize,
    par_index: usize,
    par_count: usize,
}

impl Job {
    fn run(&self, worker: usize) {
        // SAFETY: the coordinator holds the world for the whole tick and
        // the graph serializes every conflicting system against this one.
        let mut ctx = unsafe {
            Ctx::shared(self.world.0, self.par_index, self.par_count, Some(worker))
        };
        self.system.run(&mut ctx);
    }
}

struct Completion {
    node: usize,
    elapsed: Duration,
    panic: Option<Box<dyn std::any::Any + Send>>,
}

struct Worker {
    id: usize,
    handle: Option<thread::JoinHandle<()>>,
}

impl Worker {
    fn new(
        id: usize,
        private: Receiver<Message>,
        shared: Receiver<Message>,
        done: Sender<Completion>,
    ) -> Self {
        let handle = thread::spawn(move || {
            loop {
                let message = select! {
                    recv(private) -> message => message,
                    recv(shared) -> message => message,
                };
                match message {
                    Ok(Message::Run(job)) => {
                        let node = job.node;
                        let started = Instant::now();
                        // Catch the unwind so a failing system surfaces on
                        // the coordinator instead of stranding the tick.
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| job.run(id)));
                        let completion = Completion {
                            node,
                            elapsed: started.elapsed(),
                            panic: outcome.err(),
                        };
                        if done.send(completion).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Shutdown) | Err(_) => break,
                }
            }
        });

        Worker {
            id,
            handle: Some(handle),
        }
    }
}

/// The worker pool plus everything needed to run built systems as ticks.
pub(crate) struct Executor {
    systems: Vec<Arc<System>>,
    workers: Vec<Worker>,
    /// Shared job channel; any idle worker picks these up.
    shared: Sender<Message>,
    /// One private channel per worker, for pinned jobs and shutdown.
    private: Vec<Sender<Message>>,
    done_rx: Receiver<Completion>,
    /// Smoothed run duration per system, fed by completions.
    ema: Vec<Option<Duration>>,
}

impl Executor {
    /// Spin up `workers` threads for the given systems.
    ///
    /// # Panics
    /// Panics when `workers` is zero or a system is pinned to a worker the
    /// pool does not have.
    pub(crate) fn new(systems: Vec<Arc<System>>, workers: usize) -> Self {
        assert!(workers > 0, "worker pool requires at least one thread");
        for system in &systems {
            if let Some(worker) = system.worker_affinity() {
                assert!(
                    worker < workers,
                    "system '{}' is pinned to worker {worker} but the pool has {workers}",
                    system.name(),
                );
            }
        }

        let (shared_tx, shared_rx) = unbounded();
        let (done_tx, done_rx) = unbounded();
        let mut private = Vec::with_capacity(workers);
        let mut pool = Vec::with_capacity(workers);
        for id in 0..workers {
            let (private_tx, private_rx) = unbounded();
            pool.push(Worker::new(
                id,
                private_rx,
                shared_rx.clone(),
                done_tx.clone(),
            ));
            private.push(private_tx);
        }
        log::debug!("executor online: {} systems, {workers} workers", systems.len());

        let ema = vec![None; systems.len()];
        Self {
            systems,
            workers: pool,
            shared: shared_tx,
            private,
            done_rx,
            ema,
        }
    }

    /// Run every system once, honoring the graph's edges.
    ///
    /// Shards of a parallel system are submitted together and the system
    /// counts as complete when the last shard reports in. An exclusive
    /// system at the head of the ready queue quiesces the pool: in-flight
    /// jobs drain, the system runs inline on this thread with `&mut World`,
    /// and dispatch resumes behind it.
    pub(crate) fn run_tick(&mut self, world: &mut World, graph: &DependencyGraph) {
        let total = self.systems.len();
        let world = WorldPtr(NonNull::from(world));
        let mut pending = graph.indegree().to_vec();
        let mut shards_left: Vec<usize> = self
            .systems
            .iter()
            .map(|system| system.parallel_count())
            .collect();
        let mut ready: VecDeque<usize> = graph.roots().collect();
        let mut in_flight = 0usize;
        let mut done = 0usize;
        let mut failure: Option<Box<dyn std::any::Any + Send>> = None;

        loop {
            while failure.is_none() {
                let Some(&index) = ready.front() else { break };
                let system = Arc::clone(&self.systems[index]);
                if system.is_exclusive() {
                    if in_flight > 0 {
                        // Later arrivals wait behind the barrier.
                        break;
                    }
                    ready.pop_front();
                    let started = Instant::now();
                    // SAFETY: nothing is in flight, so this is the only
                    // live reference derived from the tick's pointer.
                    let mut ctx = Ctx::exclusive(unsafe { &mut *world.0.as_ptr() });
                    system.run(&mut ctx);
                    self.record(index, started.elapsed());
                    done += 1;
                    release(graph, index, &mut pending, &mut ready);
                    continue;
                }

                ready.pop_front();
                let count = system.parallel_count();
                for shard in 0..count {
                    let job = Job {
                        system: Arc::clone(&system),
                        world,
                        node: index,
                        par_index: shard,
                        par_count: count,
                    };
                    match system.worker_affinity() {
                        Some(worker) => self.private[worker].send(Message::Run(job)).unwrap(),
                        None => self.shared.send(Message::Run(job)).unwrap(),
                    }
                    in_flight += 1;
                }
            }

            if done == total {
                break;
            }
            if in_flight == 0 {
                // Only a failure stops dispatch with work left; the graph
                // was verified acyclic at build.
                debug_assert!(failure.is_some(), "job graph stalled with systems remaining");
                break;
            }

            let completion = self.done_rx.recv().unwrap();
            in_flight -= 1;
            if let Some(payload) = completion.panic {
                failure.get_or_insert(payload);
                continue;
            }
            self.record(completion.node, completion.elapsed);
            shards_left[completion.node] -= 1;
            if shards_left[completion.node] == 0 {
                done += 1;
                release(graph, completion.node, &mut pending, &mut ready);
            }
        }

        if let Some(payload) = failure {
            panic::resume_unwind(payload);
        }
    }

    /// Smoothed run duration for one system, `None` before its first run.
    pub(crate) fn average_duration(&self, system: usize) -> Option<Duration> {
        self.ema[system]
    }

    pub(crate) fn worker_count(&self) -> usize {
        self.workers.len()
    }

    fn record(&mut self, system: usize, sample: Duration) {
        let entry = &mut self.ema[system];
        *entry = Some(match *entry {
            None => sample,
            Some(previous) => {
                let smoothed = previous.as_secs_f64() * (1.0 - EMA_WEIGHT)
                    + sample.as_secs_f64() * EMA_WEIGHT;
                Duration::from_secs_f64(smoothed)
            }
        });
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        for private in &self.private {
            // A worker that already exited has no receiver left.
            let _ = private.send(Message::Shutdown);
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
                log::trace!("worker {} stopped", worker.id);
            }
        }
    }
}

/// Mark `system` complete and queue any successor whose predecessors are
/// all done.
fn release(
    graph: &DependencyGraph,
    system: usize,
    pending: &mut [usize],
    ready: &mut VecDeque<usize>,
) {
    for &next in graph.successors(system) {
        pending[next] -= 1;
        if pending[next] == 0 {
            ready.push_back(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::Component;
    use crate::ecs::view::View;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Position {
        x: f32,
    }
    impl Component for Position {}

    struct Velocity {
        dx: f32,
    }
    impl Component for Velocity {}

    fn build(systems: Vec<Arc<System>>, workers: usize) -> (Executor, DependencyGraph, World) {
        let world = World::new();
        let graph = DependencyGraph::build(&systems, world.registry(), &[]);
        (Executor::new(systems, workers), graph, world)
    }

    #[test]
    fn every_system_runs_exactly_once_per_tick() {
        // Given - three independent systems counting their runs
        let runs = Arc::new(AtomicUsize::new(0));
        let systems: Vec<Arc<System>> = ["a", "b", "c"]
            .iter()
            .map(|name| {
                let runs = Arc::clone(&runs);
                Arc::new(System::new(*name, Vec::new(), move |_ctx| {
                    runs.fetch_add(1, Ordering::Relaxed);
                }))
            })
            .collect();
        let (mut executor, graph, mut world) = build(systems, 2);

        // When
        executor.run_tick(&mut world, &graph);
        executor.run_tick(&mut world, &graph);

        // Then
        assert_eq!(runs.load(Ordering::Relaxed), 6);
    }

    #[test]
    fn conflicting_systems_run_in_graph_order() {
        // Given - a writer and a reader of the same component
        let order = Arc::new(Mutex::new(Vec::new()));
        let view = Arc::new(View::new().writes::<Position>());
        let write_log = Arc::clone(&order);
        let writer = Arc::new(System::new(
            "writer",
            vec![Arc::clone(&view)],
            move |_ctx| write_log.lock().unwrap().push("writer"),
        ));
        let read_view = Arc::new(View::new().reads::<Position>());
        let read_log = Arc::clone(&order);
        let reader = Arc::new(System::new(
            "reader",
            vec![read_view],
            move |_ctx| read_log.lock().unwrap().push("reader"),
        ));
        let (mut executor, graph, mut world) = build(vec![writer, reader], 4);

        // When
        executor.run_tick(&mut world, &graph);

        // Then - registration order decided the edge
        assert_eq!(*order.lock().unwrap(), vec!["writer", "reader"]);
    }

    #[test]
    fn parallel_shards_all_run_with_distinct_indices() {
        // Given
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let sharded = Arc::new(
            System::new("sharded", Vec::new(), move |ctx| {
                log.lock().unwrap().push((ctx.par_index(), ctx.par_count()));
            })
            .parallel(4),
        );
        let (mut executor, graph, mut world) = build(vec![sharded], 4);

        // When
        executor.run_tick(&mut world, &graph);

        // Then - four shards, indices 0..4, all reporting the same count
        let mut runs = seen.lock().unwrap().clone();
        runs.sort_unstable();
        assert_eq!(runs, vec![(0, 4), (1, 4), (2, 4), (3, 4)]);
    }

    #[test]
    fn shards_release_successors_only_when_all_complete() {
        // Given - a sharded writer feeding a reader
        let order = Arc::new(Mutex::new(Vec::new()));
        let write_view = Arc::new(View::new().writes::<Position>());
        let write_log = Arc::clone(&order);
        let writer = Arc::new(
            System::new("writer", vec![write_view], move |_ctx| {
                write_log.lock().unwrap().push("writer");
            })
            .parallel(3),
        );
        let read_view = Arc::new(View::new().reads::<Position>());
        let read_log = Arc::clone(&order);
        let reader = Arc::new(System::new("reader", vec![read_view], move |_ctx| {
            read_log.lock().unwrap().push("reader");
        }));
        let (mut executor, graph, mut world) = build(vec![writer, reader], 2);

        // When
        executor.run_tick(&mut world, &graph);

        // Then - every writer shard finished before the reader started
        assert_eq!(
            *order.lock().unwrap(),
            vec!["writer", "writer", "writer", "reader"],
        );
    }

    #[test]
    fn exclusive_systems_take_the_world_mutably() {
        // Given - an exclusive system spawning directly
        let spawner = Arc::new(
            System::new("spawner", Vec::new(), |ctx: &mut Ctx<'_>| {
                ctx.world_mut().spawn(Position { x: 1.0 });
            })
            .exclusive(),
        );
        let (mut executor, graph, mut world) = build(vec![spawner], 2);

        // When
        executor.run_tick(&mut world, &graph);

        // Then
        assert_eq!(world.storage().entity_count(), 1);
    }

    #[test]
    fn exclusive_runs_between_its_neighbors() {
        // Given - writer, then an exclusive barrier, then reader
        let order = Arc::new(Mutex::new(Vec::new()));
        let log = |tag: &'static str, order: &Arc<Mutex<Vec<&'static str>>>| {
            let order = Arc::clone(order);
            move |_ctx: &mut Ctx<'_>| order.lock().unwrap().push(tag)
        };
        let view = Arc::new(View::new().writes::<Velocity>());
        let writer = Arc::new(System::new(
            "writer",
            vec![Arc::clone(&view)],
            log("writer", &order),
        ));
        let barrier = Arc::new(System::new("barrier", Vec::new(), log("barrier", &order)).exclusive());
        let read_view = Arc::new(View::new().reads::<Velocity>());
        let reader = Arc::new(System::new("reader", vec![read_view], log("reader", &order)));
        let (mut executor, graph, mut world) = build(vec![writer, barrier, reader], 4);

        // When
        executor.run_tick(&mut world, &graph);

        // Then
        assert_eq!(
            *order.lock().unwrap(),
            vec!["writer", "barrier", "reader"],
        );
    }

    #[test]
    fn pinned_systems_land_on_their_worker() {
        // Given - three shards pinned to worker zero
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let pinned = Arc::new(
            System::new("pinned", Vec::new(), move |ctx| {
                log.lock().unwrap().push(ctx.worker());
            })
            .parallel(3)
            .affinity(0),
        );
        let (mut executor, graph, mut world) = build(vec![pinned], 4);

        // When
        executor.run_tick(&mut world, &graph);

        // Then
        assert_eq!(*seen.lock().unwrap(), vec![Some(0), Some(0), Some(0)]);
    }

    #[test]
    #[should_panic(expected = "pinned to worker 5 but the pool has 2")]
    fn pinning_past_the_pool_panics() {
        // Given
        let stray = Arc::new(System::new("stray", Vec::new(), |_ctx| {}).affinity(5));

        // When
        let _ = Executor::new(vec![stray], 2);
    }

    #[test]
    #[should_panic(expected = "system failed mid-tick")]
    fn a_panicking_system_fails_the_tick() {
        // Given
        let faulty = Arc::new(System::new("faulty", Vec::new(), |_ctx| {
            panic!("system failed mid-tick");
        }));
        let steady = Arc::new(System::new("steady", Vec::new(), |_ctx| {}));
        let (mut executor, graph, mut world) = build(vec![faulty, steady], 2);

        // When - the payload resurfaces on the calling thread
        executor.run_tick(&mut world, &graph);
    }

    #[test]
    fn durations_are_tracked_after_a_run() {
        // Given
        let idle = Arc::new(System::new("idle", Vec::new(), |_ctx| {}));
        let (mut executor, graph, mut world) = build(vec![idle], 1);
        assert!(executor.average_duration(0).is_none());

        // When
        executor.run_tick(&mut world, &graph);

        // Then
        assert!(executor.average_duration(0).is_some());
    }

    #[test]
    fn systems_mutate_components_through_views() {
        // Given - 32 entities moved by a sharded system
        let mut world = World::new();
        for index in 0..32 {
            world.spawn((
                Position { x: index as f32 },
                Velocity { dx: 1.0 },
            ));
        }
        let view = Arc::new(View::new().writes::<Position>().reads::<Velocity>());
        let body_view = Arc::clone(&view);
        let movement = Arc::new(
            System::new("movement", vec![view], move |ctx: &mut Ctx<'_>| {
                for mut row in body_view.iter_shard(ctx.world(), ctx.par_index(), ctx.par_count())
                {
                    let dx = row.read::<Velocity>().dx;
                    row.write::<Position>().x += dx;
                }
            })
            .parallel(4),
        );
        let graph = DependencyGraph::build(
            &[Arc::clone(&movement)],
            world.registry(),
            &[],
        );
        let mut executor = Executor::new(vec![movement], 4);

        // When
        executor.run_tick(&mut world, &graph);

        // Then - every entity advanced exactly once
        let check = View::new().reads::<Position>();
        let mut seen: Vec<f32> = check
            .iter(&world)
            .map(|row| row.read::<Position>().x)
            .collect();
        seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let expected: Vec<f32> = (0..32).map(|index| index as f32 + 1.0).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn workers_shut_down_cleanly_on_drop() {
        // Given
        let idle = Arc::new(System::new("idle", Vec::new(), |_ctx| {}));
        let (mut executor, graph, mut world) = build(vec![idle], 3);
        executor.run_tick(&mut world, &graph);

        // When - drop joins every worker
        drop(executor);
    }
}
