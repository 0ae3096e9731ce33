//! Per-task execution context handed to system bodies.

use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::ecs::action::Commands;
use crate::ecs::world::World;

/// What a system body sees while it runs.
///
/// A `Ctx` carries the world, the task's shard coordinates, and the worker
/// it landed on. Component access goes through views
/// ([`View::iter`](crate::ecs::view::View::iter) and friends take the
/// world reference from [`world`](Ctx::world)); structural changes go
/// through [`commands`](Ctx::commands) and apply at the end-of-tick
/// barrier. Only exclusive systems, which run with the worker pool
/// drained, may take the world mutably.
pub struct Ctx<'t> {
    world: NonNull<World>,
    par_index: usize,
    par_count: usize,
    worker: Option<usize>,
    exclusive: bool,
    _world: PhantomData<&'t mut World>,
}

impl<'t> Ctx<'t> {
    /// Context for a shard running concurrently with other systems.
    ///
    /// # Safety
    /// The caller must ensure `world` stays valid and unmoved for the
    /// context's lifetime, and that every system whose declared access
    /// conflicts with this one is serialized against it. The job graph
    /// provides both: the tick holds the world borrow until the final
    /// latch, and conflicting nodes share an edge.
    pub(crate) unsafe fn shared(
        world: NonNull<World>,
        par_index: usize,
        par_count: usize,
        worker: Option<usize>,
    ) -> Self {
        Self {
            world,
            par_index,
            par_count,
            worker,
            exclusive: false,
            _world: PhantomData,
        }
    }

    /// Context for an exclusive system, built from a genuine mutable
    /// borrow. Nothing else runs while it exists.
    pub(crate) fn exclusive(world: &'t mut World) -> Self {
        Self {
            world: NonNull::from(world),
            par_index: 0,
            par_count: 1,
            worker: None,
            exclusive: true,
            _world: PhantomData,
        }
    }

    /// The world, for view iteration and reads.
    #[inline]
    pub fn world(&self) -> &World {
        // SAFETY: the pointer is valid for the context's lifetime and
        // conflicting writers are serialized by the schedule (see the
        // constructors' contracts).
        unsafe { self.world.as_ref() }
    }

    /// The world, mutably. Available only inside exclusive systems.
    ///
    /// # Panics
    /// Panics when called from a non-exclusive system: concurrent shards
    /// may be running, so handing out `&mut World` would be unsound.
    #[inline]
    pub fn world_mut(&mut self) -> &mut World {
        assert!(
            self.exclusive,
            "mutable world access requires an exclusive system; use commands instead",
        );
        // SAFETY: exclusive contexts are built from a real `&mut World`
        // and run with the worker pool drained.
        unsafe { self.world.as_mut() }
    }

    /// This task's shard index, in `0..par_count`.
    #[inline]
    pub fn par_index(&self) -> usize {
        self.par_index
    }

    /// Total shards the system was split into.
    #[inline]
    pub fn par_count(&self) -> usize {
        self.par_count
    }

    /// The worker thread the task landed on, `None` for exclusive systems
    /// run on the coordinating thread.
    #[inline]
    pub fn worker(&self) -> Option<usize> {
        self.worker
    }

    /// Deferred structural commands: spawn, destroy, insert, remove.
    /// Applied in one batch at the end-of-tick barrier.
    #[inline]
    pub fn commands(&self) -> Commands<'_> {
        self.world().commands()
    }
}
