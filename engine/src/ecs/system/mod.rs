//! Systems: named units of work scheduled against declared component access.
//!
//! A [`System`] bundles a name, the [`View`]s describing everything it will
//! touch, and a body closure. The schedule derives conflicts from the views
//! alone, so a body that reaches outside its declared access is a bug the
//! debug assertions in the view layer will catch.
//!
//! ```rust,ignore
//! let movement = System::new("movement", vec![moving.clone()], move |ctx| {
//!     for mut row in moving.iter(ctx.world()) {
//!         let step = row.read::<Velocity>().dx;
//!         row.write::<Position>().x += step;
//!     }
//! })
//! .order(10)
//! .parallel(4);
//! ```

mod ctx;

pub use ctx::Ctx;

use std::sync::Arc;

use crate::ecs::component::Registry;
use crate::ecs::view::{Access, View};

type Body = Box<dyn Fn(&mut Ctx<'_>) + Send + Sync + 'static>;

/// A schedulable unit: views in, body out, plus placement hints.
///
/// Systems are inert until handed to a
/// [`Schedule`](crate::ecs::schedule::Schedule); the schedule resolves
/// their views, folds the declared access, and wires conflict edges.
pub struct System {
    name: String,
    views: Vec<Arc<View>>,
    body: Body,
    order: u32,
    parallel: usize,
    exclusive: bool,
    affinity: Option<usize>,
}

impl System {
    /// A system named `name` running `body` over the given views.
    ///
    /// The body must be callable from several threads at once: a system
    /// split with [`parallel`](System::parallel) runs one invocation per
    /// shard, concurrently, each with its own [`Ctx`].
    pub fn new(
        name: impl Into<String>,
        views: Vec<Arc<View>>,
        body: impl Fn(&mut Ctx<'_>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            views,
            body: Box::new(body),
            order: 0,
            parallel: 1,
            exclusive: false,
            affinity: None,
        }
    }

    /// Coarse placement: lower orders run earlier wherever this system
    /// conflicts with another. Ties fall back to registration order.
    pub fn order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    /// Split the system into `count` shards, each iterating a disjoint
    /// slice of the matched chunks.
    ///
    /// # Panics
    /// Panics if `count` is zero.
    pub fn parallel(mut self, count: usize) -> Self {
        assert!(count > 0, "parallel count must be at least 1");
        self.parallel = count;
        self
    }

    /// Run alone: the schedule drains the worker pool before this system
    /// starts, and its body may take [`Ctx::world_mut`].
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Pin every task of this system to one worker thread, for bodies
    /// that touch thread-bound state.
    pub fn affinity(mut self, worker: usize) -> Self {
        self.affinity = Some(worker);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn views(&self) -> &[Arc<View>] {
        &self.views
    }

    pub fn defined_order(&self) -> u32 {
        self.order
    }

    pub fn parallel_count(&self) -> usize {
        self.parallel
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn worker_affinity(&self) -> Option<usize> {
        self.affinity
    }

    /// Everything this system touches, folded across its views. An
    /// exclusive system escalates to conflict with every other system.
    pub(crate) fn access(&self, registry: &Registry) -> Access {
        let mut access = Access::new();
        for view in &self.views {
            access.merge(view.resolve(registry).access());
        }
        if self.exclusive {
            access.set_exclusive();
        }
        access
    }

    pub(crate) fn run(&self, ctx: &mut Ctx<'_>) {
        (self.body)(ctx);
    }
}
