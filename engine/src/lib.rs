//! Quartz: an archetype ECS with an automatic, dependency-derived parallel
//! job scheduler.
//!
//! Systems declare their data interest up front as [`ecs::View`]s. At startup
//! the schedule turns the declared read/write sets into a task dependency
//! graph, and every tick that graph is executed across a fixed worker pool.
//! Systems that cannot conflict run concurrently; systems that can are
//! ordered. There are no locks around component data at runtime.

// Allow the derive macros to use `::quartz_engine::...` paths from within this
// crate (tests, examples) as well as from dependent crates.
extern crate self as quartz_engine;

pub mod ecs;
