//! Benchmarks and measurement helpers for the Quartz ECS.
//!
//! The crate splits into shared fixtures (this library) and two criterion
//! harnesses under `benches/`:
//!
//! - [`components`] — the component zoo every bench draws from
//! - [`scenarios`] — full worlds with schedules: particles, game world, physics
//! - [`tick_timer`] — per-tick percentile statistics over long runs
//! - [`memory`] — dhat-backed heap spans, gated behind `memory_profiling`
//!
//! ```bash
//! cargo bench -p quartz_bench                  # everything
//! cargo bench -p quartz_bench -- iter          # one micro group
//! cargo bench -p quartz_bench --bench ecs_scenarios
//! ```
//!
//! Criterion drops HTML reports under `target/criterion/`. Heap profiles
//! land in `dhat-heap.json` when the feature is on.

pub mod components;
pub mod memory;
pub mod scenarios;
pub mod tick_timer;
