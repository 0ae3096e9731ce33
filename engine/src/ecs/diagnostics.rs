//! Read-only snapshots of a world and its schedule for dev tooling.
//!
//! Each function walks live state and returns plain rows: what components
//! are registered and where they live, how archetypes pack their chunks,
//! what each view currently matches, and how every system is configured
//! and performing. Nothing here mutates; capture a snapshot whenever a
//! tool asks, typically between ticks.

use std::time::Duration;

use crate::ecs::{component, schedule::Schedule, storage::archetype, world::World};

/// One registered component and its storage footprint.
#[derive(Debug, Clone)]
pub struct ComponentRow {
    /// The component's registry id.
    pub id: component::Id,

    /// The component's type name.
    pub name: &'static str,

    /// Value size in bytes.
    pub size: usize,

    /// Value alignment in bytes.
    pub align: usize,

    /// How many archetypes store this component.
    pub archetype_count: usize,

    /// Total entities carrying this component.
    pub entity_count: usize,
}

/// One archetype and how its chunks are packed.
#[derive(Debug, Clone)]
pub struct ArchetypeRow {
    /// The archetype's id.
    pub id: archetype::Id,

    /// Live entities across all chunks.
    pub entity_count: usize,

    /// Chunks currently allocated.
    pub chunk_count: usize,

    /// Rows per chunk.
    pub entities_per_chunk: usize,

    /// Bytes allocated for component columns across all chunks.
    pub byte_size: usize,

    /// The exact component set stored here, in id order.
    pub components: Vec<component::Id>,
}

/// One view's current match, attributed to the system that declared it.
#[derive(Debug, Clone)]
pub struct ViewRow {
    /// Name of the owning system.
    pub system: String,

    /// Position within the owning system's view list.
    pub index: usize,

    /// Entities in the currently matched archetypes.
    pub entity_count: usize,

    /// Chunks in the currently matched archetypes.
    pub chunk_count: usize,
}

/// One system's configuration and smoothed run time.
#[derive(Debug, Clone)]
pub struct SystemRow {
    /// Registration index; matches the node id in the exported job graph.
    pub id: usize,

    /// The system's name.
    pub name: String,

    /// Coarse placement order.
    pub defined_order: u32,

    /// How many views the system declares.
    pub view_count: usize,

    /// Shards per tick.
    pub parallel_count: usize,

    /// Whether the system runs alone with mutable world access.
    pub exclusive: bool,

    /// The worker its tasks are pinned to, if any.
    pub worker_affinity: Option<usize>,

    /// Smoothed duration of recent runs, `None` until the first tick.
    pub last_duration: Option<Duration>,
}

/// Every registered component with its archetype and entity totals.
pub fn component_rows(world: &World) -> Vec<ComponentRow> {
    let registry = world.registry();
    let archetypes = world.storage().archetypes();
    (0..registry.len())
        .filter_map(|index| registry.info(component::Id::new(index as u32)))
        .map(|info| {
            let mut archetype_count = 0;
            let mut entity_count = 0;
            for archetype in archetypes.iter() {
                if archetype.spec().contains(info.id()) {
                    archetype_count += 1;
                    entity_count += archetype.len();
                }
            }
            ComponentRow {
                id: info.id(),
                name: info.name(),
                size: info.layout().size(),
                align: info.layout().align(),
                archetype_count,
                entity_count,
            }
        })
        .collect()
}

/// Every archetype with its packing numbers, in id order.
pub fn archetype_rows(world: &World) -> Vec<ArchetypeRow> {
    let registry = world.registry();
    world
        .storage()
        .archetypes()
        .iter()
        .map(|archetype| {
            let stride: usize = archetype
                .spec()
                .ids()
                .iter()
                .filter_map(|&id| registry.info(id))
                .map(|info| info.layout().size())
                .sum();
            ArchetypeRow {
                id: archetype.id(),
                entity_count: archetype.len(),
                chunk_count: archetype.chunk_count(),
                entities_per_chunk: archetype.capacity(),
                byte_size: archetype.chunk_count() * archetype.capacity() * stride,
                components: archetype.spec().ids().to_vec(),
            }
        })
        .collect()
}

/// Every view declared by the schedule's systems, with current populations.
///
/// Views carry no names of their own; each row is identified by its owning
/// system plus its position in that system's view list.
pub fn view_rows(schedule: &Schedule, world: &World) -> Vec<ViewRow> {
    let registry = world.registry();
    let storage = world.storage();
    let mut rows = Vec::new();
    for system in schedule.systems() {
        for (index, view) in system.views().iter().enumerate() {
            let (entity_count, chunk_count) = view.population(registry, storage);
            rows.push(ViewRow {
                system: system.name().to_string(),
                index,
                entity_count,
                chunk_count,
            });
        }
    }
    rows
}

/// Every system in registration order, with placement and timing.
pub fn system_rows(schedule: &Schedule) -> Vec<SystemRow> {
    schedule
        .systems()
        .iter()
        .enumerate()
        .map(|(id, system)| SystemRow {
            id,
            name: system.name().to_string(),
            defined_order: system.defined_order(),
            view_count: system.views().len(),
            parallel_count: system.parallel_count(),
            exclusive: system.is_exclusive(),
            worker_affinity: system.worker_affinity(),
            last_duration: schedule.last_duration(id),
        })
        .collect()
}
