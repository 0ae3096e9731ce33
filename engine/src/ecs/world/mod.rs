//! The world: every entity, every component value, and the deferred
//! command queue, under one roof.
//!
//! A `World` coordinates four pieces:
//!
//! - **Entity table**: handle allocation, liveness, index reuse
//! - **Component registry**: per-type metadata and dense component ids
//! - **Storage**: archetype-grouped component data in chunked columns
//! - **Command queue**: structural changes deferred to the tick barrier
//!
//! Structural methods (`spawn`, `destroy_entity`, `insert`, `remove`) take
//! `&mut self` and are for startup and exclusive systems. During a tick,
//! systems read and write through [`View`](crate::ecs::view::View)s and
//! defer structural work through [`commands`](World::commands).
//!
//! # Example
//!
//! ```rust,ignore
//! let mut world = World::new();
//! let player = world.spawn((Position { x: 0.0, y: 0.0 }, Health(100)));
//! world.insert(player, Shield(50));
//! assert!(world.exists(player));
//! world.destroy_entity(player);
//! ```

use crate::ecs::action::{CommandQueue, Commands};
use crate::ecs::component::{self, Component, IntoSpec, Registry};
use crate::ecs::entity::{Entity, EntityTable};
use crate::ecs::storage::{Storage, Values};

/// Per-chunk byte budget when no configuration overrides it.
pub(crate) const DEFAULT_CHUNK_BYTES: usize = 16 * 1024;

/// The central ECS container.
pub struct World {
    /// Entity handle allocation and liveness.
    entities: EntityTable,

    /// Metadata for every registered component type.
    components: Registry,

    /// Component data, grouped by archetype.
    storage: Storage,

    /// Structural changes queued mid-tick, applied at the barrier.
    commands: CommandQueue,
}

impl World {
    /// Create an empty world with the default chunk budget.
    pub fn new() -> Self {
        Self {
            entities: EntityTable::new(),
            components: Registry::new(),
            storage: Storage::new(DEFAULT_CHUNK_BYTES),
            commands: CommandQueue::new(),
        }
    }

    /// Register a component type, returning its dense id. Idempotent.
    ///
    /// Registration normally happens implicitly, the first time a type is
    /// named in a view or a spawn. Explicit registration exists for startup
    /// code that wants stable diagnostic ids.
    ///
    /// # Panics
    /// Panics for a brand-new type once the schedule has been built; the
    /// id space is frozen from then on.
    pub fn register_component<C: Component>(&self) -> component::Id {
        self.components.register::<C>()
    }

    /// Allocate a live entity with an empty component footprint.
    /// Components arrive later via [`insert`](World::insert).
    pub fn create_entity(&mut self) -> Entity {
        let entity = self.entities.create();
        self.storage.spawn(&self.components, entity, ());
        entity
    }

    /// Spawn an entity with a set of component values.
    pub fn spawn<V: Values>(&mut self, values: V) -> Entity {
        let entity = self.entities.create();
        self.storage.spawn(&self.components, entity, values);
        entity
    }

    /// Spawn a batch of entities sharing one component set. The archetype
    /// is resolved once for the whole batch.
    pub fn spawn_many<V: Values>(&mut self, values: impl IntoIterator<Item = V>) -> Vec<Entity> {
        let values: Vec<V> = values.into_iter().collect();
        let entities = self.entities.create_many(values.len());
        self.storage
            .spawn_batch(&self.components, entities.iter().copied().zip(values));
        entities
    }

    /// Destroy a live entity: the handle goes permanently stale and every
    /// component value is dropped.
    ///
    /// # Panics
    /// Panics if the handle is already dead. Destroying twice is a bug in
    /// the caller; racing destroys belong in [`commands`](World::commands),
    /// which is lenient.
    pub fn destroy_entity(&mut self, entity: Entity) {
        self.entities.destroy(entity);
        self.storage.despawn(entity);
    }

    /// Check whether a handle refers to a live entity.
    #[inline]
    pub fn exists(&self, entity: Entity) -> bool {
        self.entities.exists(entity)
    }

    /// Attach component values to a live entity, migrating it to the wider
    /// archetype. Values for components it already has merge through the
    /// component's combine hook (replacement when it has none). Returns
    /// false for a dead handle.
    pub fn insert<V: Values>(&mut self, entity: Entity, values: V) -> bool {
        self.entities.exists(entity) && self.storage.insert(&self.components, entity, values)
    }

    /// Detach the components named by `S` from a live entity, migrating it
    /// to the narrower archetype: `world.remove::<(Frozen, Stunned)>(e)`.
    /// Components the entity lacks are skipped. Returns false for a dead
    /// handle.
    pub fn remove<S: IntoSpec>(&mut self, entity: Entity) -> bool {
        self.entities.exists(entity)
            && self
                .storage
                .remove(&self.components, entity, &S::into_spec(&self.components))
    }

    /// Check whether a live entity currently has a component.
    pub fn has_component<C: Component>(&self, entity: Entity) -> bool {
        self.entities.exists(entity) && self.storage.has::<C>(&self.components, entity)
    }

    /// Shared reference to one component of a live entity.
    ///
    /// Convenience for startup and tests; bulk access goes through views.
    pub fn get<C: Component>(&self, entity: Entity) -> Option<&C> {
        if !self.entities.exists(entity) {
            return None;
        }
        self.storage.get::<C>(&self.components, entity)
    }

    /// Exclusive reference to one component of a live entity.
    pub fn get_mut<C: Component>(&mut self, entity: Entity) -> Option<&mut C> {
        if !self.entities.exists(entity) {
            return None;
        }
        self.storage.get_mut::<C>(&self.components, entity)
    }

    /// Handle for queueing deferred structural commands. Safe to use from
    /// any worker mid-tick.
    pub fn commands(&self) -> Commands<'_> {
        Commands::new(&self.components, &self.entities, &self.commands)
    }

    /// Drain and apply every queued command in submission order. Runs at
    /// the tick barrier; harmless to call when the queue is empty. Returns
    /// how many commands ran.
    pub fn apply_commands(&mut self) -> usize {
        let applied = self
            .commands
            .flush(&self.components, &self.entities, &mut self.storage);
        if applied > 0 {
            log::debug!("applied {applied} deferred commands");
        }
        applied
    }

    /// Commands queued and not yet applied.
    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    /// Number of live entities with a storage footprint.
    #[inline]
    pub fn entity_count(&self) -> usize {
        self.storage.entity_count()
    }

    #[inline]
    pub(crate) fn registry(&self) -> &Registry {
        &self.components
    }

    #[inline]
    pub(crate) fn storage(&self) -> &Storage {
        &self.storage
    }

    #[inline]
    pub(crate) fn set_chunk_bytes(&mut self, chunk_bytes: usize) {
        self.storage.set_chunk_bytes(chunk_bytes);
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
