//! Entity component storage.
//!
//! Components live in archetypes: one archetype per exact component set,
//! each packing its entities into fixed-capacity chunks of column-major
//! arrays. [`Storage`] coordinates the archetypes and tracks every live
//! entity's location, so structural changes (spawn, despawn, insert, remove)
//! cost O(components) per entity regardless of world size.
//!
//! Structural changes only happen single-threaded, at startup or inside a
//! barrier between ticks. During a tick, systems read and write component
//! values in place through views; the chunk layout never moves under them.

pub(crate) mod archetype;
mod column;
mod index;
mod location;
mod row;
mod value;

pub(crate) use archetype::{Archetype, Archetypes};
pub(crate) use column::Column;
pub(crate) use index::EntityIndex;
pub(crate) use location::Location;
pub(crate) use row::Row;
pub use value::{Target, Values};
use value::Collector;

use crate::ecs::{
    component::{self, Component, Registry, Spec},
    entity::Entity,
};

/// Owns every entity's component data.
///
/// The storage knows nothing about entity liveness; the caller checks
/// handles against the entity table first. Here an entity either has a
/// recorded location or it has no footprint at all.
pub struct Storage {
    /// The archetypes, one per exact component set.
    archetypes: Archetypes,

    /// Where each entity's components live.
    index: EntityIndex,
}

impl Storage {
    /// Create an empty storage whose archetypes pack rows into chunks of
    /// roughly `chunk_bytes` bytes.
    pub fn new(chunk_bytes: usize) -> Self {
        Self {
            archetypes: Archetypes::new(chunk_bytes),
            index: EntityIndex::new(),
        }
    }

    /// Change the byte budget for archetypes created from here on.
    pub(crate) fn set_chunk_bytes(&mut self, chunk_bytes: usize) {
        self.archetypes.set_chunk_bytes(chunk_bytes);
    }

    /// Place a freshly created entity with its component values.
    ///
    /// # Panics
    /// Panics if the entity already has a footprint.
    pub fn spawn<V: Values>(&mut self, registry: &Registry, entity: Entity, values: V) {
        let spec = V::into_spec(registry);
        let archetype_id = self.archetypes.get_or_create(&spec, registry);
        let (chunk, row) = self.archetypes[archetype_id].add_entity(registry, entity, values);
        let previous = self.index.insert(entity, Location::new(archetype_id, chunk, row));
        assert!(previous.is_none(), "entity {:?} spawned twice", entity);
    }

    /// Place a batch of entities sharing one component set. The archetype is
    /// resolved once; values are applied per entity.
    pub fn spawn_batch<V: Values>(
        &mut self,
        registry: &Registry,
        batch: impl IntoIterator<Item = (Entity, V)>,
    ) {
        let spec = V::into_spec(registry);
        let archetype_id = self.archetypes.get_or_create(&spec, registry);
        for (entity, values) in batch {
            let (chunk, row) = self.archetypes[archetype_id].add_entity(registry, entity, values);
            let previous = self.index.insert(entity, Location::new(archetype_id, chunk, row));
            assert!(previous.is_none(), "entity {:?} spawned twice", entity);
        }
    }

    /// Drop an entity's components and forget its location. Returns false
    /// when the entity has no footprint.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        let Some(location) = self.index.remove(entity) else {
            return false;
        };
        let archetype = &mut self.archetypes[location.archetype()];
        if let Some(moved) = archetype.swap_remove(location.chunk(), location.row()) {
            // The tail entity now lives exactly where the removed one did.
            self.index.insert(moved, location);
        }
        true
    }

    /// Attach values to an existing entity.
    ///
    /// Components the entity already has are merged in place: the
    /// component's combine hook when it declares one, replacement otherwise.
    /// Genuinely new components migrate the entity to the wider archetype.
    /// Returns false when the entity has no footprint.
    pub fn insert<V: Values>(&mut self, registry: &Registry, entity: Entity, values: V) -> bool {
        let Some(location) = self.index.get(entity) else {
            return false;
        };

        // Stage the incoming values as raw parts; duplicates within the set
        // collapse during staging.
        let mut collector = Collector::new();
        values.apply(registry, &mut collector);

        let mut fresh: Vec<(component::Id, Vec<u8>)> = Vec::new();
        for (id, bytes) in collector.into_parts() {
            if self.archetypes[location.archetype()].spec().contains(id) {
                let archetype = &mut self.archetypes[location.archetype()];
                // SAFETY: the location is live and the bytes hold an
                // initialized value of this component; they are dead after
                // the merge and freed with the vec.
                unsafe { archetype.merge_bytes(location.chunk(), location.row(), id, bytes) };
            } else {
                fresh.push((id, bytes));
            }
        }

        if fresh.is_empty() {
            return true;
        }

        let added = Spec::new(fresh.iter().map(|(id, _)| *id).collect::<Vec<_>>());
        let target = self.archetypes[location.archetype()].spec().union(&added);
        self.migrate(registry, entity, location, &target, fresh);
        true
    }

    /// Detach a set of components from an entity, migrating it to the
    /// narrower archetype. Components the entity lacks are quietly skipped.
    /// Returns false when the entity has no footprint.
    pub fn remove(&mut self, registry: &Registry, entity: Entity, removal: &Spec) -> bool {
        let Some(location) = self.index.get(entity) else {
            return false;
        };
        let current = &self.archetypes[location.archetype()];
        if !current.spec().contains_any(removal) {
            return true;
        }
        let target = current.spec().difference(removal);
        self.migrate(registry, entity, location, &target, Vec::new());
        true
    }

    /// Move an entity to the archetype for `target`: components in both
    /// travel as raw bytes, the rest are dropped, and `additions` fill the
    /// new columns.
    fn migrate(
        &mut self,
        registry: &Registry,
        entity: Entity,
        location: Location,
        target: &Spec,
        additions: Vec<(component::Id, Vec<u8>)>,
    ) {
        let keep = self.archetypes[location.archetype()].spec().intersection(target);
        let (mut parts, moved) = self.archetypes[location.archetype()].extract_and_swap(
            location.chunk(),
            location.row(),
            &keep,
        );
        if let Some(moved) = moved {
            self.index.insert(moved, location);
        }
        parts.extend(additions);

        let target_id = self.archetypes.get_or_create(target, registry);
        let (chunk, row) = self.archetypes[target_id].add_entity_from_parts(entity, parts);
        self.index.insert(entity, Location::new(target_id, chunk, row));
    }

    /// Check whether an entity currently has a component, by id.
    pub fn has_id(&self, entity: Entity, id: component::Id) -> bool {
        self.index
            .get(entity)
            .is_some_and(|location| self.archetypes[location.archetype()].spec().contains(id))
    }

    /// Check whether an entity currently has a component.
    pub fn has<C: Component>(&self, registry: &Registry, entity: Entity) -> bool {
        registry
            .get::<C>()
            .is_some_and(|id| self.has_id(entity, id))
    }

    /// Shared reference to an entity's component value.
    pub fn get<C: Component>(&self, registry: &Registry, entity: Entity) -> Option<&C> {
        let id = registry.get::<C>()?;
        let location = self.index.get(entity)?;
        self.archetypes[location.archetype()].get(id, location.chunk(), location.row())
    }

    /// Exclusive reference to an entity's component value.
    pub fn get_mut<C: Component>(&mut self, registry: &Registry, entity: Entity) -> Option<&mut C> {
        let id = registry.get::<C>()?;
        let location = self.index.get(entity)?;
        self.archetypes[location.archetype()].get_mut(id, location.chunk(), location.row())
    }

    /// Where an entity's components live, if it has a footprint.
    #[inline]
    pub fn location(&self, entity: Entity) -> Option<Location> {
        self.index.get(entity)
    }

    /// Check whether an entity has a storage footprint.
    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        self.index.contains(entity)
    }

    /// The archetype registry, for iteration and diagnostics.
    #[inline]
    pub fn archetypes(&self) -> &Archetypes {
        &self.archetypes
    }

    /// Total live entities across all archetypes.
    pub fn entity_count(&self) -> usize {
        self.archetypes.iter().map(Archetype::len).sum()
    }

    /// Total chunks across all archetypes.
    pub fn chunk_count(&self) -> usize {
        self.archetypes.iter().map(Archetype::chunk_count).sum()
    }
}
