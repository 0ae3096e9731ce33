//! Row cursor over the archetypes matched by a view.
//!
//! [`ViewIter`] walks matched archetypes chunk by chunk and yields one
//! [`EntityRow`] per live row. The cursor is lazy and restartable: calling
//! `iter()` on the view again starts a fresh pass. A sharded cursor visits
//! only every Nth chunk, which is how parallel system shards split the
//! matched population without overlapping.
//!
//! Rows hand out component references through the column's raw storage. The
//! schedule guarantees that no conflicting system runs concurrently, and the
//! view's declared access is re-checked per accessor in debug builds.

use std::any::TypeId;
use std::sync::Arc;

use crate::ecs::component::Component;
use crate::ecs::entity::Entity;
use crate::ecs::storage::archetype;
use crate::ecs::storage::{Archetype, Column, Row, Storage};
use crate::ecs::view::Resolved;

/// Lazy cursor yielding an [`EntityRow`] for every entity the view matches.
pub struct ViewIter<'w> {
    storage: &'w Storage,
    view: &'w Resolved,
    matched: Arc<Vec<archetype::Id>>,
    /// Index into `matched` of the archetype under the cursor.
    position: usize,
    /// Chunk index within the current archetype.
    chunk: usize,
    /// Row index within the current chunk.
    row: usize,
    /// Global chunk ordinal across all matched archetypes, used for striding.
    ordinal: usize,
    offset: usize,
    step: usize,
}

impl<'w> ViewIter<'w> {
    /// Cursor over every matched chunk.
    pub(crate) fn new(
        storage: &'w Storage,
        view: &'w Resolved,
        matched: Arc<Vec<archetype::Id>>,
    ) -> Self {
        Self::sharded(storage, view, matched, 0, 1)
    }

    /// Cursor over every chunk whose global ordinal is `index` modulo
    /// `count`. The shards for `0..count` together cover each matched row
    /// exactly once.
    pub(crate) fn sharded(
        storage: &'w Storage,
        view: &'w Resolved,
        matched: Arc<Vec<archetype::Id>>,
        index: usize,
        count: usize,
    ) -> Self {
        assert!(count > 0, "shard count must be at least 1");
        assert!(
            index < count,
            "shard index {index} out of range for {count} shards"
        );
        Self {
            storage,
            view,
            matched,
            position: 0,
            chunk: 0,
            row: 0,
            ordinal: 0,
            offset: index,
            step: count,
        }
    }
}

impl<'w> Iterator for ViewIter<'w> {
    type Item = EntityRow<'w>;

    fn next(&mut self) -> Option<EntityRow<'w>> {
        let storage: &'w Storage = self.storage;
        let archetypes = storage.archetypes();
        while self.position < self.matched.len() {
            let archetype = &archetypes[self.matched[self.position]];
            if self.chunk >= archetype.chunk_count() {
                self.position += 1;
                self.chunk = 0;
                self.row = 0;
                continue;
            }
            // Chunks are dealt round-robin to shards by global ordinal.
            if self.ordinal % self.step != self.offset {
                self.ordinal += 1;
                self.chunk += 1;
                continue;
            }
            let chunk = archetype.chunk(self.chunk);
            if self.row >= chunk.len() {
                self.ordinal += 1;
                self.chunk += 1;
                self.row = 0;
                continue;
            }
            let row = Row::new(self.row);
            let entity = chunk.entities()[self.row];
            self.row += 1;
            return Some(EntityRow {
                archetype,
                view: self.view,
                chunk: self.chunk,
                row,
                entity,
            });
        }
        None
    }
}

/// One entity's components, scoped to a view.
///
/// Accessors resolve the component type against the view's declarations:
/// an undeclared component panics, and writing through a read-only
/// declaration is caught by a debug assertion. Components declared `maybe`
/// may be absent from the row's archetype; use [`read_opt`](Self::read_opt)
/// / [`write_opt`](Self::write_opt) for those.
///
/// Holding component references from two rows of the same entity at once
/// (for example via `iter` and `at` simultaneously) is not supported;
/// structural or cross-row mutation belongs in the command queue.
pub struct EntityRow<'w> {
    archetype: &'w Archetype,
    view: &'w Resolved,
    chunk: usize,
    row: Row,
    entity: Entity,
}

impl<'w> EntityRow<'w> {
    pub(crate) fn new(
        archetype: &'w Archetype,
        view: &'w Resolved,
        chunk: usize,
        row: Row,
        entity: Entity,
    ) -> Self {
        Self {
            archetype,
            view,
            chunk,
            row,
            entity,
        }
    }

    /// The entity this row belongs to.
    #[inline]
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// Read a component declared on the view.
    ///
    /// # Panics
    /// Panics if the component is not declared on the view, or if it is
    /// absent from this row (possible only for `maybe` declarations).
    pub fn read<C: Component>(&self) -> &C {
        match self.read_opt::<C>() {
            Some(value) => value,
            None => panic!(
                "component {} is absent from entity {:?}; use read_opt for maybe components",
                std::any::type_name::<C>(),
                self.entity,
            ),
        }
    }

    /// Read a component that may be absent from this row.
    ///
    /// # Panics
    /// Panics if the component is not declared on the view.
    pub fn read_opt<C: Component>(&self) -> Option<&C> {
        let (id, _) = self.view.expect_declared::<C>();
        let column = self.column(id)?;
        debug_assert_eq!(
            column.info().type_id(),
            TypeId::of::<C>(),
            "Type mismatch: column stores {}",
            column.info().name(),
        );
        // SAFETY: the row is in bounds for this chunk and the registry binds
        // the column's id to type C. The schedule serializes every system
        // whose declared access conflicts with this view, so no concurrent
        // writer exists for this column.
        Some(unsafe { &*column.ptr_at(self.row).as_ptr().cast::<C>() })
    }

    /// Write a component declared writable on the view.
    ///
    /// # Panics
    /// Panics if the component is not declared on the view, or if it is
    /// absent from this row. Debug builds additionally panic when the
    /// declaration is read-only.
    pub fn write<C: Component>(&mut self) -> &mut C {
        let entity = self.entity;
        match self.write_opt::<C>() {
            Some(value) => value,
            None => panic!(
                "component {} is absent from entity {:?}; use write_opt for maybe components",
                std::any::type_name::<C>(),
                entity,
            ),
        }
    }

    /// Write a component that may be absent from this row.
    ///
    /// # Panics
    /// Panics if the component is not declared on the view. Debug builds
    /// additionally panic when the declaration is read-only.
    pub fn write_opt<C: Component>(&mut self) -> Option<&mut C> {
        let (id, writable) = self.view.expect_declared::<C>();
        debug_assert!(
            writable,
            "component {} is declared read-only on this view",
            std::any::type_name::<C>(),
        );
        let column = self.column(id)?;
        debug_assert_eq!(
            column.info().type_id(),
            TypeId::of::<C>(),
            "Type mismatch: column stores {}",
            column.info().name(),
        );
        // SAFETY: the row is in bounds and the type matches the column, as
        // above. The pointer carries the column allocation's provenance, the
        // schedule keeps every conflicting system off this column while the
        // view runs, and `&mut self` prevents overlapping borrows through
        // this row.
        Some(unsafe { &mut *column.ptr_at(self.row).as_ptr().cast::<C>() })
    }

    /// Check whether the row's archetype carries the component.
    pub fn has<C: Component>(&self) -> bool {
        let (id, _) = self.view.expect_declared::<C>();
        self.archetype.column_index(id).is_some()
    }

    fn column(&self, id: crate::ecs::component::Id) -> Option<&'w Column> {
        let index = self.archetype.column_index(id)?;
        Some(self.archetype.chunk(self.chunk).column(index))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::ecs::component::Registry;
    use crate::ecs::entity::EntityTable;
    use crate::ecs::view::View;

    struct Position {
        x: f32,
        y: f32,
    }
    impl Component for Position {}

    struct Velocity {
        dx: f32,
    }
    impl Component for Velocity {}

    struct Tag;
    impl Component for Tag {}

    fn populated(chunk_bytes: usize, moving: usize, still: usize) -> (Registry, Storage, Vec<Entity>) {
        let registry = Registry::new();
        let entities = EntityTable::new();
        let mut storage = Storage::new(chunk_bytes);

        let mut spawned = Vec::new();
        for index in 0..moving {
            let entity = entities.create();
            storage.spawn(
                &registry,
                entity,
                (
                    Position {
                        x: index as f32,
                        y: 0.0,
                    },
                    Velocity { dx: 1.0 },
                ),
            );
            spawned.push(entity);
        }
        for index in 0..still {
            let entity = entities.create();
            storage.spawn(
                &registry,
                entity,
                Position {
                    x: 100.0 + index as f32,
                    y: 0.0,
                },
            );
            spawned.push(entity);
        }
        (registry, storage, spawned)
    }

    #[test]
    fn iteration_covers_every_matching_entity() {
        // Given - 5 entities with velocity, 3 without
        let (registry, storage, spawned) = populated(16 * 1024, 5, 3);
        let view = View::new().reads::<Position>().reads::<Velocity>();
        let resolved = view.resolve(&registry);
        let matched = view.matched(resolved, &storage);

        // When
        let seen: HashSet<Entity> = ViewIter::new(&storage, resolved, matched)
            .map(|row| row.entity())
            .collect();

        // Then - exactly the moving entities
        assert_eq!(seen.len(), 5);
        for entity in &spawned[..5] {
            assert!(seen.contains(entity));
        }
        for entity in &spawned[5..] {
            assert!(!seen.contains(entity));
        }
    }

    #[test]
    fn iteration_spans_chunk_boundaries() {
        // Given - a chunk budget that fits only two rows per chunk
        let stride = size_of::<Position>() + size_of::<Velocity>();
        let (registry, storage, _) = populated(2 * stride, 7, 0);
        let view = View::new().reads::<Position>();
        let resolved = view.resolve(&registry);
        let matched = view.matched(resolved, &storage);

        // When
        let seen: Vec<f32> = ViewIter::new(&storage, resolved, matched)
            .map(|row| row.read::<Position>().x)
            .collect();

        // Then - every row visited exactly once across 4 chunks
        assert_eq!(seen.len(), 7);
        let unique: HashSet<u32> = seen.iter().map(|x| *x as u32).collect();
        assert_eq!(unique.len(), 7);
    }

    #[test]
    fn rows_write_through_to_storage() {
        // Given
        let (registry, storage, spawned) = populated(16 * 1024, 3, 0);
        let view = View::new().writes::<Position>().reads::<Velocity>();
        let resolved = view.resolve(&registry);
        let matched = view.matched(resolved, &storage);

        // When - integrate velocity into position
        for mut row in ViewIter::new(&storage, resolved, matched) {
            let dx = row.read::<Velocity>().dx;
            row.write::<Position>().x += dx;
        }

        // Then
        for (index, entity) in spawned.iter().enumerate() {
            let position = storage.get::<Position>(&registry, *entity).unwrap();
            assert_eq!(position.x, index as f32 + 1.0);
            assert_eq!(position.y, 0.0);
        }
    }

    #[test]
    fn sharded_cursors_partition_the_population() {
        // Given - enough entities to spread over several chunks
        let stride = size_of::<Position>() + size_of::<Velocity>();
        let (registry, storage, spawned) = populated(4 * stride, 22, 0);
        let view = View::new().reads::<Position>();
        let resolved = view.resolve(&registry);
        let matched = view.matched(resolved, &storage);

        // When - three shards walk the same view
        let mut seen: Vec<HashSet<Entity>> = Vec::new();
        for index in 0..3 {
            let shard: HashSet<Entity> =
                ViewIter::sharded(&storage, resolved, Arc::clone(&matched), index, 3)
                    .map(|row| row.entity())
                    .collect();
            seen.push(shard);
        }

        // Then - pairwise disjoint and jointly exhaustive
        assert!(seen[0].is_disjoint(&seen[1]));
        assert!(seen[0].is_disjoint(&seen[2]));
        assert!(seen[1].is_disjoint(&seen[2]));
        let total: HashSet<Entity> = seen.iter().flatten().copied().collect();
        assert_eq!(total.len(), spawned.len());
    }

    #[test]
    fn single_shard_sees_everything() {
        // Given
        let (registry, storage, spawned) = populated(16 * 1024, 6, 0);
        let view = View::new().reads::<Position>();
        let resolved = view.resolve(&registry);
        let matched = view.matched(resolved, &storage);

        // When
        let count = ViewIter::sharded(&storage, resolved, matched, 0, 1).count();

        // Then
        assert_eq!(count, spawned.len());
    }

    #[test]
    fn restarting_iteration_yields_a_fresh_cursor() {
        // Given
        let (registry, storage, _) = populated(16 * 1024, 4, 0);
        let view = View::new().reads::<Position>();
        let resolved = view.resolve(&registry);

        // When - two full passes over the same view
        let first = ViewIter::new(&storage, resolved, view.matched(resolved, &storage)).count();
        let second = ViewIter::new(&storage, resolved, view.matched(resolved, &storage)).count();

        // Then
        assert_eq!(first, 4);
        assert_eq!(second, 4);
    }

    #[test]
    fn empty_match_set_yields_nothing() {
        // Given - no entity carries Tag
        let (registry, storage, _) = populated(16 * 1024, 2, 2);
        let view = View::new().reads::<Tag>();
        let resolved = view.resolve(&registry);
        let matched = view.matched(resolved, &storage);

        // When
        let mut iter = ViewIter::new(&storage, resolved, matched);

        // Then
        assert!(iter.next().is_none());
    }

    #[test]
    fn maybe_components_read_as_options() {
        // Given - velocity declared maybe, present on 2 of 5 entities
        let (registry, storage, _) = populated(16 * 1024, 2, 3);
        let view = View::new().reads::<Position>().maybe::<Velocity>();
        let resolved = view.resolve(&registry);
        let matched = view.matched(resolved, &storage);

        // When
        let with_velocity = ViewIter::new(&storage, resolved, matched)
            .filter(|row| row.read_opt::<Velocity>().is_some())
            .count();

        // Then
        assert_eq!(with_velocity, 2);
    }

    #[test]
    #[should_panic(expected = "is not declared on this view")]
    fn undeclared_component_access_panics() {
        // Given - the view never mentions Velocity
        let (registry, storage, _) = populated(16 * 1024, 1, 0);
        let view = View::new().reads::<Position>();
        let resolved = view.resolve(&registry);
        let matched = view.matched(resolved, &storage);

        // When
        let row = ViewIter::new(&storage, resolved, matched).next().unwrap();
        let _ = row.read::<Velocity>();
    }

    #[test]
    #[should_panic(expected = "declared read-only")]
    fn writing_a_read_only_component_panics_in_debug() {
        // Given
        let (registry, storage, _) = populated(16 * 1024, 1, 0);
        let view = View::new().reads::<Position>();
        let resolved = view.resolve(&registry);
        let matched = view.matched(resolved, &storage);

        // When
        let mut row = ViewIter::new(&storage, resolved, matched).next().unwrap();
        let _ = row.write::<Position>();
    }

    #[test]
    #[should_panic(expected = "use read_opt for maybe components")]
    fn plain_read_of_an_absent_maybe_component_panics() {
        // Given - only position-without-velocity entities
        let (registry, storage, _) = populated(16 * 1024, 0, 1);
        let view = View::new().reads::<Position>().maybe::<Velocity>();
        let resolved = view.resolve(&registry);
        let matched = view.matched(resolved, &storage);

        // When
        let row = ViewIter::new(&storage, resolved, matched).next().unwrap();
        let _ = row.read::<Velocity>();
    }

    #[test]
    fn has_reports_archetype_membership() {
        // Given
        let (registry, storage, _) = populated(16 * 1024, 1, 1);
        let view = View::new().reads::<Position>().maybe::<Velocity>();
        let resolved = view.resolve(&registry);
        let matched = view.matched(resolved, &storage);

        // When
        let flags: Vec<bool> = ViewIter::new(&storage, resolved, matched)
            .map(|row| row.has::<Velocity>())
            .collect();

        // Then - one row with velocity, one without
        assert_eq!(flags.iter().filter(|present| **present).count(), 1);
        assert_eq!(flags.len(), 2);
    }
}
