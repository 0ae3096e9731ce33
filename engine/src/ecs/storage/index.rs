use crate::ecs::{entity::Entity, storage::Location};

/// Rows per block. Tuned for dense entity indexes; a block covers 256
/// entities and allocates lazily when the first of them appears.
const BLOCK_SIZE: usize = 256;

/// Sparse entity-to-location map with block-granular allocation.
///
/// Entity indexes are dense (freed slots recycle), so a paged layout keeps
/// lookups O(1) without committing one huge allocation up front. Keyed by
/// the entity's slot index: stale handles to a reused slot resolve to the
/// current occupant, which is why liveness is always checked first.
pub struct EntityIndex {
    /// Lazily allocated blocks of location slots.
    blocks: Vec<Option<Box<[Option<Location>]>>>,
}

impl EntityIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self { blocks: Vec::new() }
    }

    /// Split an entity's slot index into block and offset coordinates.
    #[inline]
    fn coordinates(entity: Entity) -> (usize, usize) {
        let index = entity.index();
        (index / BLOCK_SIZE, index % BLOCK_SIZE)
    }

    /// Record the location for an entity, returning the previous one if set.
    pub fn insert(&mut self, entity: Entity, location: Location) -> Option<Location> {
        let (block, offset) = Self::coordinates(entity);
        if block >= self.blocks.len() {
            self.blocks.resize_with(block + 1, || None);
        }
        let slots = self.blocks[block]
            .get_or_insert_with(|| vec![None; BLOCK_SIZE].into_boxed_slice());
        slots[offset].replace(location)
    }

    /// Look up the location for an entity.
    #[inline]
    pub fn get(&self, entity: Entity) -> Option<Location> {
        let (block, offset) = Self::coordinates(entity);
        self.blocks.get(block)?.as_ref()?[offset]
    }

    /// Clear the location for an entity, returning it if one was set.
    pub fn remove(&mut self, entity: Entity) -> Option<Location> {
        let (block, offset) = Self::coordinates(entity);
        self.blocks.get_mut(block)?.as_mut()?[offset].take()
    }

    /// Check whether an entity has a recorded location.
    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        self.get(entity).is_some()
    }

    /// Number of blocks the index spans, allocated or not.
    #[cfg(test)]
    fn span(&self) -> usize {
        self.blocks.len()
    }

    /// Number of blocks actually allocated.
    #[cfg(test)]
    fn allocated(&self) -> usize {
        self.blocks.iter().filter(|block| block.is_some()).count()
    }
}

impl Default for EntityIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{
        entity::EntityTable,
        storage::{Row, archetype},
    };

    fn location(chunk: usize, row: usize) -> Location {
        Location::new(archetype::Id::new(0), chunk, Row::new(row))
    }

    #[test]
    fn insert_then_get() {
        // Given
        let entities = EntityTable::new();
        let entity = entities.create();
        let mut index = EntityIndex::new();

        // When
        let previous = index.insert(entity, location(1, 3));

        // Then
        assert_eq!(previous, None);
        assert_eq!(index.get(entity), Some(location(1, 3)));
        assert!(index.contains(entity));
    }

    #[test]
    fn insert_replaces_and_returns_previous() {
        // Given
        let entities = EntityTable::new();
        let entity = entities.create();
        let mut index = EntityIndex::new();
        index.insert(entity, location(0, 0));

        // When
        let previous = index.insert(entity, location(2, 7));

        // Then
        assert_eq!(previous, Some(location(0, 0)));
        assert_eq!(index.get(entity), Some(location(2, 7)));
    }

    #[test]
    fn remove_clears_the_slot() {
        // Given
        let entities = EntityTable::new();
        let entity = entities.create();
        let mut index = EntityIndex::new();
        index.insert(entity, location(0, 5));

        // When
        let removed = index.remove(entity);

        // Then
        assert_eq!(removed, Some(location(0, 5)));
        assert_eq!(index.get(entity), None);
        assert!(!index.contains(entity));
    }

    #[test]
    fn unknown_entity_resolves_to_nothing() {
        // Given
        let entities = EntityTable::new();
        let entity = entities.create();

        // When
        let index = EntityIndex::new();

        // Then
        assert_eq!(index.get(entity), None);
        assert_eq!(EntityIndex::new().remove(entity), None);
    }

    #[test]
    fn blocks_allocate_lazily() {
        // Given - entities in the first block and far past it
        let entities = EntityTable::new();
        let near = entities.create();
        let far = entities
            .create_many(BLOCK_SIZE * 10)
            .pop()
            .unwrap();
        let mut index = EntityIndex::new();

        // When
        index.insert(near, location(0, 0));
        index.insert(far, location(0, 1));

        // Then - the span covers both, but only two blocks exist
        assert!(index.span() > 10);
        assert_eq!(index.allocated(), 2);
        assert_eq!(index.get(far), Some(location(0, 1)));
    }
}
