use crate::ecs::storage::{Row, archetype};

/// Where an entity's component values live: archetype, chunk, and row.
///
/// Locations are bookkeeping, not stable handles. Any removal from the same
/// archetype may relocate the tail entity and rewrite its location, so the
/// entity index is the only place locations are allowed to rest.
#[derive(Eq, PartialEq, Hash, Copy, Clone, Debug)]
pub struct Location {
    /// The archetype holding the entity.
    archetype: archetype::Id,

    /// The chunk within the archetype.
    chunk: usize,

    /// The row within the chunk.
    row: Row,
}

impl Location {
    /// Create a new location.
    #[inline]
    pub const fn new(archetype: archetype::Id, chunk: usize, row: Row) -> Self {
        Self {
            archetype,
            chunk,
            row,
        }
    }

    /// Get the archetype id.
    #[inline]
    pub const fn archetype(&self) -> archetype::Id {
        self.archetype
    }

    /// Get the chunk index.
    #[inline]
    pub const fn chunk(&self) -> usize {
        self.chunk
    }

    /// Get the row within the chunk.
    #[inline]
    pub const fn row(&self) -> Row {
        self.row
    }
}
