use std::collections::HashMap;
use std::ops::{Index, IndexMut};

use crate::ecs::{
    component::{self, Info, Registry, Spec},
    entity::Entity,
    storage::{
        Column, Row,
        value::{RowWriter, Values},
    },
};

/// Identifies an archetype within [`Archetypes`].
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Copy, Clone, Debug)]
pub struct Id(u32);

impl Id {
    /// Create a new archetype id.
    #[inline]
    pub(crate) const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the id as a dense index.
    #[inline]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

/// A fixed-capacity slab of entities stored column-major.
///
/// Every column in a chunk has the same capacity, and rows `0..len` are
/// initialized in every column. The entity list tracks which handle owns
/// each row.
pub struct Chunk {
    /// The entity at each live row.
    entities: Vec<Entity>,

    /// One column per component, in spec (id) order.
    columns: Vec<Column>,
}

impl Chunk {
    fn new(infos: &[Info], capacity: usize) -> Self {
        Self {
            entities: Vec::with_capacity(capacity),
            columns: infos.iter().map(|info| Column::new(*info, capacity)).collect(),
        }
    }

    /// Get the number of live rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check whether the chunk holds no entities.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Get the entity at each live row.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Get the column at the given spec-order index.
    #[inline]
    pub fn column(&self, index: usize) -> &Column {
        &self.columns[index]
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        // Drop every live value; the columns then release their buffers.
        for column in &mut self.columns {
            for row in 0..self.entities.len() {
                // SAFETY: rows 0..len are initialized in every column.
                unsafe { column.drop_in_place(Row::new(row)) };
            }
        }
    }
}

/// All entities sharing one exact component set, packed into fixed-capacity
/// chunks.
///
/// Chunk capacity is the byte budget divided by the entity stride (the
/// summed size of the component set), with a floor of one row so oversized
/// components still fit. Every chunk except the last is full: removals
/// backfill the hole with the archetype's tail entity, so iteration never
/// skips rows and shard boundaries fall on chunk boundaries.
pub struct Archetype {
    /// This archetype's id in the registry.
    id: Id,

    /// The exact component set stored here.
    spec: Spec,

    /// Component metadata in spec (id) order, parallel to each chunk's
    /// columns.
    infos: Vec<Info>,

    /// Rows per chunk.
    capacity: usize,

    /// The chunks, all full except possibly the last.
    chunks: Vec<Chunk>,

    /// Total live entities across all chunks.
    len: usize,
}

impl Archetype {
    /// Create an empty archetype for the given component set.
    pub fn new(id: Id, spec: Spec, infos: Vec<Info>, chunk_bytes: usize) -> Self {
        debug_assert_eq!(spec.len(), infos.len());
        debug_assert!(infos.windows(2).all(|pair| pair[0].id() < pair[1].id()));
        let stride: usize = infos.iter().map(|info| info.layout().size()).sum();
        // Zero-stride sets (empty or all zero-sized) get the full budget in
        // rows; oversized strides still get one row per chunk.
        let capacity = (chunk_bytes / stride.max(1)).max(1);
        Self {
            id,
            spec,
            infos,
            capacity,
            chunks: Vec::new(),
            len: 0,
        }
    }

    /// Get this archetype's id.
    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    /// Get the exact component set stored here.
    #[inline]
    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    /// Get the number of live entities across all chunks.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check whether the archetype holds no entities.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the rows-per-chunk capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the number of chunks currently allocated.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Get the chunk at the given index.
    #[inline]
    pub fn chunk(&self, index: usize) -> &Chunk {
        &self.chunks[index]
    }

    /// Iterate the chunks in order.
    #[inline]
    pub fn chunks(&self) -> impl ExactSizeIterator<Item = &Chunk> {
        self.chunks.iter()
    }

    /// Check whether this archetype stores every component in `spec`.
    #[inline]
    pub fn supports(&self, spec: &Spec) -> bool {
        self.spec.contains_all(spec)
    }

    /// Find the column index for a component id.
    #[inline]
    pub fn column_index(&self, id: component::Id) -> Option<usize> {
        self.infos.binary_search_by_key(&id, Info::id).ok()
    }

    /// Insert `entity` with `values`, returning where it landed.
    pub fn add_entity<V: Values>(
        &mut self,
        registry: &Registry,
        entity: Entity,
        values: V,
    ) -> (usize, Row) {
        let (chunk, row) = self.alloc_row(entity);
        let expected = self.infos.len();
        let mut writer = RowWriter::new(self, chunk, row);
        values.apply(registry, &mut writer);
        debug_assert_eq!(writer.filled(), expected, "value set must fill every column");
        self.verify_invariants();
        (chunk, row)
    }

    /// Insert `entity` from raw parts: bytes extracted from another archetype
    /// plus freshly staged values. Every column must be covered exactly once.
    pub fn add_entity_from_parts(
        &mut self,
        entity: Entity,
        parts: impl IntoIterator<Item = (component::Id, Vec<u8>)>,
    ) -> (usize, Row) {
        let (chunk, row) = self.alloc_row(entity);
        let mut written = 0;
        for (id, bytes) in parts {
            let Some(column) = self.column_index(id) else {
                panic!("component {:?} not stored in archetype {:?}", id, self.id);
            };
            // SAFETY: freshly allocated row; the bytes carry ownership.
            unsafe { self.chunks[chunk].columns[column].write_bytes(row, &bytes) };
            written += 1;
        }
        debug_assert_eq!(written, self.infos.len(), "migration must fill every column");
        self.verify_invariants();
        (chunk, row)
    }

    /// Remove the entity at the given position, dropping its values, and
    /// backfill the hole from the tail. Returns the relocated entity when
    /// one moved into the hole.
    pub fn swap_remove(&mut self, chunk: usize, row: Row) -> Option<Entity> {
        let (extracted, moved) = self.extract_and_swap(chunk, row, &Spec::EMPTY);
        debug_assert!(extracted.is_empty());
        moved
    }

    /// Remove the entity at the given position, extracting the raw bytes of
    /// the components in `keep` and dropping the rest, then backfill the
    /// hole from the tail. Returns the extracted parts and the relocated
    /// entity when one moved into the hole.
    pub fn extract_and_swap(
        &mut self,
        chunk: usize,
        row: Row,
        keep: &Spec,
    ) -> (Vec<(component::Id, Vec<u8>)>, Option<Entity>) {
        debug_assert!(chunk < self.chunks.len());
        debug_assert!(row.index() < self.chunks[chunk].len());

        let mut extracted = Vec::with_capacity(keep.len());
        let target = &mut self.chunks[chunk];
        for (index, info) in self.infos.iter().enumerate() {
            if keep.contains(info.id()) {
                // SAFETY: the row is live; ownership moves into the bytes.
                let bytes = unsafe { target.columns[index].read_bytes(row) };
                extracted.push((info.id(), bytes));
            } else {
                // SAFETY: the row is live and vacated below.
                unsafe { target.columns[index].drop_in_place(row) };
            }
        }

        let moved = self.backfill(chunk, row);
        self.verify_invariants();
        (extracted, moved)
    }

    /// Shared reference to an entity's value at the given position.
    pub fn get<C: component::Component>(
        &self,
        id: component::Id,
        chunk: usize,
        row: Row,
    ) -> Option<&C> {
        let column = self.column_index(id)?;
        let chunk = self.chunks.get(chunk)?;
        if row.index() >= chunk.len() {
            return None;
        }
        // SAFETY: the row is live; ensure_type checks C against the column.
        Some(unsafe { chunk.columns[column].get(row) })
    }

    /// Exclusive reference to an entity's value at the given position.
    pub fn get_mut<C: component::Component>(
        &mut self,
        id: component::Id,
        chunk: usize,
        row: Row,
    ) -> Option<&mut C> {
        let column = self.column_index(id)?;
        let chunk = self.chunks.get_mut(chunk)?;
        if row.index() >= chunk.entities.len() {
            return None;
        }
        // SAFETY: the row is live; ensure_type checks C against the column.
        Some(unsafe { chunk.columns[column].get_mut(row) })
    }

    /// Write `value` into a vacant slot. Called by [`RowWriter`] while a
    /// fresh row is being filled.
    ///
    /// # Safety
    /// The slot must be vacant (freshly allocated or moved-from).
    pub(crate) unsafe fn write_value<C: component::Component>(
        &mut self,
        chunk: usize,
        row: Row,
        id: component::Id,
        value: C,
    ) {
        let Some(column) = self.column_index(id) else {
            panic!(
                "component {} not stored in archetype {:?}",
                std::any::type_name::<C>(),
                self.id
            );
        };
        // SAFETY: forwarded contract.
        unsafe { self.chunks[chunk].columns[column].write(row, value) };
    }

    /// Merge `value` into a live slot, honoring the component's combine
    /// hook. Called by [`RowWriter`] when one value set names a component
    /// twice.
    ///
    /// # Safety
    /// The slot must hold an initialized value.
    pub(crate) unsafe fn merge_value<C: component::Component>(
        &mut self,
        chunk: usize,
        row: Row,
        id: component::Id,
        value: C,
    ) {
        let Some(column) = self.column_index(id) else {
            panic!(
                "component {} not stored in archetype {:?}",
                std::any::type_name::<C>(),
                self.id
            );
        };
        // SAFETY: forwarded contract.
        unsafe { self.chunks[chunk].columns[column].merge(row, value) };
    }

    /// Byte-level merge into a live slot. The bytes are moved-from
    /// afterwards.
    ///
    /// # Safety
    /// The slot must hold an initialized value and `bytes` must carry an
    /// initialized value of the component `id` names.
    pub(crate) unsafe fn merge_bytes(
        &mut self,
        chunk: usize,
        row: Row,
        id: component::Id,
        mut bytes: Vec<u8>,
    ) {
        let Some(column) = self.column_index(id) else {
            panic!("component {:?} not stored in archetype {:?}", id, self.id);
        };
        let column = &mut self.chunks[chunk].columns[column];
        debug_assert_eq!(bytes.len(), column.info().layout().size());
        let incoming = bytes.as_mut_ptr();
        // SAFETY: vec buffers are never null; the merge consumes the value
        // and the dead bytes are freed when the vec drops.
        unsafe { column.merge_bytes(row, std::ptr::NonNull::new_unchecked(incoming)) };
    }

    /// Reserve the next row, opening a fresh chunk when the last one is
    /// full. Column slots at the returned position are vacant.
    fn alloc_row(&mut self, entity: Entity) -> (usize, Row) {
        if self.chunks.last().is_none_or(|chunk| chunk.len() == self.capacity) {
            self.chunks.push(Chunk::new(&self.infos, self.capacity));
        }
        let chunk = self.chunks.len() - 1;
        let row = Row::new(self.chunks[chunk].entities.len());
        self.chunks[chunk].entities.push(entity);
        self.len += 1;
        (chunk, row)
    }

    /// Fill the vacated position with the archetype's very last entity. All
    /// column slots at the hole must already be vacant. Releases the tail
    /// chunk when it empties.
    fn backfill(&mut self, hole_chunk: usize, hole_row: Row) -> Option<Entity> {
        self.len -= 1;
        let tail_chunk = self.chunks.len() - 1;
        let tail_row = Row::new(self.chunks[tail_chunk].len() - 1);

        let moved = if hole_chunk == tail_chunk {
            let chunk = &mut self.chunks[tail_chunk];
            if hole_row != tail_row {
                for column in &mut chunk.columns {
                    // SAFETY: the tail row is live, the hole was vacated,
                    // and the rows differ.
                    unsafe { column.move_within(tail_row, hole_row) };
                }
            }
            chunk.entities.swap_remove(hole_row.index());
            (hole_row != tail_row).then(|| chunk.entities[hole_row.index()])
        } else {
            let (head, rest) = self.chunks.split_at_mut(tail_chunk);
            let (target, source) = (&mut head[hole_chunk], &mut rest[0]);
            for (dst, src) in target.columns.iter_mut().zip(source.columns.iter_mut()) {
                // SAFETY: distinct chunks; the tail row is live and the hole
                // was vacated.
                unsafe { Column::move_between(src, tail_row, dst, hole_row) };
            }
            let moved = source.entities[tail_row.index()];
            source.entities.truncate(tail_row.index());
            target.entities[hole_row.index()] = moved;
            Some(moved)
        };

        if self.chunks.last().is_some_and(Chunk::is_empty) {
            self.chunks.pop();
        }
        moved
    }

    #[cfg(debug_assertions)]
    fn verify_invariants(&self) {
        let total: usize = self.chunks.iter().map(Chunk::len).sum();
        debug_assert_eq!(total, self.len);
        for chunk in self.chunks.iter().take(self.chunks.len().saturating_sub(1)) {
            debug_assert_eq!(chunk.len(), self.capacity, "only the last chunk may be partial");
        }
        if let Some(last) = self.chunks.last() {
            debug_assert!(!last.is_empty(), "empty tail chunks are released");
            debug_assert!(last.len() <= self.capacity);
        }
    }

    #[cfg(not(debug_assertions))]
    fn verify_invariants(&self) {}
}

/// Registry of every archetype, keyed by exact component set.
pub struct Archetypes {
    /// The archetypes, indexed by [`Id`].
    archetypes: Vec<Archetype>,

    /// Map from component set to archetype id.
    by_spec: HashMap<Spec, Id>,

    /// Byte budget handed to each new archetype's chunks.
    chunk_bytes: usize,
}

impl Archetypes {
    /// Create an empty registry with the given per-chunk byte budget.
    pub fn new(chunk_bytes: usize) -> Self {
        Self {
            archetypes: Vec::new(),
            by_spec: HashMap::new(),
            chunk_bytes,
        }
    }

    /// Change the byte budget for archetypes created from here on. Existing
    /// archetypes keep the capacity they were built with.
    pub(crate) fn set_chunk_bytes(&mut self, chunk_bytes: usize) {
        self.chunk_bytes = chunk_bytes;
    }

    /// Get the archetype id for an exact component set, creating the
    /// archetype on first use.
    pub fn get_or_create(&mut self, spec: &Spec, registry: &Registry) -> Id {
        if let Some(id) = self.by_spec.get(spec) {
            return *id;
        }
        let id = Id::new(self.archetypes.len() as u32);
        let infos = spec
            .ids()
            .iter()
            .map(|&component_id| {
                let Some(info) = registry.info(component_id) else {
                    panic!("component {:?} has no registered info", component_id);
                };
                info
            })
            .collect();
        self.archetypes.push(Archetype::new(id, spec.clone(), infos, self.chunk_bytes));
        self.by_spec.insert(spec.clone(), id);
        id
    }

    /// Look up the id for an exact component set.
    #[inline]
    pub fn id_of(&self, spec: &Spec) -> Option<Id> {
        self.by_spec.get(spec).copied()
    }

    /// Get an archetype by id.
    #[inline]
    pub fn get(&self, id: Id) -> Option<&Archetype> {
        self.archetypes.get(id.index())
    }

    /// Get an archetype by id, mutably.
    #[inline]
    pub fn get_mut(&mut self, id: Id) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id.index())
    }

    /// Get the number of archetypes.
    #[inline]
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    /// Check whether no archetypes exist yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    /// Iterate all archetypes in id order.
    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Archetype> {
        self.archetypes.iter()
    }
}

impl Index<Id> for Archetypes {
    type Output = Archetype;

    #[inline]
    fn index(&self, id: Id) -> &Archetype {
        &self.archetypes[id.index()]
    }
}

impl IndexMut<Id> for Archetypes {
    #[inline]
    fn index_mut(&mut self, id: Id) -> &mut Archetype {
        &mut self.archetypes[id.index()]
    }
}
