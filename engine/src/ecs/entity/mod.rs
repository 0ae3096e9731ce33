//! Entity identity for the ECS.
//!
//! An [`Entity`] is a lightweight handle made of an [`Id`] (a dense slot
//! index) and a [`Serial`]. The index is reused first-free after a destroy;
//! the serial is bumped every time an index is reclaimed, so any copies of
//! the old handle become detectably stale instead of silently aliasing the
//! new occupant.
//!
//! # Serial tracking
//!
//! Serial `0` is reserved to mean "never allocated": a zeroed or default
//! handle can never pass [`EntityTable::exists`]. Live entities start at
//! serial `1`:
//!
//! ```rust,ignore
//! let e = table.create();       // Entity { id: 0, serial: 1 }
//! table.destroy(e);
//! assert!(!table.exists(e));    // stale forever
//! let r = table.create();       // Entity { id: 0, serial: 2 }
//! assert!(!table.exists(e));    // still stale, even though id 0 is live again
//! ```
//!
//! # Performance
//!
//! Indexes are recycled through a lock-free dead pool, keeping the id space
//! compact for index-addressed storage. Serial slots live in chunked atomic
//! arrays so `exists` is a single load and allocation never moves existing
//! slots.

use std::sync::{
    RwLock,
    atomic::{AtomicU32, Ordering},
};

use crossbeam::queue::SegQueue;

/// The serial of an entity slot. Bumped each time the slot's index is
/// reclaimed, invalidating every handle minted for the previous occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Serial(u32);

impl Serial {
    /// The never-allocated sentinel. No live entity carries this serial.
    pub const NEVER: Self = Self(0);

    /// The serial assigned to the first occupant of a fresh slot.
    pub const FIRST: Self = Self(1);

    /// Get the next serial from the current.
    #[inline]
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Get the raw serial value.
    #[inline]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

/// An entity slot index. Dense, starting at 0, reused after destroy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u32);

impl From<u32> for Id {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl Id {
    /// Get the index of this id for use in indexable storage (e.g. Vec).
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// An entity handle: slot index plus the serial the slot had when the handle
/// was minted. A handle is valid exactly while the slot still carries that
/// serial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    /// The slot index of the entity.
    id: Id,

    /// The serial of the slot at mint time.
    serial: Serial,
}

impl Entity {
    /// Handle for the first occupant of a slot. Mostly a test convenience;
    /// live code receives handles from the table.
    #[inline]
    pub(crate) fn new(id: impl Into<Id>) -> Self {
        Self::with_serial(id.into(), Serial::FIRST)
    }

    /// Construct a handle with an id and a known serial.
    #[inline]
    pub(crate) const fn with_serial(id: Id, serial: Serial) -> Self {
        Self { id, serial }
    }

    /// Get the slot id of this entity.
    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    /// Get the serial of this entity.
    #[inline]
    pub fn serial(&self) -> Serial {
        self.serial
    }

    /// Get the index of this entity for use in indexable storage (e.g. Vec).
    #[inline]
    pub fn index(&self) -> usize {
        self.id.index()
    }

    /// Pack the handle into its canonical 64-bit form, `index << 32 | serial`.
    /// Used for display and diagnostics only; the fields stay explicit.
    #[inline]
    pub fn bits(&self) -> u64 {
        ((self.id.0 as u64) << 32) | self.serial.0 as u64
    }
}

/// Order entities by id, then serial, so sorted handle lists group slot reuse.
impl PartialOrd for Entity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match self.id.cmp(&other.id) {
            std::cmp::Ordering::Equal => self.serial.cmp(&other.serial),
            ord => ord,
        }
    }
}

const CHUNK_SIZE: usize = 4096;

/// Growable array of atomic serials, one per slot index. A slot holds the
/// serial of its current (or next) occupant; 0 means the slot has never been
/// allocated.
#[derive(Default, Debug)]
struct Slots {
    chunks: RwLock<Vec<Box<[AtomicU32; CHUNK_SIZE]>>>,
}

impl Slots {
    const fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
        }
    }

    fn get(&self, id: Id) -> Serial {
        let index = id.index();
        let chunk_idx = index / CHUNK_SIZE;
        let slot_idx = index % CHUNK_SIZE;

        let chunks = self.chunks.read().unwrap();
        Serial(if chunk_idx < chunks.len() {
            chunks[chunk_idx][slot_idx].load(Ordering::Acquire)
        } else {
            Serial::NEVER.0
        })
    }

    fn set(&self, id: Id, serial: Serial) {
        self.ensure_capacity(id);
        let index = id.index();
        let chunks = self.chunks.read().unwrap();
        chunks[index / CHUNK_SIZE][index % CHUNK_SIZE].store(serial.0, Ordering::Release);
    }

    fn increment(&self, id: Id) {
        self.ensure_capacity(id);
        let index = id.index();
        let chunks = self.chunks.read().unwrap();
        chunks[index / CHUNK_SIZE][index % CHUNK_SIZE].fetch_add(1, Ordering::Release);
    }

    fn ensure_capacity(&self, id: Id) {
        let chunk_idx = id.index() / CHUNK_SIZE;
        let chunks_len = self.chunks.read().unwrap().len();

        if chunk_idx >= chunks_len {
            let mut chunks = self.chunks.write().unwrap();
            while chunks.len() <= chunk_idx {
                chunks.push(Box::new(std::array::from_fn(|_| AtomicU32::new(0))));
            }
        }
    }
}

/// The table of entity slots: allocates handles, recycles destroyed indexes,
/// and answers liveness queries.
///
/// Every operation takes `&self`, backed by atomics and a lock-free dead
/// pool, which is what lets deferred command contexts mint real handles
/// mid-tick. The World owns the table; structural consumers never hold it
/// across a tick boundary.
#[derive(Default, Debug)]
pub struct EntityTable {
    /// Serial counter per slot index.
    slots: Slots,

    /// Indexes available for reuse (index only; the serial lives in `slots`).
    dead_pool: SegQueue<Id>,

    /// Next fresh index to allocate.
    next_index: AtomicU32,
}

impl EntityTable {
    /// Construct an empty table starting from index 0.
    #[inline]
    pub const fn new() -> Self {
        Self {
            slots: Slots::new(),
            dead_pool: SegQueue::new(),
            next_index: AtomicU32::new(0),
        }
    }

    /// Allocate a new entity handle, reusing the first free index when one is
    /// available, else claiming a fresh index. Amortized O(1).
    pub fn create(&self) -> Entity {
        if let Some(id) = self.dead_pool.pop() {
            return Entity::with_serial(id, self.slots.get(id));
        }

        let id = Id(self.next_index.fetch_add(1, Ordering::Relaxed));
        self.slots.set(id, Serial::FIRST);
        Entity::with_serial(id, Serial::FIRST)
    }

    /// Allocate many entity handles at once, draining the dead pool before
    /// claiming a fresh index range.
    pub fn create_many(&self, count: usize) -> Vec<Entity> {
        let mut created = Vec::with_capacity(count);
        while created.len() < count
            && let Some(id) = self.dead_pool.pop()
        {
            created.push(Entity::with_serial(id, self.slots.get(id)));
        }

        let remaining = (count - created.len()) as u32;
        if remaining > 0 {
            let start = self.next_index.fetch_add(remaining, Ordering::Relaxed);
            for raw in start..start + remaining {
                let id = Id(raw);
                self.slots.set(id, Serial::FIRST);
                created.push(Entity::with_serial(id, Serial::FIRST));
            }
        }

        created
    }

    /// Destroy a live entity: bump the slot serial (permanently invalidating
    /// every copy of the handle) and return the index to the dead pool.
    ///
    /// # Panics
    /// Panics if the handle is not alive — destroying a stale or forged
    /// handle is a bug in the caller, not a runtime condition.
    pub fn destroy(&self, entity: Entity) {
        assert!(
            self.exists(entity),
            "destroy of dead entity {:?} (slot serial is {:?})",
            entity,
            self.slots.get(entity.id()),
        );
        self.slots.increment(entity.id());
        self.dead_pool.push(entity.id());
    }

    /// Check whether a handle refers to a live entity. Pure O(1) lookup.
    #[inline]
    pub fn exists(&self, entity: Entity) -> bool {
        entity.serial != Serial::NEVER && self.slots.get(entity.id()) == entity.serial
    }
}

#[test]
fn create_uniqueness() {
    // Given
    let table = EntityTable::default();

    // When
    let mut entities = Vec::new();
    for _ in 0..200 {
        entities.push(table.create());
    }

    // Then - no dupes minted
    let pre_len = entities.len();
    entities.sort();
    entities.dedup();
    assert_eq!(pre_len, entities.len());
}

#[test]
fn create_starts_at_serial_one() {
    // Given
    let table = EntityTable::default();

    // When
    let e = table.create();

    // Then - serial 0 stays reserved for never-allocated
    assert_eq!(e.serial(), Serial::FIRST);
    assert!(table.exists(e));
}

#[test]
fn never_allocated_handle_does_not_exist() {
    // Given
    let table = EntityTable::default();

    // When - a default/forged handle with the reserved serial
    let zeroed = Entity::with_serial(Id(7), Serial::NEVER);

    // Then
    assert!(!table.exists(zeroed));
}

#[test]
fn destroy_invalidates_forever() {
    // Given
    let table = EntityTable::default();
    let e = table.create();

    // When
    table.destroy(e);

    // Then - stale immediately
    assert!(!table.exists(e));

    // When - the index is reused
    let reborn = table.create();

    // Then - new handle is live, old handle stays dead
    assert_eq!(reborn.id(), e.id());
    assert_eq!(reborn.serial(), e.serial().next());
    assert!(table.exists(reborn));
    assert!(!table.exists(e));
}

#[test]
#[should_panic(expected = "destroy of dead entity")]
fn destroy_of_stale_handle_panics() {
    // Given
    let table = EntityTable::default();
    let e = table.create();
    table.destroy(e);

    // When - destroying the same handle again
    table.destroy(e);
}

#[test]
fn reuse_cycles_keep_bumping() {
    // Given
    let table = EntityTable::default();
    let first = table.create();
    let id = first.id();

    // When - free and reallocate the same slot repeatedly
    table.destroy(first);
    let second = table.create();
    table.destroy(second);
    let third = table.create();

    // Then - same id, strictly increasing serials
    assert_eq!(second.id(), id);
    assert_eq!(second.serial(), Serial(2));
    assert_eq!(third.id(), id);
    assert_eq!(third.serial(), Serial(3));
}

#[test]
fn create_many_mixes_pool_and_fresh() {
    // Given - 3 destroyed slots in the pool
    let table = EntityTable::default();
    for e in table.create_many(3) {
        table.destroy(e);
    }

    // When - asking for more than the pool holds
    let batch = table.create_many(5);

    // Then - 3 recycled (serial 2) + 2 fresh (serial 1)
    assert_eq!(batch.len(), 5);
    let recycled = batch.iter().filter(|e| e.serial() == Serial(2)).count();
    let fresh = batch.iter().filter(|e| e.serial() == Serial::FIRST).count();
    assert_eq!(recycled, 3);
    assert_eq!(fresh, 2);

    let mut fresh_ids: Vec<_> = batch
        .iter()
        .filter(|e| e.serial() == Serial::FIRST)
        .map(|e| e.id())
        .collect();
    fresh_ids.sort();
    assert_eq!(fresh_ids, vec![Id(3), Id(4)]);

    // Then - every handle in the batch is live
    for e in &batch {
        assert!(table.exists(*e));
    }
}

#[test]
fn entity_ordering_and_bits() {
    // Given
    let a = Entity::new(Id(1));
    let b = Entity::new(Id(2));
    let a_next = Entity::with_serial(Id(1), Serial(2));

    // Then - ordered by id first, then serial
    assert!(a < b);
    assert!(a < a_next);
    assert!(a_next < b);

    // Then - bits pack as index << 32 | serial
    assert_eq!(a.bits(), (1u64 << 32) | 1);
    assert_eq!(a_next.bits(), (1u64 << 32) | 2);
}
