//! Thread-safe component type registration.
//!
//! [`Registry`] hands out dense [`Id`]s for component types and keeps the
//! [`Info`] metadata type-erased storage needs: memory layout, drop glue, and
//! the optional duplicate-insert merge function. Reads are lock-free via
//! `DashMap`; writes lock only while a brand-new type is recorded.
//!
//! Once the schedule is built the registry is sealed. Access masks and
//! dependency edges are derived from the id space at build time, so letting
//! new ids appear afterwards would silently exempt those components from
//! conflict tracking. Registering a new type after sealing is a bug in the
//! caller and panics.

use std::{
    alloc::Layout,
    any::TypeId as StdTypeId,
    ptr::NonNull,
    sync::{
        RwLock,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};

use dashmap::DashMap;

use crate::ecs::component::{Component, Id};

/// Metadata about a registered component type.
///
/// Contains the information needed to work with type-erased storage:
/// memory layout, drop function, and the optional merge function for
/// duplicate insertions.
#[derive(Debug, Clone, Copy)]
pub struct Info {
    /// The dense component ID.
    id: Id,

    /// The type name, for diagnostics and panic messages.
    name: &'static str,

    /// The Rust TypeId for runtime type checking.
    type_id: StdTypeId,

    /// The memory layout of the type.
    layout: Layout,

    /// The drop function for the type (may be a no-op).
    drop_fn: unsafe fn(NonNull<u8>),

    /// Merge function for duplicate same-tick insertions, when the component
    /// declares one.
    combine_fn: Option<unsafe fn(NonNull<u8>, NonNull<u8>)>,
}

impl Info {
    /// Construct Info for component type `C`.
    fn new<C: Component>(id: Id) -> Self {
        let drop_fn = if std::mem::needs_drop::<C>() {
            Self::drop_impl::<C>
        } else {
            Self::drop_noop
        };
        let combine_fn = C::COMBINE
            .map(|_| Self::combine_impl::<C> as unsafe fn(NonNull<u8>, NonNull<u8>));
        Self {
            id,
            name: std::any::type_name::<C>(),
            type_id: StdTypeId::of::<C>(),
            layout: Layout::new::<C>(),
            drop_fn,
            combine_fn,
        }
    }

    /// Get the component ID.
    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    /// Get the component type name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Get the Rust TypeId.
    #[inline]
    pub fn type_id(&self) -> StdTypeId {
        self.type_id
    }

    /// Get the memory layout.
    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Check if this is a zero-sized type.
    #[inline]
    pub fn is_zero_sized(&self) -> bool {
        self.layout.size() == 0
    }

    /// Get the drop function.
    #[inline]
    pub fn drop_fn(&self) -> unsafe fn(NonNull<u8>) {
        self.drop_fn
    }

    /// Get the merge function for duplicate insertions, if the component
    /// declares one.
    ///
    /// # Contract
    /// `f(existing, incoming)` reads the value out of `incoming` (the caller
    /// must treat those bytes as moved-from afterwards) and merges it into
    /// the initialized value behind `existing`. Only `existing` needs the
    /// component's alignment; `incoming` may point into a raw byte stash.
    #[inline]
    pub fn combine_fn(&self) -> Option<unsafe fn(NonNull<u8>, NonNull<u8>)> {
        self.combine_fn
    }

    /// Drop implementation for types that need drop.
    unsafe fn drop_impl<T>(ptr: NonNull<u8>) {
        unsafe {
            std::ptr::drop_in_place(ptr.as_ptr() as *mut T);
        }
    }

    /// No-op drop for types that don't need drop.
    unsafe fn drop_noop(_ptr: NonNull<u8>) {}

    /// Merge implementation for types that declare [`Component::COMBINE`].
    ///
    /// `existing` must be properly aligned; `incoming` may point into a raw
    /// byte buffer and is read unaligned.
    unsafe fn combine_impl<C: Component>(existing: NonNull<u8>, incoming: NonNull<u8>) {
        // Move the incoming value out; its bytes are dead after this.
        let incoming = unsafe { std::ptr::read_unaligned(incoming.as_ptr() as *mut C) };
        if let Some(combine) = C::COMBINE {
            combine(unsafe { &mut *(existing.as_ptr() as *mut C) }, incoming);
        }
    }
}

/// A thread-safe registry of component types.
///
/// Each component type gets a single dense [`Id`] in registration order,
/// which doubles as a bit position in access masks. Registration is
/// idempotent and safe to race; the first caller to register a type wins the
/// id and every other caller observes it.
pub struct Registry {
    /// Map from Rust TypeId to component Id. Lock-free reads via sharded
    /// concurrent hashmap.
    type_map: DashMap<StdTypeId, Id>,

    /// Registered component entries, indexed by Id. Protected by RwLock for
    /// rare writes.
    infos: RwLock<Vec<Option<Info>>>,

    /// Next available component identifier.
    next_id: AtomicU32,

    /// Set once the schedule is built; new registrations panic after this.
    sealed: AtomicBool,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create a new, empty component registry.
    #[inline]
    pub fn new() -> Self {
        Self {
            type_map: DashMap::new(),
            infos: RwLock::new(Vec::new()),
            next_id: AtomicU32::new(0),
            sealed: AtomicBool::new(false),
        }
    }

    /// Register a component type, returning its ID. If the type is already
    /// registered this returns the existing ID.
    ///
    /// # Panics
    /// Panics if called for a brand-new type after the registry was sealed by
    /// schedule build.
    pub fn register<C: Component>(&self) -> Id {
        let std_type_id = StdTypeId::of::<C>();

        // Fast path: already registered (lock-free read).
        if let Some(existing_id) = self.type_map.get(&std_type_id) {
            return *existing_id;
        }

        // Slow path: need to register.
        // Use entry API to handle race conditions.
        match self.type_map.entry(std_type_id) {
            dashmap::Entry::Occupied(occupied) => *occupied.get(),
            dashmap::Entry::Vacant(vacant) => {
                if self.is_sealed() {
                    panic!(
                        "component '{}' registered after the schedule was built; \
                         register every component before Schedule::build",
                        std::any::type_name::<C>(),
                    );
                }

                let id = Id::new(self.next_id.fetch_add(1, Ordering::Relaxed));

                let mut infos = self.infos.write().unwrap();
                let index = id.index();
                if index >= infos.len() {
                    infos.resize(index + 1, None);
                }
                infos[index] = Some(Info::new::<C>(id));
                vacant.insert(id);

                id
            }
        }
    }

    /// Get the ID for a component type, if registered.
    #[inline]
    pub fn get<C: Component>(&self) -> Option<Id> {
        self.type_map
            .get(&StdTypeId::of::<C>())
            .map(|entry| *entry.value())
    }

    /// Get component info by ID.
    #[inline]
    pub fn info(&self, id: Id) -> Option<Info> {
        let infos = self.infos.read().unwrap();
        infos.get(id.index()).and_then(|opt| *opt)
    }

    /// Get component info for a type, if registered.
    #[inline]
    pub fn info_of<C: Component>(&self) -> Option<Info> {
        let id = self.get::<C>()?;
        self.info(id)
    }

    /// Freeze the id space. Existing types keep resolving; registering a new
    /// type afterwards panics.
    #[inline]
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    /// Check whether the registry has been sealed.
    #[inline]
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Get the number of registered component types.
    #[inline]
    pub fn len(&self) -> usize {
        self.next_id.load(Ordering::Relaxed) as usize
    }

    /// Check if the registry is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
