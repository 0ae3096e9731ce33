//! Declarative component views.
//!
//! A [`View`] names the components a system reads and writes, plus filters
//! that narrow which archetypes it visits: `with` requires a component
//! without granting access, `without` rejects archetypes carrying one, and
//! `maybe` marks an access as optional so archetypes missing the component
//! still match. An archetype spec matches a view when it carries every
//! `with`, none of the `without`s, and every non-`maybe` accessed component.
//!
//! Views are declared once and shared (typically behind an [`Arc`]) between
//! the system that iterates them and the schedule that derives the conflict
//! graph from their declared access:
//!
//! ```rust,ignore
//! let moving = Arc::new(
//!     View::new()
//!         .writes::<Position>()
//!         .reads::<Velocity>()
//!         .without::<Frozen>(),
//! );
//!
//! for mut row in moving.iter(&world) {
//!     let dx = row.read::<Velocity>().dx;
//!     row.write::<Position>().x += dx;
//! }
//! ```
//!
//! Component types resolve to ids lazily, on first use against a world's
//! registry. Each view keeps a private index of the archetype ids it
//! matches; the index is extended whenever archetypes have appeared since
//! the last pass, so matching cost is paid once per new archetype rather
//! than once per tick.

mod access;
mod iter;

pub(crate) use access::{Access, ComponentSet};
pub use iter::{EntityRow, ViewIter};

use std::any::TypeId;
use std::sync::{Arc, OnceLock, RwLock};

use crate::ecs::component::{self, Component, Registry, Spec};
use crate::ecs::entity::Entity;
use crate::ecs::storage::{Storage, archetype};
use crate::ecs::world::World;

/// What a single declaration asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Read,
    Write,
    With,
    Without,
    Maybe,
}

/// One builder declaration, held until a registry is available to resolve
/// the component type to an id.
#[derive(Debug)]
struct Request {
    kind: Kind,
    register: fn(&Registry) -> component::Id,
}

/// A declarative description of the entities a system works on.
///
/// Built with the fluent methods below, then used for iteration
/// ([`iter`](View::iter)) or point lookup ([`at`](View::at) /
/// [`maybe_at`](View::maybe_at)). Declaring a view performs no work; the
/// component set is resolved and the archetype index built on first use.
#[derive(Debug)]
pub struct View {
    requests: Vec<Request>,
    exclusive: bool,
    resolved: OnceLock<Resolved>,
    index: RwLock<ViewIndex>,
}

impl View {
    /// Creates an empty view matching every archetype.
    pub fn new() -> Self {
        Self {
            requests: Vec::new(),
            exclusive: false,
            resolved: OnceLock::new(),
            index: RwLock::new(ViewIndex::new()),
        }
    }

    /// Declare read access to `C`. Archetypes without `C` will not match.
    pub fn reads<C: Component>(mut self) -> Self {
        self.push::<C>(Kind::Read);
        self
    }

    /// Declare write access to `C`. Archetypes without `C` will not match.
    pub fn writes<C: Component>(mut self) -> Self {
        self.push::<C>(Kind::Write);
        self
    }

    /// Require `C` on matched archetypes without granting access to it.
    pub fn with<C: Component>(mut self) -> Self {
        self.push::<C>(Kind::With);
        self
    }

    /// Reject archetypes carrying `C`.
    pub fn without<C: Component>(mut self) -> Self {
        self.push::<C>(Kind::Without);
        self
    }

    /// Declare optional read access to `C`: archetypes missing `C` still
    /// match, and rows expose it through `read_opt`. Combine with
    /// [`writes`](View::writes) for optional write access.
    pub fn maybe<C: Component>(mut self) -> Self {
        self.push::<C>(Kind::Maybe);
        self
    }

    /// Claim sole ownership of every component this view touches. Schedule
    /// build panics if any other system reads or writes one of them.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    fn push<C: Component>(&mut self, kind: Kind) {
        self.requests.push(Request {
            kind,
            register: |registry| registry.register::<C>(),
        });
    }

    /// Fresh cursor over every entity the view matches.
    pub fn iter<'w>(&'w self, world: &'w World) -> ViewIter<'w> {
        let resolved = self.resolve(world.registry());
        let matched = self.matched(resolved, world.storage());
        ViewIter::new(world.storage(), resolved, matched)
    }

    /// Cursor over shard `index` of `count`: visits every matched chunk
    /// whose global ordinal is congruent to `index` modulo `count`. The
    /// shards together cover each matched entity exactly once.
    pub fn iter_shard<'w>(&'w self, world: &'w World, index: usize, count: usize) -> ViewIter<'w> {
        let resolved = self.resolve(world.registry());
        let matched = self.matched(resolved, world.storage());
        ViewIter::sharded(world.storage(), resolved, matched, index, count)
    }

    /// Row for one specific entity, resolved through the location index.
    ///
    /// # Panics
    /// Panics if the entity is dead or does not match the view. Use
    /// [`maybe_at`](View::maybe_at) when either case is expected.
    pub fn at<'w>(&'w self, world: &'w World, entity: Entity) -> EntityRow<'w> {
        assert!(
            world.exists(entity),
            "view access to dead entity {entity:?}"
        );
        match self.maybe_at(world, entity) {
            Some(row) => row,
            None => panic!("entity {entity:?} does not match this view"),
        }
    }

    /// Row for one specific entity, or `None` if it is dead or its
    /// archetype does not match the view.
    pub fn maybe_at<'w>(&'w self, world: &'w World, entity: Entity) -> Option<EntityRow<'w>> {
        if !world.exists(entity) {
            return None;
        }
        let storage = world.storage();
        let resolved = self.resolve(world.registry());
        let location = storage.location(entity)?;
        let archetype = storage.archetypes().get(location.archetype())?;
        if !resolved.matches(archetype.spec()) {
            return None;
        }
        Some(EntityRow::new(
            archetype,
            resolved,
            location.chunk(),
            location.row(),
            entity,
        ))
    }

    /// Resolve the declarations against a registry, once. Later calls
    /// return the cached resolution.
    pub(crate) fn resolve(&self, registry: &Registry) -> &Resolved {
        self.resolved
            .get_or_init(|| Resolved::build(&self.requests, self.exclusive, registry))
    }

    /// Current matched archetype ids, extending the index if archetypes
    /// have appeared since the last call.
    pub(crate) fn matched(
        &self,
        resolved: &Resolved,
        storage: &Storage,
    ) -> Arc<Vec<archetype::Id>> {
        let archetypes = storage.archetypes();
        {
            let index = self.index.read().unwrap();
            if index.seen == archetypes.len() {
                return Arc::clone(&index.matched);
            }
        }

        let mut index = self.index.write().unwrap();
        // Another thread may have caught up while we waited for the lock.
        if index.seen < archetypes.len() {
            let mut matched: Vec<archetype::Id> = (*index.matched).clone();
            for archetype in archetypes.iter().skip(index.seen) {
                if resolved.matches(archetype.spec()) {
                    matched.push(archetype.id());
                }
            }
            index.matched = Arc::new(matched);
            index.seen = archetypes.len();
        }
        Arc::clone(&index.matched)
    }

    /// Entity and chunk totals over the currently matched archetypes.
    pub(crate) fn population(&self, registry: &Registry, storage: &Storage) -> (usize, usize) {
        let resolved = self.resolve(registry);
        let matched = self.matched(resolved, storage);
        let archetypes = storage.archetypes();
        let mut entities = 0;
        let mut chunks = 0;
        for id in matched.iter() {
            let archetype = &archetypes[*id];
            entities += archetype.len();
            chunks += archetype.chunk_count();
        }
        (entities, chunks)
    }
}

impl Default for View {
    fn default() -> Self {
        Self::new()
    }
}

/// Cached matched-archetype list. Archetype ids are allocated in creation
/// order and never removed, so the index only ever extends: `seen` records
/// how many archetypes existed when the list was last brought up to date.
#[derive(Debug)]
struct ViewIndex {
    seen: usize,
    matched: Arc<Vec<archetype::Id>>,
}

impl ViewIndex {
    fn new() -> Self {
        Self {
            seen: 0,
            matched: Arc::new(Vec::new()),
        }
    }
}

/// A view's declarations resolved against one registry.
#[derive(Debug)]
pub(crate) struct Resolved {
    access: Access,
    /// Components an archetype must carry to match.
    required: Spec,
    /// Components an archetype must not carry to match.
    excluded: Spec,
    /// One entry per accessed component, for row-level lookups.
    lookup: Vec<Declared>,
}

#[derive(Debug)]
struct Declared {
    type_id: TypeId,
    id: component::Id,
    writable: bool,
}

impl Resolved {
    fn build(requests: &[Request], exclusive: bool, registry: &Registry) -> Self {
        let mut access = Access::new();
        let mut lookup: Vec<Declared> = Vec::new();
        let mut footprint = Vec::new();
        let mut withs = Vec::new();
        let mut withouts = Vec::new();
        let mut maybes = Vec::new();

        for request in requests {
            let id = (request.register)(registry);
            match request.kind {
                Kind::Read | Kind::Write | Kind::Maybe => {
                    let writable = request.kind == Kind::Write;
                    if writable {
                        access.add_write(id);
                    } else {
                        access.add_read(id);
                    }
                    match lookup.iter_mut().find(|declared| declared.id == id) {
                        Some(declared) => declared.writable |= writable,
                        None => {
                            let info = registry
                                .info(id)
                                .unwrap_or_else(|| panic!("component {id:?} has no registered info"));
                            lookup.push(Declared {
                                type_id: info.type_id(),
                                id,
                                writable,
                            });
                        }
                    }
                    footprint.push(id);
                    if request.kind == Kind::Maybe {
                        maybes.push(id);
                    }
                }
                Kind::With => withs.push(id),
                Kind::Without => withouts.push(id),
            }
        }

        let required = Spec::new(withs).union(&Spec::new(footprint).difference(&Spec::new(maybes)));
        if exclusive {
            access.claim_footprint();
        }

        Self {
            access,
            required,
            excluded: Spec::new(withouts),
            lookup,
        }
    }

    /// Check an archetype spec against the view's filters: every required
    /// component present, no excluded component present.
    pub(crate) fn matches(&self, spec: &Spec) -> bool {
        spec.contains_all(&self.required) && !spec.contains_any(&self.excluded)
    }

    pub(crate) fn access(&self) -> &Access {
        &self.access
    }

    /// Resolve an accessed component type to its id and writability.
    ///
    /// # Panics
    /// Panics if the type was never declared `reads`, `writes`, or `maybe`
    /// on this view. Filters grant no access.
    pub(crate) fn expect_declared<C: Component>(&self) -> (component::Id, bool) {
        let type_id = TypeId::of::<C>();
        match self
            .lookup
            .iter()
            .find(|declared| declared.type_id == type_id)
        {
            Some(declared) => (declared.id, declared.writable),
            None => panic!(
                "component {} is not declared on this view",
                std::any::type_name::<C>(),
            ),
        }
    }
}
