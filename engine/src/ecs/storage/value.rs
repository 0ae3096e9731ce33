use std::ptr;

use crate::{
    all_tuples,
    ecs::{
        component::{self, Component, IntoSpec, Registry},
        storage::{Archetype, Row},
    },
};

/// Receiver for the component values of one entity.
///
/// [`Values::apply`] is generic over its target so one set of tuple impls
/// can write straight into a fresh archetype row or stage raw parts for a
/// structural move.
pub trait Target {
    /// Take ownership of one component value.
    fn put<C: Component>(&mut self, id: component::Id, value: C);
}

/// A set of component values attachable to an entity in one go.
///
/// Implemented for single components and for tuples (nested tuples too) of
/// other value sets. The component set via [`IntoSpec`] decides the
/// destination archetype; `apply` then hands each value to the target in
/// declaration order, so a component named twice reaches the target twice
/// and the target resolves the duplicate.
pub trait Values: IntoSpec + 'static {
    /// Hand each value to the target in declaration order.
    fn apply<T: Target>(self, registry: &Registry, target: &mut T);
}

impl Values for () {
    fn apply<T: Target>(self, _registry: &Registry, _target: &mut T) {}
}

impl<C: Component> Values for C {
    fn apply<T: Target>(self, registry: &Registry, target: &mut T) {
        let id = registry.register::<C>();
        target.put(id, self);
    }
}

macro_rules! tuple_values {
    ($($name: ident),*) => {
        #[allow(non_snake_case)]
        impl<$($name: Values),*> Values for ($($name,)*) {
            fn apply<Tgt: Target>(self, registry: &Registry, target: &mut Tgt) {
                let ($($name,)*) = self;
                $($name.apply(registry, target);)*
            }
        }
    }
}

// Values for all tuples up to 26 elements.
all_tuples!(tuple_values);

/// Writes a value set into one freshly allocated archetype row.
///
/// Tracks which columns are filled so that a duplicate within the set merges
/// instead of leaking the first value.
pub(crate) struct RowWriter<'a> {
    archetype: &'a mut Archetype,
    chunk: usize,
    row: Row,
    filled: Vec<component::Id>,
}

impl<'a> RowWriter<'a> {
    pub(crate) fn new(archetype: &'a mut Archetype, chunk: usize, row: Row) -> Self {
        Self {
            archetype,
            chunk,
            row,
            filled: Vec::new(),
        }
    }

    /// Number of distinct columns filled so far.
    pub(crate) fn filled(&self) -> usize {
        self.filled.len()
    }
}

impl Target for RowWriter<'_> {
    fn put<C: Component>(&mut self, id: component::Id, value: C) {
        if self.filled.contains(&id) {
            // SAFETY: an earlier put filled this slot.
            unsafe { self.archetype.merge_value(self.chunk, self.row, id, value) };
        } else {
            // SAFETY: fresh rows start vacant and each column is filled once.
            unsafe { self.archetype.write_value(self.chunk, self.row, id, value) };
            self.filled.push(id);
        }
    }
}

/// Stages a value set as raw parts for a structural move.
///
/// Each part owns the bytes of one initialized value. Duplicates collapse
/// while staging: the component's combine hook when it declares one,
/// otherwise the later value wins. The stash has byte alignment, so all
/// access goes through the unaligned pointer primitives.
pub(crate) struct Collector {
    parts: Vec<(component::Id, Vec<u8>)>,
}

impl Collector {
    pub(crate) fn new() -> Self {
        Self { parts: Vec::new() }
    }

    /// The staged parts, in first-seen component order.
    pub(crate) fn into_parts(self) -> Vec<(component::Id, Vec<u8>)> {
        self.parts
    }
}

impl Target for Collector {
    fn put<C: Component>(&mut self, id: component::Id, value: C) {
        match self.parts.iter_mut().find(|(part, _)| *part == id) {
            Some((_, bytes)) => {
                // Duplicate within one set: merge typed, through the stash.
                //
                // SAFETY: the stash holds an initialized C staged by an
                // earlier put.
                let mut existing: C = unsafe { ptr::read_unaligned(bytes.as_ptr() as *const C) };
                match C::COMBINE {
                    Some(combine) => combine(&mut existing, value),
                    // Later value wins; the old one drops here.
                    None => existing = value,
                }
                // SAFETY: the stash is sized for C; the merged value moves
                // back in.
                unsafe { ptr::write_unaligned(bytes.as_mut_ptr() as *mut C, existing) };
            }
            None => {
                let mut bytes = vec![0u8; size_of::<C>()];
                // SAFETY: the stash is sized for C; ownership moves into it.
                unsafe { ptr::write_unaligned(bytes.as_mut_ptr() as *mut C, value) };
                self.parts.push((id, bytes));
            }
        }
    }
}
