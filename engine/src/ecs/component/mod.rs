//! Component types, identity, and registration.
//!
//! A component is plain data attached to an entity. Everything else in the
//! runtime speaks about components through two small values defined here:
//! the [`Id`] a type receives when first registered, and the [`Spec`]
//! naming a set of ids. [`Registry`] hands out ids and keeps the per-type
//! [`Info`] (layout, drop, merge) that raw column storage needs.
//!
//! Registration is concurrent and idempotent: the first caller for a type
//! wins, later callers get the same id back, readers never block. Building
//! a schedule seals the registry, freezing the id space so access masks and
//! archetype keys stay valid for the rest of the run.
//!
//! ```ignore
//! use quartz_macros::Component;
//!
//! #[derive(Component)]
//! struct Position { x: f32, y: f32 }
//!
//! let entity = world.spawn((Position { x: 0.0, y: 0.0 },));
//! ```

mod registry;
mod spec;

pub use registry::{Info, Registry};
pub use spec::{IntoSpec, Spec};

/// Identifier of a registered component type.
///
/// Ids are dense and assigned in registration order, so an id doubles as a
/// bit position in access masks and as an index into metadata tables.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u32);

impl Id {
    /// Wrap a raw id value.
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The id as a table index.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Marker trait for component types.
///
/// Besides setting the required bounds, a component may opt into a merge
/// policy for the case where two insertions of the same type land on the
/// same entity in the same tick (typically via deferred commands).
pub trait Component: 'static + Sized + Send + Sync {
    /// Merge an incoming duplicate insertion into the existing value.
    ///
    /// `None` (the default) means the later insertion replaces the earlier
    /// one. `Some(f)` means `f(&mut existing, incoming)` decides what the
    /// merged value looks like, e.g. summing accumulated damage instead of
    /// dropping one hit.
    const COMBINE: Option<fn(&mut Self, Self)> = None;
}
